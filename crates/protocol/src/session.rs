//! Session metadata, persisted records and listing filters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::BrowserSessionState;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
	#[default]
	Active,
	Inactive,
	Terminated,
}

impl std::fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SessionStatus::Active => write!(f, "active"),
			SessionStatus::Inactive => write!(f, "inactive"),
			SessionStatus::Terminated => write!(f, "terminated"),
		}
	}
}

impl std::str::FromStr for SessionStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"active" => Ok(SessionStatus::Active),
			"inactive" => Ok(SessionStatus::Inactive),
			"terminated" => Ok(SessionStatus::Terminated),
			_ => Err(format!("unknown session status: {s}")),
		}
	}
}

/// A message attached to a shared session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
	pub id: String,
	pub author: String,
	pub content: String,
	/// Epoch milliseconds.
	pub timestamp: u64,
}

/// Descriptive metadata of a session.
///
/// `id` never changes after creation and `updated_at >= created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub description: String,
	/// Epoch milliseconds.
	pub created_at: u64,
	/// Epoch milliseconds.
	pub updated_at: u64,
	#[serde(default)]
	pub tags: BTreeSet<String>,
	/// Adapter type that created the session.
	#[serde(default)]
	pub created_with: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expire_at: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub participants: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub messages: Option<Vec<SessionMessage>>,
	#[serde(default)]
	pub status: SessionStatus,
}

impl SessionMetadata {
	/// Moves `updated_at` to `now`, never backwards past `created_at`.
	pub fn touch(&mut self, now: u64) {
		self.updated_at = now.max(self.created_at).max(self.updated_at);
	}

	pub fn has_tags(&self, tags: &BTreeSet<String>) -> bool {
		tags.is_subset(&self.tags)
	}

	pub fn is_expired(&self, now: u64) -> bool {
		self.expire_at.is_some_and(|at| at <= now)
	}
}

/// Partial metadata update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tags: Option<BTreeSet<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<SessionStatus>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expire_at: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub participants: Option<Vec<String>>,
}

impl MetadataPatch {
	pub fn is_empty(&self) -> bool {
		self == &MetadataPatch::default()
	}

	/// Applies the patch. Identity and timestamps are not patchable.
	pub fn apply_to(&self, metadata: &mut SessionMetadata) {
		if let Some(name) = &self.name {
			metadata.name = name.clone();
		}
		if let Some(description) = &self.description {
			metadata.description = description.clone();
		}
		if let Some(tags) = &self.tags {
			metadata.tags = tags.clone();
		}
		if let Some(status) = self.status {
			metadata.status = status;
		}
		if let Some(expire_at) = self.expire_at {
			metadata.expire_at = Some(expire_at);
		}
		if let Some(participants) = &self.participants {
			metadata.participants = Some(participants.clone());
		}
	}
}

/// The persisted unit: metadata plus state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
	pub metadata: SessionMetadata,
	pub state: BrowserSessionState,
}

/// Inclusive epoch-millisecond range. Open ends match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<u64>,
}

impl TimeRange {
	pub fn between(from: u64, to: u64) -> Self {
		Self { from: Some(from), to: Some(to) }
	}

	pub fn contains(&self, value: u64) -> bool {
		self.from.is_none_or(|from| value >= from) && self.to.is_none_or(|to| value <= to)
	}
}

/// Criteria for listing sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
	/// Case-insensitive substring of the session name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Every listed tag must be present on the session.
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub tags: BTreeSet<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created: Option<TimeRange>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated: Option<TimeRange>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<usize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub offset: Option<usize>,
}

impl SessionFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
		self.tags.insert(tag.into());
		self
	}

	pub fn with_tags<I, S>(mut self, tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.tags.extend(tags.into_iter().map(Into::into));
		self
	}

	pub fn created_within(mut self, range: TimeRange) -> Self {
		self.created = Some(range);
		self
	}

	pub fn updated_within(mut self, range: TimeRange) -> Self {
		self.updated = Some(range);
		self
	}

	pub fn with_limit(mut self, limit: usize) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn with_offset(mut self, offset: usize) -> Self {
		self.offset = Some(offset);
		self
	}

	/// Checks name, tags and both time ranges. Paging is not considered.
	pub fn matches(&self, metadata: &SessionMetadata) -> bool {
		if let Some(name) = &self.name {
			if !metadata.name.to_lowercase().contains(&name.to_lowercase()) {
				return false;
			}
		}
		if !metadata.has_tags(&self.tags) {
			return false;
		}
		if let Some(range) = &self.created {
			if !range.contains(metadata.created_at) {
				return false;
			}
		}
		if let Some(range) = &self.updated {
			if !range.contains(metadata.updated_at) {
				return false;
			}
		}
		true
	}

	/// Filters, sorts by `updated_at` descending, then applies offset and limit.
	pub fn apply(&self, sessions: impl IntoIterator<Item = SessionMetadata>) -> Vec<SessionMetadata> {
		let mut matched: Vec<SessionMetadata> = sessions.into_iter().filter(|m| self.matches(m)).collect();
		matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

		let offset = self.offset.unwrap_or(0);
		let limit = self.limit.unwrap_or(usize::MAX);
		matched.into_iter().skip(offset).take(limit).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn meta(id: &str, name: &str, tags: &[&str], updated_at: u64) -> SessionMetadata {
		SessionMetadata {
			id: id.to_string(),
			name: name.to_string(),
			description: String::new(),
			created_at: 0,
			updated_at,
			tags: tags.iter().map(|t| t.to_string()).collect(),
			created_with: "memory".into(),
			expire_at: None,
			participants: None,
			messages: None,
			status: SessionStatus::Active,
		}
	}

	#[test]
	fn tag_filter_requires_every_tag() {
		let sessions = vec![meta("1", "a", &["a"], 1), meta("2", "ab", &["a", "b"], 2), meta("3", "b", &["b"], 3)];

		let listed = SessionFilter::new().with_tags(["a", "b"]).apply(sessions);
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].id, "2");
	}

	#[test]
	fn name_filter_is_case_insensitive() {
		let filter = SessionFilter::new().with_name("GMAIL");
		assert!(filter.matches(&meta("1", "work gmail login", &[], 1)));
		assert!(!filter.matches(&meta("2", "github", &[], 1)));
	}

	#[test]
	fn ranges_are_inclusive() {
		let filter = SessionFilter::new().updated_within(TimeRange::between(10, 20));
		assert!(filter.matches(&meta("1", "x", &[], 10)));
		assert!(filter.matches(&meta("2", "x", &[], 20)));
		assert!(!filter.matches(&meta("3", "x", &[], 21)));
	}

	#[test]
	fn paging_applies_after_sort() {
		let sessions: Vec<SessionMetadata> = (1..=10).map(|i| meta(&format!("s{i:02}"), "x", &[], i * 100)).collect();

		let page = SessionFilter::new().with_offset(3).with_limit(3).apply(sessions);
		let updated: Vec<u64> = page.iter().map(|m| m.updated_at).collect();
		assert_eq!(updated, vec![700, 600, 500]);
	}

	#[test]
	fn patch_leaves_identity_alone() {
		let mut metadata = meta("keep", "old", &["x"], 5);
		let patch = MetadataPatch {
			name: Some("new".into()),
			status: Some(SessionStatus::Inactive),
			..Default::default()
		};
		patch.apply_to(&mut metadata);

		assert_eq!(metadata.id, "keep");
		assert_eq!(metadata.name, "new");
		assert_eq!(metadata.status, SessionStatus::Inactive);
		assert!(metadata.tags.contains("x"));
	}

	#[test]
	fn touch_never_moves_backwards() {
		let mut metadata = meta("1", "x", &[], 50);
		metadata.created_at = 40;
		metadata.touch(10);
		assert_eq!(metadata.updated_at, 50);
		metadata.touch(60);
		assert_eq!(metadata.updated_at, 60);
	}
}
