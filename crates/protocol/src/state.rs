//! Browser session state: the serializable footprint of a live browser.
//!
//! [`BrowserSessionState`] is what an adapter captures and applies. Per-origin
//! storage is held in [`OriginStorage`], an ordered two-level map
//! (`origin -> key -> value`), so encoding is deterministic and an origin with
//! no keys is still represented.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cookie::Cookie;
use crate::recording::RecordingState;

/// Version written into freshly initialized and captured states.
pub const STATE_VERSION: &str = "1.0.0";

/// Ordered `origin -> key -> value` storage map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginStorage(BTreeMap<String, BTreeMap<String, String>>);

impl OriginStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `key` under `origin`, replacing any previous value.
	pub fn set(&mut self, origin: impl Into<String>, key: impl Into<String>, value: impl Into<String>) {
		self.0.entry(origin.into()).or_default().insert(key.into(), value.into());
	}

	pub fn get(&self, origin: &str, key: &str) -> Option<&str> {
		self.0.get(origin).and_then(|entries| entries.get(key)).map(String::as_str)
	}

	/// Returns all entries of `origin`, if the origin is present.
	pub fn origin(&self, origin: &str) -> Option<&BTreeMap<String, String>> {
		self.0.get(origin)
	}

	/// Registers `origin` with no keys. Existing entries are kept.
	pub fn ensure_origin(&mut self, origin: impl Into<String>) {
		self.0.entry(origin.into()).or_default();
	}

	/// Replaces every entry of `origin` with `entries`.
	pub fn replace_origin(&mut self, origin: impl Into<String>, entries: BTreeMap<String, String>) {
		self.0.insert(origin.into(), entries);
	}

	pub fn remove_origin(&mut self, origin: &str) -> Option<BTreeMap<String, String>> {
		self.0.remove(origin)
	}

	pub fn origins(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, String>)> {
		self.0.iter().map(|(origin, entries)| (origin.as_str(), entries))
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}
}

impl From<BTreeMap<String, BTreeMap<String, String>>> for OriginStorage {
	fn from(map: BTreeMap<String, BTreeMap<String, String>>) -> Self {
		Self(map)
	}
}

/// Cookies plus local/session storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
	#[serde(default)]
	pub cookies: Vec<Cookie>,
	#[serde(default)]
	pub local_storage: OriginStorage,
	#[serde(default)]
	pub session_storage: OriginStorage,
}

impl StorageSnapshot {
	/// Inserts `cookie`, replacing one with the same `(name, domain, path)`.
	pub fn upsert_cookie(&mut self, cookie: Cookie) {
		match self.cookies.iter_mut().find(|existing| existing.key() == cookie.key()) {
			Some(existing) => *existing = cookie,
			None => self.cookies.push(cookie),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.cookies.is_empty() && self.local_storage.is_empty() && self.session_storage.is_empty()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
	pub x: f64,
	pub y: f64,
}

/// Best-effort DOM snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomState {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub html: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scroll_position: Option<ScrollPosition>,
	/// Form field values keyed by selector.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub form_data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	/// Epoch milliseconds.
	#[serde(default)]
	pub timestamp: u64,
}

/// Navigation history of the captured browsing context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
	pub current_url: String,
	#[serde(default)]
	pub entries: Vec<HistoryEntry>,
	#[serde(default)]
	pub current_index: usize,
}

impl HistoryState {
	/// History holding a single visited page.
	pub fn single(url: impl Into<String>, title: Option<String>, timestamp: u64) -> Self {
		let url = url.into();
		Self {
			current_url: url.clone(),
			entries: vec![HistoryEntry { url, title, timestamp }],
			current_index: 0,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCapture {
	pub url: String,
	pub method: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	#[serde(default)]
	pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
	#[serde(default)]
	pub captures: Vec<NetworkCapture>,
}

/// The serializable footprint of a browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionState {
	pub version: String,
	/// Capture time, epoch milliseconds.
	pub timestamp: u64,
	#[serde(default)]
	pub origin: String,
	#[serde(default)]
	pub storage: StorageSnapshot,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dom: Option<DomState>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub history: Option<HistoryState>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub network: Option<NetworkState>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub recording: Option<RecordingState>,
	/// Opaque adapter payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl BrowserSessionState {
	/// Fresh state with empty storage and no optional sections.
	pub fn empty(timestamp: u64) -> Self {
		Self {
			version: STATE_VERSION.to_string(),
			timestamp,
			origin: String::new(),
			storage: StorageSnapshot::default(),
			dom: None,
			history: None,
			network: None,
			recording: None,
			extensions: None,
		}
	}

	/// Returns true when a recording with at least one event is attached.
	pub fn has_recording(&self) -> bool {
		self.recording.as_ref().is_some_and(|recording| !recording.events.is_empty())
	}
}
