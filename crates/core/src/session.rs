//! Session aggregate: metadata plus state, bound to storage and optionally
//! to an adapter.

use std::collections::BTreeSet;
use std::sync::Arc;

use psp_protocol::{
	BrowserSessionState, MetadataPatch, RecordingState, SessionFilter, SessionMessage, SessionMetadata, SessionRecord,
	SessionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapter::{Adapter, PlaybackOptions, PlaybackReport, RecordingOptions, RestoreReport, TargetHandle};
use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::storage::validate_id;

const UNKNOWN_ADAPTER: &str = "unknown";

/// Parameters for [`Session::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptions {
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub tags: BTreeSet<String>,
	/// Seconds until the session expires. `0` or absent never expires.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expire_in: Option<u64>,
	/// Overrides the adapter type recorded as `createdWith`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_with: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub participants: Option<Vec<String>>,
}

impl CreateOptions {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn tag(mut self, tag: impl Into<String>) -> Self {
		self.tags.insert(tag.into());
		self
	}

	pub fn expire_in(mut self, secs: u64) -> Self {
		self.expire_in = Some(secs);
		self
	}

	pub fn created_with(mut self, adapter_type: impl Into<String>) -> Self {
		self.created_with = Some(adapter_type.into());
		self
	}
}

/// A browser session: persisted metadata and state plus the adapter used to
/// capture and restore it.
///
/// Every mutating operation writes the full `{metadata, state}` record while
/// holding the context's lock for the session id, and only updates the
/// in-memory copy once the write succeeded. After [`delete`](Session::delete)
/// the handle refuses further writes.
pub struct Session {
	metadata: SessionMetadata,
	state: BrowserSessionState,
	ctx: SessionContext,
	adapter: Option<Arc<dyn Adapter>>,
	recording_started_at: Option<u64>,
	deleted: bool,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.metadata.id)
			.field("name", &self.metadata.name)
			.field("adapter", &self.adapter.as_ref().map(|a| a.adapter_type().to_string()))
			.field("recording", &self.recording_started_at.is_some())
			.field("deleted", &self.deleted)
			.finish()
	}
}

impl Session {
	/// Creates and immediately persists a session with an empty state.
	pub async fn create(ctx: &SessionContext, options: CreateOptions, adapter: Option<Arc<dyn Adapter>>) -> Result<Self> {
		let now = ctx.now_ms();
		let created_with = options
			.created_with
			.or_else(|| adapter.as_ref().map(|adapter| adapter.adapter_type().to_string()))
			.unwrap_or_else(|| UNKNOWN_ADAPTER.to_string());

		let metadata = SessionMetadata {
			id: Uuid::new_v4().to_string(),
			name: options.name,
			description: options.description,
			created_at: now,
			updated_at: now,
			tags: options.tags,
			created_with,
			expire_at: options
				.expire_in
				.filter(|secs| *secs > 0)
				.map(|secs| now.saturating_add(secs.saturating_mul(1000))),
			participants: options.participants,
			messages: None,
			status: SessionStatus::Active,
		};

		let session = Self::from_record(
			ctx,
			SessionRecord {
				metadata,
				state: BrowserSessionState::empty(now),
			},
			adapter,
		);
		session.write().await?;
		info!(target = "psp.session", id = %session.id(), name = %session.metadata.name, "session created");
		Ok(session)
	}

	/// Reopens a persisted session.
	pub async fn load(ctx: &SessionContext, id: &str) -> Result<Self> {
		let record = ctx.storage().load(id).await?;
		debug!(target = "psp.session", id = %id, "session loaded");
		Ok(Self::from_record(ctx, record, None))
	}

	/// Persists an externally produced record. A missing, unsafe or already
	/// taken id is replaced with a fresh one.
	pub async fn import(ctx: &SessionContext, mut record: SessionRecord) -> Result<Self> {
		let id = &record.metadata.id;
		if validate_id(id).is_err() || ctx.storage().exists(id).await? {
			record.metadata.id = Uuid::new_v4().to_string();
		}
		record.metadata.touch(ctx.now_ms());

		let session = Self::from_record(ctx, record, None);
		session.write().await?;
		info!(target = "psp.session", id = %session.id(), "session imported");
		Ok(session)
	}

	fn from_record(ctx: &SessionContext, record: SessionRecord, adapter: Option<Arc<dyn Adapter>>) -> Self {
		Self {
			metadata: record.metadata,
			state: record.state,
			ctx: ctx.clone(),
			adapter,
			recording_started_at: None,
			deleted: false,
		}
	}

	pub fn id(&self) -> &str {
		&self.metadata.id
	}

	pub fn metadata(&self) -> &SessionMetadata {
		&self.metadata
	}

	pub fn state(&self) -> &BrowserSessionState {
		&self.state
	}

	pub fn record(&self) -> SessionRecord {
		SessionRecord {
			metadata: self.metadata.clone(),
			state: self.state.clone(),
		}
	}

	pub fn context(&self) -> &SessionContext {
		&self.ctx
	}

	pub fn adapter(&self) -> Option<&Arc<dyn Adapter>> {
		self.adapter.as_ref()
	}

	pub fn set_adapter(&mut self, adapter: Arc<dyn Adapter>) {
		self.adapter = Some(adapter);
	}

	pub fn is_recording(&self) -> bool {
		self.recording_started_at.is_some()
	}

	pub fn is_deleted(&self) -> bool {
		self.deleted
	}

	pub fn is_expired(&self) -> bool {
		self.metadata.is_expired(self.ctx.now_ms())
	}

	/// Writes this handle's record as is. Fails with `NotFound` once the
	/// record was deleted, through this handle or any other.
	pub async fn save(&mut self) -> Result<()> {
		self.ensure_live()?;
		let _guard = self.ctx.lock(&self.metadata.id).await;
		if !self.ctx.storage().exists(&self.metadata.id).await? {
			return Err(Error::NotFound { id: self.metadata.id.clone() });
		}
		self.write().await
	}

	/// Replaces the state with a fresh capture from the adapter.
	pub async fn capture(&mut self, target: Option<&TargetHandle>) -> Result<()> {
		self.ensure_live()?;
		let adapter = self.require_adapter()?;
		if let Some(target) = target {
			adapter.connect(target).await?;
		}
		let state = adapter.capture_state().await?;
		self.commit(move |record| record.state = state).await?;

		info!(
			target = "psp.session",
			id = %self.id(),
			origin = %self.state.origin,
			cookies = self.state.storage.cookies.len(),
			"state captured"
		);
		Ok(())
	}

	/// Applies the stored state to the adapter's browser. Nothing is persisted.
	pub async fn restore(&self, target: Option<&TargetHandle>) -> Result<RestoreReport> {
		let adapter = self.require_adapter()?;
		if let Some(target) = target {
			adapter.connect(target).await?;
		}
		let report = adapter.apply_state(&self.state).await?;
		info!(target = "psp.session", id = %self.id(), navigated_to = ?report.navigated_to, "state restored");
		Ok(report)
	}

	pub async fn start_recording(&mut self, target: Option<&TargetHandle>, options: RecordingOptions) -> Result<()> {
		self.ensure_live()?;
		let adapter = self.require_adapter()?;
		if self.is_recording() {
			return Err(Error::InvalidState(format!("session {} is already recording", self.id())));
		}
		if let Some(target) = target {
			adapter.connect(target).await?;
		}

		adapter.start_recording(options).await?;
		self.recording_started_at = Some(self.ctx.now_ms());
		info!(target = "psp.session", id = %self.id(), "recording started");
		Ok(())
	}

	/// Stores the recorded events as the session's recording and persists.
	pub async fn stop_recording(&mut self) -> Result<RecordingState> {
		self.ensure_live()?;
		let adapter = self.require_adapter()?;
		let Some(started_at) = self.recording_started_at else {
			return Err(Error::InvalidState(format!("session {} is not recording", self.id())));
		};

		let events = adapter.stop_recording().await;
		self.recording_started_at = None;
		let recording = RecordingState::from_events(started_at, events?);

		let stored = recording.clone();
		self.commit(move |record| record.state.recording = Some(stored)).await?;

		self.ctx.notify_event(
			self.id(),
			json!({
				"type": "recording",
				"eventCount": recording.events.len(),
				"duration": recording.duration,
			}),
		);
		info!(target = "psp.session", id = %self.id(), events = recording.events.len(), "recording stopped");
		Ok(recording)
	}

	pub async fn play_recording(&self, target: Option<&TargetHandle>, options: PlaybackOptions) -> Result<PlaybackReport> {
		let recording = match &self.state.recording {
			Some(recording) if !recording.is_empty() => recording,
			_ => return Err(Error::NoRecording { id: self.id().to_string() }),
		};
		let adapter = self.require_adapter()?;
		if let Some(target) = target {
			adapter.connect(target).await?;
		}

		info!(target = "psp.session", id = %self.id(), events = recording.events.len(), speed = options.speed, "playing recording");
		adapter.play_recording(&recording.events, options).await
	}

	/// Persists a copy under a new id. This session is left untouched.
	pub async fn clone_as(&self, name: Option<&str>) -> Result<Session> {
		self.ensure_live()?;
		let now = self.ctx.now_ms();

		let mut metadata = self.metadata.clone();
		metadata.id = Uuid::new_v4().to_string();
		metadata.name = name
			.map(str::to_string)
			.unwrap_or_else(|| format!("{} (Clone)", self.metadata.name));
		metadata.created_at = now;
		metadata.updated_at = now;

		let mut state = self.state.clone();
		state.timestamp = now;

		let clone = Self::from_record(&self.ctx, SessionRecord { metadata, state }, self.adapter.clone());
		clone.write().await?;
		info!(target = "psp.session", id = %self.id(), clone = %clone.id(), "session cloned");
		Ok(clone)
	}

	/// Removes the persisted record. Later writes through this handle fail.
	pub async fn delete(&mut self) -> Result<()> {
		if self.deleted {
			return Ok(());
		}
		let _guard = self.ctx.lock(&self.metadata.id).await;
		self.ctx.storage().delete(&self.metadata.id).await?;
		self.deleted = true;
		self.ctx.notify_deleted(&self.metadata.id);
		info!(target = "psp.session", id = %self.id(), "session deleted");
		Ok(())
	}

	/// Applies a metadata patch and/or a replacement state as one write.
	pub async fn update(&mut self, patch: Option<&MetadataPatch>, state: Option<BrowserSessionState>) -> Result<()> {
		if patch.is_none() && state.is_none() {
			return Ok(());
		}
		self.commit(move |record| {
			if let Some(patch) = patch {
				patch.apply_to(&mut record.metadata);
			}
			if let Some(state) = state {
				record.state = state;
			}
		})
		.await
	}

	pub async fn update_metadata(&mut self, patch: &MetadataPatch) -> Result<()> {
		self.update(Some(patch), None).await
	}

	pub async fn update_state(&mut self, state: BrowserSessionState) -> Result<()> {
		self.update(None, Some(state)).await
	}

	/// Appends a message and publishes it as a session event.
	pub async fn add_message(&mut self, author: impl Into<String>, content: impl Into<String>) -> Result<SessionMessage> {
		let message = SessionMessage {
			id: Uuid::new_v4().to_string(),
			author: author.into(),
			content: content.into(),
			timestamp: self.ctx.now_ms(),
		};

		let appended = message.clone();
		self.commit(move |record| record.metadata.messages.get_or_insert_with(Vec::new).push(appended))
			.await?;

		self.ctx.notify_event(self.id(), json!({"type": "message", "message": message}));
		Ok(message)
	}

	pub async fn terminate(&mut self) -> Result<()> {
		let patch = MetadataPatch {
			status: Some(SessionStatus::Terminated),
			..Default::default()
		};
		self.update_metadata(&patch).await?;
		info!(target = "psp.session", id = %self.id(), "session terminated");
		Ok(())
	}

	fn ensure_live(&self) -> Result<()> {
		if self.deleted {
			return Err(Error::InvalidState(format!("session {} was deleted", self.metadata.id)));
		}
		Ok(())
	}

	fn require_adapter(&self) -> Result<Arc<dyn Adapter>> {
		self.adapter.clone().ok_or(Error::NoAdapter)
	}

	/// Upserts the current record.
	async fn write(&self) -> Result<()> {
		self.ctx.storage().save(&self.record()).await?;
		self.ctx.notify_updated(&self.metadata, &self.state);
		Ok(())
	}

	/// Read-modify-write under the id lock: reloads the stored record, applies
	/// `change`, touches `updatedAt`, persists, then adopts the result. Writes
	/// from other handles are therefore never lost, and a record removed by
	/// another handle is not brought back (`NotFound`).
	async fn commit(&mut self, change: impl FnOnce(&mut SessionRecord)) -> Result<()> {
		self.ensure_live()?;
		let id = self.metadata.id.clone();
		let _guard = self.ctx.lock(&id).await;

		let mut record = self.ctx.storage().load(&id).await?;
		change(&mut record);
		record.metadata.id = id;
		record.metadata.touch(self.ctx.now_ms());
		self.ctx.storage().save(&record).await?;

		self.metadata = record.metadata;
		self.state = record.state;
		self.ctx.notify_updated(&self.metadata, &self.state);
		Ok(())
	}
}

/// Deletes every session whose `expireAt` has passed and returns their ids.
pub async fn prune_expired(ctx: &SessionContext) -> Result<Vec<String>> {
	let now = ctx.now_ms();
	let mut pruned = Vec::new();
	for metadata in ctx.storage().list(&SessionFilter::default()).await? {
		if !metadata.is_expired(now) {
			continue;
		}
		let _guard = ctx.lock(&metadata.id).await;
		ctx.storage().delete(&metadata.id).await?;
		ctx.notify_deleted(&metadata.id);
		pruned.push(metadata.id);
	}
	if !pruned.is_empty() {
		info!(target = "psp.session", count = pruned.len(), "expired sessions pruned");
	}
	Ok(pruned)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::Clock;
	use crate::storage::MemoryStorage;

	fn context() -> SessionContext {
		SessionContext::new(Arc::new(MemoryStorage::new())).with_clock(Clock::manual(1_000))
	}

	#[tokio::test]
	async fn create_sets_timestamps_and_expiry() {
		let ctx = context();
		let session = Session::create(&ctx, CreateOptions::new("A").expire_in(60), None).await.unwrap();

		let metadata = session.metadata();
		assert_eq!(metadata.created_at, 1_000);
		assert_eq!(metadata.updated_at, 1_000);
		assert_eq!(metadata.expire_at, Some(61_000));
		assert_eq!(metadata.created_with, UNKNOWN_ADAPTER);
		assert!(!session.is_expired());

		ctx.clock().advance(60_000);
		assert!(session.is_expired());
	}

	#[tokio::test]
	async fn zero_expire_in_never_expires() {
		let ctx = context();
		let session = Session::create(&ctx, CreateOptions::new("A").expire_in(0), None).await.unwrap();
		assert_eq!(session.metadata().expire_at, None);
	}

	#[tokio::test]
	async fn capture_without_adapter_fails() {
		let ctx = context();
		let mut session = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();
		assert!(matches!(session.capture(None).await, Err(Error::NoAdapter)));
	}

	#[tokio::test]
	async fn play_without_recording_fails_first() {
		let ctx = context();
		let session = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();
		let err = session.play_recording(None, PlaybackOptions::default()).await.unwrap_err();
		assert!(matches!(err, Error::NoRecording { .. }));
	}

	#[tokio::test]
	async fn update_metadata_bumps_updated_at() {
		let ctx = context();
		let mut session = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();
		ctx.clock().advance(5);

		let patch = MetadataPatch {
			description: Some("d".into()),
			..Default::default()
		};
		session.update_metadata(&patch).await.unwrap();

		let stored = ctx.storage().load(session.id()).await.unwrap();
		assert_eq!(stored.metadata.description, "d");
		assert_eq!(stored.metadata.updated_at, 1_005);
		assert_eq!(stored.metadata.created_at, 1_000);
	}

	#[tokio::test]
	async fn writes_do_not_resurrect_records_deleted_elsewhere() {
		let ctx = context();
		let mut first = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();
		let mut second = Session::load(&ctx, first.id()).await.unwrap();

		second.delete().await.unwrap();
		let err = first.add_message("ana", "hi").await.unwrap_err();

		assert!(matches!(err, Error::NotFound { .. }));
		assert!(!ctx.storage().exists(first.id()).await.unwrap());
		assert!(first.metadata().messages.is_none());
	}

	#[tokio::test]
	async fn stale_save_does_not_resurrect_a_deleted_record() {
		let ctx = context();
		let created = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();
		let mut stale = Session::load(&ctx, created.id()).await.unwrap();
		let mut deleter = Session::load(&ctx, created.id()).await.unwrap();

		deleter.delete().await.unwrap();
		let err = stale.save().await.unwrap_err();

		assert!(matches!(err, Error::NotFound { .. }));
		assert!(!ctx.storage().exists(created.id()).await.unwrap());
	}

	#[tokio::test]
	async fn handles_on_one_id_keep_each_others_writes() {
		let ctx = context();
		let created = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();
		let mut a = Session::load(&ctx, created.id()).await.unwrap();
		let mut b = Session::load(&ctx, created.id()).await.unwrap();

		a.add_message("ana", "first").await.unwrap();
		b.add_message("bo", "second").await.unwrap();
		let patch = MetadataPatch {
			description: Some("from a".into()),
			..Default::default()
		};
		a.update_metadata(&patch).await.unwrap();

		let stored = ctx.storage().load(created.id()).await.unwrap();
		let contents: Vec<_> = stored
			.metadata
			.messages
			.unwrap_or_default()
			.into_iter()
			.map(|message| message.content)
			.collect();
		assert_eq!(contents, ["first", "second"]);
		assert_eq!(stored.metadata.description, "from a");
		assert_eq!(a.metadata().messages.as_ref().map(Vec::len), Some(2));
	}

	#[tokio::test]
	async fn update_applies_metadata_and_state_in_one_write() {
		let ctx = context();
		let mut session = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();
		ctx.clock().advance(7);

		let patch = MetadataPatch {
			name: Some("B".into()),
			..Default::default()
		};
		let mut state = BrowserSessionState::empty(3);
		state.origin = "https://b.example".into();
		session.update(Some(&patch), Some(state)).await.unwrap();

		let stored = ctx.storage().load(session.id()).await.unwrap();
		assert_eq!(stored.metadata.name, "B");
		assert_eq!(stored.state.origin, "https://b.example");
		assert_eq!(stored.metadata.updated_at, 1_007);
	}

	#[tokio::test]
	async fn huge_expire_in_saturates() {
		let ctx = context();
		let session = Session::create(&ctx, CreateOptions::new("A").expire_in(u64::MAX), None)
			.await
			.unwrap();

		assert_eq!(session.metadata().expire_at, Some(u64::MAX));
		assert!(!session.is_expired());
	}

	#[tokio::test]
	async fn import_reassigns_taken_ids() {
		let ctx = context();
		let original = Session::create(&ctx, CreateOptions::new("A"), None).await.unwrap();

		let imported = Session::import(&ctx, original.record()).await.unwrap();
		assert_ne!(imported.id(), original.id());
		assert_eq!(imported.metadata().name, "A");
	}

	#[tokio::test]
	async fn prune_removes_only_expired() {
		let ctx = context();
		let short = Session::create(&ctx, CreateOptions::new("short").expire_in(1), None).await.unwrap();
		let keep = Session::create(&ctx, CreateOptions::new("keep"), None).await.unwrap();
		ctx.clock().advance(2_000);

		let pruned = prune_expired(&ctx).await.unwrap();
		assert_eq!(pruned, vec![short.id().to_string()]);
		assert!(ctx.storage().exists(keep.id()).await.unwrap());
	}
}
