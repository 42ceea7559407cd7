//! The capability contract every automation engine integration implements.
//!
//! Engines are injected into a [`Session`](crate::Session) as
//! `Arc<dyn Adapter>`; the engine crate never depends on a concrete browser
//! technology. Adapters usually compose the shared building blocks instead of
//! re-implementing them:
//!
//! - [`Recorder`](crate::Recorder) for the recording window
//! - [`play_events`](crate::play_events) for timed replay
//! - [`apply_in_order`] for the cookies, navigate, storage sequence of a restore

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use psp_protocol::{BrowserSessionState, Cookie, Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Identifies the live browsing context an adapter binds to.
///
/// Two handles are the same target when their `id`s match.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct TargetHandle {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub endpoint: Option<String>,
}

impl TargetHandle {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			endpoint: None,
		}
	}

	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());
		self
	}
}

impl PartialEq for TargetHandle {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

/// Sub-captures an adapter supports. Unsupported sections are left out of a
/// capture instead of failing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterCapabilities {
	pub session_storage: bool,
	pub dom: bool,
	pub history: bool,
	pub network: bool,
	pub recording: bool,
}

impl Default for AdapterCapabilities {
	fn default() -> Self {
		Self {
			session_storage: true,
			dom: false,
			history: true,
			network: false,
			recording: false,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
	#[serde(default)]
	pub capture_network: bool,
	#[serde(default)]
	pub capture_console: bool,
	/// Restrict recorded interactions to these selectors.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selectors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackOptions {
	/// Replay speed multiplier. `0` replays without waiting.
	#[serde(default = "default_speed")]
	pub speed: f64,
	/// Abort on the first failing action instead of skipping it.
	#[serde(default)]
	pub validate_targets: bool,
}

fn default_speed() -> f64 {
	1.0
}

impl Default for PlaybackOptions {
	fn default() -> Self {
		Self {
			speed: default_speed(),
			validate_targets: false,
		}
	}
}

impl PlaybackOptions {
	pub fn with_speed(mut self, speed: f64) -> Self {
		self.speed = speed;
		self
	}

	pub fn validate_targets(mut self, validate: bool) -> Self {
		self.validate_targets = validate;
		self
	}

	/// Offset from playback start at which an event recorded at
	/// `timestamp` ms fires. Zero, negative or non-finite speeds never wait.
	pub fn offset_for(&self, timestamp: u64) -> Duration {
		if !self.speed.is_finite() || self.speed <= 0.0 {
			return Duration::ZERO;
		}
		Duration::from_micros((timestamp as f64 * 1000.0 / self.speed).round() as u64)
	}
}

/// What a restore actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
	pub applied_cookies: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub navigated_to: Option<String>,
	/// Origins whose local/session storage was written.
	pub applied_origins: Vec<String>,
	/// Origins whose storage was dropped because the browsing context was not
	/// on that origin after navigation.
	pub skipped_origins: Vec<String>,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackReport {
	pub executed: usize,
	pub skipped_unknown: usize,
	pub failed: usize,
}

/// Capability interface of one automation engine.
///
/// Every method except [`connect`](Adapter::connect), [`adapter_type`](Adapter::adapter_type)
/// and [`capabilities`](Adapter::capabilities) fails with
/// [`Error::NotConnected`](crate::Error::NotConnected) until a connect succeeded.
#[async_trait]
pub trait Adapter: Send + Sync {
	/// Stable engine name, recorded as `createdWith`.
	fn adapter_type(&self) -> &str;

	fn capabilities(&self) -> AdapterCapabilities {
		AdapterCapabilities::default()
	}

	/// Binds to `target`. Idempotent for the same handle, re-binds otherwise.
	async fn connect(&self, target: &TargetHandle) -> Result<()>;

	/// Captures the live browser. `version`, `timestamp`, `origin` and
	/// `storage` are always populated; other sections are best-effort.
	async fn capture_state(&self) -> Result<BrowserSessionState>;

	/// Applies cookies, then navigates, then writes per-origin storage.
	async fn apply_state(&self, state: &BrowserSessionState) -> Result<RestoreReport>;

	async fn start_recording(&self, options: RecordingOptions) -> Result<()>;

	/// Closes the recording window and returns its events, possibly none.
	async fn stop_recording(&self) -> Result<Vec<Event>>;

	async fn play_recording(&self, events: &[Event], options: PlaybackOptions) -> Result<PlaybackReport>;
}

/// Which per-origin storage area a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
	Local,
	Session,
}

impl StorageArea {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageArea::Local => "localStorage",
			StorageArea::Session => "sessionStorage",
		}
	}
}

/// Low-level browser operations a restore is built from.
#[async_trait]
pub trait StateSink: Send {
	async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()>;

	async fn navigate(&mut self, url: &str) -> Result<()>;

	/// Serialized origin of the page currently loaded.
	async fn current_origin(&mut self) -> Result<String>;

	/// Replaces `origin`'s entries in `area`. Only called for the current origin.
	async fn write_storage(&mut self, area: StorageArea, origin: &str, entries: &BTreeMap<String, String>) -> Result<()>;
}

/// Restores `state` through `sink`: cookies, then navigation, then storage.
///
/// Navigation goes to `history.currentUrl` when present, else to `origin`.
/// Per-origin storage is only written for the origin the browsing context is
/// on afterwards; every other origin is reported in
/// [`RestoreReport::skipped_origins`] and left untouched.
pub async fn apply_in_order<S>(sink: &mut S, state: &BrowserSessionState) -> Result<RestoreReport>
where
	S: StateSink + ?Sized,
{
	let mut report = RestoreReport::default();

	if !state.storage.cookies.is_empty() {
		sink.set_cookies(&state.storage.cookies).await?;
		report.applied_cookies = state.storage.cookies.len();
	}

	let destination = state
		.history
		.as_ref()
		.map(|history| history.current_url.as_str())
		.filter(|url| !url.is_empty())
		.or_else(|| Some(state.origin.as_str()).filter(|origin| !origin.is_empty()));
	if let Some(url) = destination {
		sink.navigate(url).await?;
		report.navigated_to = Some(url.to_string());
	}

	let current = sink.current_origin().await?;
	for (area, storage) in [
		(StorageArea::Local, &state.storage.local_storage),
		(StorageArea::Session, &state.storage.session_storage),
	] {
		for (origin, entries) in storage.iter() {
			if origin == current {
				sink.write_storage(area, origin, entries).await?;
				if !report.applied_origins.iter().any(|o| o == origin) {
					report.applied_origins.push(origin.to_string());
				}
			} else if !report.skipped_origins.iter().any(|o| o == origin) {
				report.skipped_origins.push(origin.to_string());
			}
		}
	}

	if !report.skipped_origins.is_empty() {
		warn!(
			target = "psp.session",
			current = %current,
			skipped = ?report.skipped_origins,
			"storage for other origins was not restored"
		);
	}
	debug!(target = "psp.session", cookies = report.applied_cookies, origins = report.applied_origins.len(), "state applied");

	Ok(report)
}

/// Serialized origin (`scheme://host[:port]`) of `url`, or `"null"` for
/// opaque and unparsable URLs.
pub fn origin_of(url: &str) -> String {
	match url::Url::parse(url) {
		Ok(parsed) => parsed.origin().ascii_serialization(),
		Err(_) => "null".to_string(),
	}
}
