//! In-memory browser and adapter.
//!
//! [`MemoryAdapter`] implements the whole [`Adapter`] contract against a
//! simulated [`MemoryBrowser`], so sessions can be exercised without a real
//! engine. Tests inspect and prepare the browser through
//! [`MemoryAdapter::browser`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use psp_protocol::{
	BrowserSessionState, Cookie, DomState, Event, EventKind, HistoryState, NetworkState, OriginStorage, STATE_VERSION,
	StorageSnapshot,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapter::{
	Adapter, AdapterCapabilities, PlaybackOptions, PlaybackReport, RecordingOptions, RestoreReport, StateSink,
	StorageArea, TargetHandle, apply_in_order, origin_of,
};
use crate::context::Clock;
use crate::error::{Error, Result};
use crate::player::{ActionExecutor, play_events};
use crate::recorder::Recorder;

/// Adapter type reported by [`MemoryAdapter`].
pub const MEMORY_ADAPTER: &str = "memory";

/// Sub-captures that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubCapture {
	Dom,
	History,
	Network,
}

/// Simulated browsing context.
#[derive(Debug, Default)]
pub struct MemoryBrowser {
	pub url: String,
	pub title: Option<String>,
	pub cookies: Vec<Cookie>,
	pub local_storage: OriginStorage,
	pub session_storage: OriginStorage,
	pub html: Option<String>,
	/// Form field values keyed by selector.
	pub fields: BTreeMap<String, String>,
	/// Every operation performed, in order (`cookies`, `navigate:<url>`,
	/// `localStorage:<origin>`, `click:<selector>`, ...).
	pub journal: Vec<String>,
	/// Selectors whose actions fail during playback.
	pub failing_targets: HashSet<String>,
	/// Sub-captures that error out.
	pub broken: HashSet<SubCapture>,
}

impl MemoryBrowser {
	pub fn at(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			..Default::default()
		}
	}

	pub fn origin(&self) -> String {
		origin_of(&self.url)
	}

	/// Writes into the storage of the page's current origin.
	pub fn set_local(&mut self, key: &str, value: &str) {
		let origin = self.origin();
		self.local_storage.set(origin, key, value);
	}

	pub fn set_session(&mut self, key: &str, value: &str) {
		let origin = self.origin();
		self.session_storage.set(origin, key, value);
	}

	pub fn actions(&self) -> Vec<&str> {
		self.journal
			.iter()
			.map(String::as_str)
			.filter(|entry| !entry.starts_with("cookies") && !entry.contains("Storage:"))
			.collect()
	}

	fn sub_capture(&self, which: SubCapture) -> Result<()> {
		if self.broken.contains(&which) {
			return Err(Error::adapter(format!("{which:?} capture"), "not available in this context"));
		}
		Ok(())
	}
}

#[async_trait]
impl StateSink for MemoryBrowser {
	async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()> {
		for cookie in cookies {
			match self.cookies.iter_mut().find(|existing| existing.key() == cookie.key()) {
				Some(existing) => *existing = cookie.clone(),
				None => self.cookies.push(cookie.clone()),
			}
		}
		self.journal.push("cookies".into());
		Ok(())
	}

	async fn navigate(&mut self, url: &str) -> Result<()> {
		if url::Url::parse(url).is_err() {
			return Err(Error::adapter("navigation", format!("invalid URL: {url}")));
		}
		self.url = url.to_string();
		self.journal.push(format!("navigate:{url}"));
		Ok(())
	}

	async fn current_origin(&mut self) -> Result<String> {
		Ok(self.origin())
	}

	async fn write_storage(&mut self, area: StorageArea, origin: &str, entries: &BTreeMap<String, String>) -> Result<()> {
		let storage = match area {
			StorageArea::Local => &mut self.local_storage,
			StorageArea::Session => &mut self.session_storage,
		};
		storage.replace_origin(origin, entries.clone());
		self.journal.push(format!("{}:{origin}", area.as_str()));
		Ok(())
	}
}

#[async_trait]
impl ActionExecutor for MemoryBrowser {
	async fn execute(&mut self, kind: EventKind, event: &Event) -> Result<()> {
		if let Some(target) = &event.target {
			if self.failing_targets.contains(target) {
				return Err(Error::adapter(kind.as_str(), format!("no element matches {target}")));
			}
		}

		let target = event.target.as_deref().unwrap_or("");
		match kind {
			EventKind::Click | EventKind::Keypress | EventKind::Scroll => {
				if kind == EventKind::Click && target.is_empty() {
					return Err(Error::adapter("click", "event has no target"));
				}
				self.journal.push(format!("{}:{target}", kind.as_str()));
			}
			EventKind::Input => {
				let value = event.data_str("value").unwrap_or_default();
				self.fields.insert(target.to_string(), value.to_string());
				self.journal.push(format!("input:{target}"));
			}
			EventKind::Navigation => {
				let url = event
					.data_str("url")
					.ok_or_else(|| Error::adapter("navigation", "event has no url"))?
					.to_string();
				self.navigate(&url).await?;
			}
			EventKind::Wait | EventKind::Unknown => {}
		}
		Ok(())
	}
}

/// Adapter over a shared [`MemoryBrowser`].
pub struct MemoryAdapter {
	browser: Arc<Mutex<MemoryBrowser>>,
	target: Mutex<Option<TargetHandle>>,
	recorder: Mutex<Recorder>,
	capabilities: AdapterCapabilities,
	clock: Clock,
}

impl MemoryAdapter {
	pub fn new(browser: MemoryBrowser) -> Self {
		Self {
			browser: Arc::new(Mutex::new(browser)),
			target: Mutex::new(None),
			recorder: Mutex::new(Recorder::new()),
			capabilities: AdapterCapabilities {
				session_storage: true,
				dom: true,
				history: true,
				network: false,
				recording: true,
			},
			clock: Clock::System,
		}
	}

	pub fn with_capabilities(mut self, capabilities: AdapterCapabilities) -> Self {
		self.capabilities = capabilities;
		self
	}

	pub fn with_clock(mut self, clock: Clock) -> Self {
		self.clock = clock;
		self
	}

	pub fn browser(&self) -> &Arc<Mutex<MemoryBrowser>> {
		&self.browser
	}

	/// Handle currently bound, if any.
	pub async fn target(&self) -> Option<TargetHandle> {
		self.target.lock().await.clone()
	}

	/// Feeds an interaction into the open recording window, as a real engine
	/// would when the user acts on the page.
	pub async fn observe(&self, event: Event) -> Result<()> {
		self.ensure_connected().await?;
		let now = self.clock.now_ms();
		self.recorder.lock().await.record_at(now, event)
	}

	async fn ensure_connected(&self) -> Result<()> {
		match *self.target.lock().await {
			Some(_) => Ok(()),
			None => Err(Error::NotConnected),
		}
	}

	/// Runs one optional sub-capture, degrading to `None` when unsupported or
	/// failing.
	fn best_effort<T>(&self, which: SubCapture, supported: bool, capture: impl FnOnce() -> Result<T>) -> Option<T> {
		if !supported {
			debug!(target = "psp.session", section = ?which, "sub-capture not supported, skipping");
			return None;
		}
		match capture() {
			Ok(section) => Some(section),
			Err(err) => {
				warn!(target = "psp.session", section = ?which, error = %err, "sub-capture failed, continuing without it");
				None
			}
		}
	}
}

#[async_trait]
impl Adapter for MemoryAdapter {
	fn adapter_type(&self) -> &str {
		MEMORY_ADAPTER
	}

	fn capabilities(&self) -> AdapterCapabilities {
		self.capabilities
	}

	async fn connect(&self, target: &TargetHandle) -> Result<()> {
		let mut bound = self.target.lock().await;
		if bound.as_ref() == Some(target) {
			return Ok(());
		}
		debug!(target = "psp.session", handle = %target.id, "memory adapter bound");
		*bound = Some(target.clone());
		Ok(())
	}

	async fn capture_state(&self) -> Result<BrowserSessionState> {
		self.ensure_connected().await?;
		let now = self.clock.now_ms();
		let browser = self.browser.lock().await;
		let origin = browser.origin();

		let mut storage = StorageSnapshot {
			cookies: browser.cookies.clone(),
			..Default::default()
		};
		if let Some(entries) = browser.local_storage.origin(&origin) {
			storage.local_storage.replace_origin(origin.clone(), entries.clone());
		}
		if self.capabilities.session_storage {
			if let Some(entries) = browser.session_storage.origin(&origin) {
				storage.session_storage.replace_origin(origin.clone(), entries.clone());
			}
		}

		let dom = self.best_effort(SubCapture::Dom, self.capabilities.dom, || {
			browser.sub_capture(SubCapture::Dom)?;
			Ok(DomState {
				html: browser.html.clone(),
				scroll_position: None,
				form_data: browser.fields.clone(),
			})
		});
		let history = self.best_effort(SubCapture::History, self.capabilities.history, || {
			browser.sub_capture(SubCapture::History)?;
			Ok(HistoryState::single(browser.url.clone(), browser.title.clone(), now))
		});
		let network = self.best_effort(SubCapture::Network, self.capabilities.network, || {
			browser.sub_capture(SubCapture::Network)?;
			Ok(NetworkState::default())
		});

		Ok(BrowserSessionState {
			version: STATE_VERSION.to_string(),
			timestamp: now,
			origin,
			storage,
			dom,
			history,
			network,
			recording: None,
			extensions: None,
		})
	}

	async fn apply_state(&self, state: &BrowserSessionState) -> Result<RestoreReport> {
		self.ensure_connected().await?;
		let mut browser = self.browser.lock().await;
		let report = apply_in_order(&mut *browser, state).await?;

		if let Some(dom) = &state.dom {
			browser.fields.extend(dom.form_data.iter().map(|(k, v)| (k.clone(), v.clone())));
		}
		Ok(report)
	}

	async fn start_recording(&self, options: RecordingOptions) -> Result<()> {
		self.ensure_connected().await?;
		if !self.capabilities.recording {
			return Err(Error::adapter("recording", "not supported by this adapter"));
		}
		let now = self.clock.now_ms();
		self.recorder.lock().await.start(now, options)
	}

	async fn stop_recording(&self) -> Result<Vec<Event>> {
		self.ensure_connected().await?;
		self.recorder.lock().await.stop()
	}

	async fn play_recording(&self, events: &[Event], options: PlaybackOptions) -> Result<PlaybackReport> {
		self.ensure_connected().await?;
		let mut browser = self.browser.lock().await;
		play_events(&mut *browser, events, &options).await
	}
}
