//! Recording window shared by adapters.

use psp_protocol::Event;
use tracing::debug;

use crate::adapter::RecordingOptions;
use crate::error::{Error, Result};

#[derive(Debug)]
struct Window {
	started_at: u64,
	options: RecordingOptions,
	events: Vec<Event>,
}

/// Accumulates events between `start` and `stop`.
///
/// Event timestamps are relative to the window start and never decrease: an
/// event arriving with an earlier timestamp than its predecessor is moved up
/// to the predecessor's timestamp.
#[derive(Debug, Default)]
pub struct Recorder {
	window: Option<Window>,
}

impl Recorder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_recording(&self) -> bool {
		self.window.is_some()
	}

	/// Epoch ms at which the open window started.
	pub fn started_at(&self) -> Option<u64> {
		self.window.as_ref().map(|window| window.started_at)
	}

	pub fn options(&self) -> Option<&RecordingOptions> {
		self.window.as_ref().map(|window| &window.options)
	}

	/// Opens a window at `now` (epoch ms).
	pub fn start(&mut self, now: u64, options: RecordingOptions) -> Result<()> {
		if self.window.is_some() {
			return Err(Error::InvalidState("recording already in progress".into()));
		}
		debug!(target = "psp.session", started_at = now, "recording window opened");
		self.window = Some(Window {
			started_at: now,
			options,
			events: Vec::new(),
		});
		Ok(())
	}

	/// Appends an event whose timestamp is already relative to the window start.
	pub fn record(&mut self, mut event: Event) -> Result<()> {
		let Some(window) = self.window.as_mut() else {
			return Err(Error::InvalidState("recording not started".into()));
		};
		if let Some(selectors) = &window.options.selectors {
			let wanted = event.target.as_ref().is_none_or(|target| selectors.iter().any(|s| s == target));
			if !wanted {
				return Ok(());
			}
		}
		if let Some(last) = window.events.last() {
			event.timestamp = event.timestamp.max(last.timestamp);
		}
		window.events.push(event);
		Ok(())
	}

	/// Appends an event observed at `now` (epoch ms).
	pub fn record_at(&mut self, now: u64, event: Event) -> Result<()> {
		let started_at = self
			.started_at()
			.ok_or_else(|| Error::InvalidState("recording not started".into()))?;
		self.record(Event {
			timestamp: now.saturating_sub(started_at),
			..event
		})
	}

	/// Closes the window and returns its events, possibly none.
	pub fn stop(&mut self) -> Result<Vec<Event>> {
		match self.window.take() {
			Some(window) => {
				debug!(target = "psp.session", events = window.events.len(), "recording window closed");
				Ok(window.events)
			}
			None => Err(Error::InvalidState("stop_recording called without start_recording".into())),
		}
	}
}
