//! Recorded interaction events.

use serde::{Deserialize, Serialize};

/// One recorded user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	#[serde(rename = "type")]
	pub event_type: String,
	/// Milliseconds since the recording started (not epoch).
	pub timestamp: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,
	#[serde(default)]
	pub data: serde_json::Value,
}

impl Event {
	pub fn new(event_type: impl Into<String>, timestamp: u64) -> Self {
		Self {
			event_type: event_type.into(),
			timestamp,
			target: None,
			data: serde_json::Value::Null,
		}
	}

	pub fn target(mut self, target: impl Into<String>) -> Self {
		self.target = Some(target.into());
		self
	}

	pub fn data(mut self, data: serde_json::Value) -> Self {
		self.data = data;
		self
	}

	pub fn kind(&self) -> EventKind {
		EventKind::parse(&self.event_type)
	}

	/// Reads a string field out of `data`.
	pub fn data_str(&self, field: &str) -> Option<&str> {
		self.data.get(field).and_then(|v| v.as_str())
	}
}

/// Event types every adapter understands during playback.
///
/// Anything else is [`EventKind::Unknown`] and skipped by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
	Click,
	Input,
	Navigation,
	Keypress,
	Scroll,
	Wait,
	Unknown,
}

impl EventKind {
	pub fn parse(raw: &str) -> Self {
		match raw {
			"click" => EventKind::Click,
			"input" => EventKind::Input,
			"navigation" => EventKind::Navigation,
			"keypress" => EventKind::Keypress,
			"scroll" => EventKind::Scroll,
			"wait" => EventKind::Wait,
			_ => EventKind::Unknown,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::Click => "click",
			EventKind::Input => "input",
			EventKind::Navigation => "navigation",
			EventKind::Keypress => "keypress",
			EventKind::Scroll => "scroll",
			EventKind::Wait => "wait",
			EventKind::Unknown => "unknown",
		}
	}
}

/// A finished recording window.
///
/// Events are non-decreasing in `timestamp` and `duration` is at least the
/// largest event timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
	#[serde(default)]
	pub events: Vec<Event>,
	/// Epoch milliseconds when recording started.
	pub start_time: u64,
	/// Milliseconds covered by the recording.
	#[serde(default)]
	pub duration: u64,
}

impl RecordingState {
	/// Builds a recording from `events`, ordering them by timestamp and
	/// deriving `duration` from the tail event.
	///
	/// The sort is stable, so events sharing a timestamp keep their capture order.
	pub fn from_events(start_time: u64, mut events: Vec<Event>) -> Self {
		events.sort_by_key(|event| event.timestamp);
		let duration = events.last().map(|event| event.timestamp).unwrap_or(0);
		Self { events, start_time, duration }
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}

	/// Checks the ordering and duration invariants.
	pub fn is_well_formed(&self) -> bool {
		let ordered = self.events.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp);
		let max = self.events.iter().map(|event| event.timestamp).max().unwrap_or(0);
		ordered && self.duration >= max
	}
}
