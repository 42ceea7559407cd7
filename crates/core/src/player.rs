//! Timed replay of recorded events.

use async_trait::async_trait;
use psp_protocol::{Event, EventKind};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::adapter::{PlaybackOptions, PlaybackReport};
use crate::error::Result;

/// Executes one replayed action against a live browser.
#[async_trait]
pub trait ActionExecutor: Send {
	/// Runs `event`. Never called for [`EventKind::Unknown`].
	async fn execute(&mut self, kind: EventKind, event: &Event) -> Result<()>;
}

/// Replays `events` in stored order.
///
/// Each event fires `timestamp / speed` after playback started, so the
/// original pacing is kept. Unknown event types are skipped. A failing action
/// is logged and skipped unless `validate_targets` is set, in which case its
/// error is returned and the rest of the sequence is not run.
pub async fn play_events<E>(executor: &mut E, events: &[Event], options: &PlaybackOptions) -> Result<PlaybackReport>
where
	E: ActionExecutor + ?Sized,
{
	let started = Instant::now();
	let mut report = PlaybackReport::default();

	for (index, event) in events.iter().enumerate() {
		let kind = event.kind();
		if kind == EventKind::Unknown {
			debug!(target = "psp.session", index, event_type = %event.event_type, "skipping unknown event");
			report.skipped_unknown += 1;
			continue;
		}

		sleep_until(started + options.offset_for(event.timestamp)).await;

		match executor.execute(kind, event).await {
			Ok(()) => report.executed += 1,
			Err(err) if options.validate_targets => {
				warn!(target = "psp.session", index, event_type = kind.as_str(), error = %err, "playback aborted");
				return Err(err);
			}
			Err(err) => {
				warn!(target = "psp.session", index, event_type = kind.as_str(), error = %err, "playback action failed, continuing");
				report.failed += 1;
			}
		}
	}

	debug!(
		target = "psp.session",
		executed = report.executed,
		failed = report.failed,
		skipped = report.skipped_unknown,
		"playback finished"
	);
	Ok(report)
}
