//! Bridges session mutations into the distributor.

use psp::SessionObserver;
use psp::codec;
use psp_protocol::{BrowserSessionState, SessionMetadata};
use serde_json::{Value, json};
use tracing::warn;

use crate::distributor::SessionDistributor;

/// Publishes `UPDATE` for every persisted mutation and `EVENT` for discrete
/// occurrences (messages, finished recordings, deletion).
#[derive(Debug, Clone)]
pub struct DistributorObserver {
	distributor: SessionDistributor,
}

impl DistributorObserver {
	pub fn new(distributor: SessionDistributor) -> Self {
		Self { distributor }
	}
}

impl SessionObserver for DistributorObserver {
	fn session_updated(&self, metadata: &SessionMetadata, state: &BrowserSessionState) {
		let state = match codec::encode(state) {
			Ok(state) => state,
			Err(err) => {
				warn!(target = "psp.distributor", session = %metadata.id, error = %err, "state not encodable, sending metadata only");
				Value::Null
			}
		};
		self.distributor
			.publish_update(&metadata.id, json!({"metadata": metadata, "state": state}));
	}

	fn session_event(&self, session_id: &str, data: Value) {
		self.distributor.publish_event(session_id, data);
	}

	fn session_deleted(&self, session_id: &str) {
		self.distributor.publish_event(session_id, json!({"type": "deleted"}));
	}
}
