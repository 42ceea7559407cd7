//! Real-time message protocol between the session distributor and clients.
//!
//! Every frame is a JSON object tagged by `type`:
//!
//! 1. Client sends [`ClientMessage::Connect`] (carrying a token when the
//!    server has auth enabled); the server answers [`ServerMessage::Connected`]
//! 2. Client sends [`ClientMessage::Subscribe`] for one session; a second
//!    subscribe replaces the first
//! 3. Server pushes [`ServerMessage::Update`] on metadata/state mutations and
//!    [`ServerMessage::Event`] for discrete occurrences
//! 4. Either side may send `PING`; the other answers `PONG`

use serde::{Deserialize, Serialize};

/// Message sent from a client to the distributor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ClientMessage {
	Connect {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		token: Option<String>,
	},
	Subscribe {
		session_id: String,
	},
	Unsubscribe {
		session_id: String,
	},
	Ping,
	Pong,
}

/// Message sent from the distributor to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ServerMessage {
	Connected {
		connection_id: u64,
	},
	Subscribed {
		session_id: String,
	},
	Unsubscribed {
		session_id: String,
	},
	/// Session metadata or state changed.
	Update {
		session_id: String,
		data: serde_json::Value,
	},
	/// A discrete occurrence within a session (message, recording, ...).
	Event {
		session_id: String,
		data: serde_json::Value,
	},
	Ping,
	Pong,
	Error {
		code: String,
		message: String,
	},
}

impl ServerMessage {
	/// Session the message is scoped to, if any.
	pub fn session_id(&self) -> Option<&str> {
		match self {
			ServerMessage::Subscribed { session_id }
			| ServerMessage::Unsubscribed { session_id }
			| ServerMessage::Update { session_id, .. }
			| ServerMessage::Event { session_id, .. } => Some(session_id),
			_ => None,
		}
	}

	pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
		ServerMessage::Error {
			code: code.into(),
			message: message.into(),
		}
	}
}
