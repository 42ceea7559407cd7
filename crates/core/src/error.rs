//! Error types for the session engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A state or record tree whose shape could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode `{path}`: {reason}")]
pub struct DecodeError {
	/// JSON path of the offending node, e.g. `storage.cookies`.
	pub path: String,
	pub reason: String,
}

impl DecodeError {
	pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			reason: reason.into(),
		}
	}
}

/// Errors surfaced by sessions, adapters and storage providers.
#[derive(Debug, Error)]
pub enum Error {
	/// No persisted record for the id.
	#[error("Session not found: {id}")]
	NotFound { id: String },

	/// An adapter method was called before a successful `connect`.
	#[error("Adapter is not connected to a browser")]
	NotConnected,

	/// A browser operation was requested on a session without an adapter.
	#[error("No adapter available for this session")]
	NoAdapter,

	/// The operation is not valid in the current lifecycle state.
	#[error("Invalid state: {0}")]
	InvalidState(String),

	/// Playback was requested but the session holds no recorded events.
	#[error("Session {id} has no recording")]
	NoRecording { id: String },

	#[error(transparent)]
	Decode(#[from] DecodeError),

	#[error("Authentication failed: {0}")]
	Auth(String),

	#[error("Transport error: {0}")]
	Transport(String),

	/// An engine action failed (navigation, click, storage write, ...).
	#[error("{kind} failed: {message}")]
	Adapter { kind: String, message: String },

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn adapter(kind: impl Into<String>, message: impl Into<String>) -> Self {
		Error::Adapter {
			kind: kind.into(),
			message: message.into(),
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::NotFound { .. } => ErrorKind::NotFound,
			Error::NotConnected => ErrorKind::NotConnected,
			Error::NoAdapter => ErrorKind::NoAdapter,
			Error::InvalidState(_) => ErrorKind::InvalidState,
			Error::NoRecording { .. } => ErrorKind::NoRecording,
			Error::Decode(_) | Error::Json(_) => ErrorKind::Decode,
			Error::Auth(_) => ErrorKind::Auth,
			Error::Transport(_) => ErrorKind::Transport,
			Error::Adapter { .. } => ErrorKind::Adapter,
			Error::Io(_) => ErrorKind::Io,
		}
	}
}

/// Stable error codes shared by the HTTP API, distributor `ERROR` messages
/// and the CLI envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	NotFound,
	NotConnected,
	NoAdapter,
	InvalidState,
	NoRecording,
	Decode,
	Auth,
	Transport,
	Adapter,
	Io,
}

impl ErrorKind {
	pub fn code(&self) -> &'static str {
		match self {
			ErrorKind::NotFound => "NOT_FOUND",
			ErrorKind::NotConnected => "NOT_CONNECTED",
			ErrorKind::NoAdapter => "NO_ADAPTER",
			ErrorKind::InvalidState => "INVALID_STATE",
			ErrorKind::NoRecording => "NO_RECORDING",
			ErrorKind::Decode => "DECODE_ERROR",
			ErrorKind::Auth => "AUTH_ERROR",
			ErrorKind::Transport => "TRANSPORT_ERROR",
			ErrorKind::Adapter => "ADAPTER_ERROR",
			ErrorKind::Io => "IO_ERROR",
		}
	}
}

impl std::fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.code())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decode_error_names_the_path() {
		let err = Error::from(DecodeError::new("storage.cookies", "expected an array"));
		assert_eq!(err.to_string(), "cannot decode `storage.cookies`: expected an array");
		assert_eq!(err.kind().code(), "DECODE_ERROR");
	}

	#[test]
	fn codes_are_screaming_snake_case() {
		assert_eq!(Error::NotFound { id: "x".into() }.kind().code(), "NOT_FOUND");
		assert_eq!(Error::adapter("click", "no such element").kind(), ErrorKind::Adapter);
		assert_eq!(ErrorKind::NoRecording.to_string(), "NO_RECORDING");
	}
}
