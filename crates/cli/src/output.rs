//! Structured output envelope for all CLI commands.
//!
//! Every command prints exactly one envelope on stdout:
//!
//! ```json
//! { "ok": true, "command": "session create", "data": { ... } }
//! ```
//!
//! On failure:
//!
//! ```json
//! {
//!   "ok": false,
//!   "command": "session show",
//!   "error": { "code": "NOT_FOUND", "message": "Session not found: abc" }
//! }
//! ```

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,

	/// Command name (e.g. "serve", "session list")
	pub command: String,

	/// Command-specific result data (only present on success)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	/// Error information (only present on failure)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
}

impl<T: Serialize> CommandResult<T> {
	pub fn success(command: impl Into<String>, data: T) -> Self {
		Self {
			ok: true,
			command: command.into(),
			data: Some(data),
			error: None,
		}
	}

	pub fn failure(command: impl Into<String>, error: CommandError) -> Self {
		Self {
			ok: false,
			command: command.into(),
			data: None,
			error: Some(error),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
	/// Stable machine-readable code, shared with the HTTP and WebSocket
	/// error bodies.
	pub code: String,
	pub message: String,
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>) {
	let mut stdout = io::stdout().lock();
	match serde_json::to_string_pretty(result) {
		Ok(json) => {
			let _ = writeln!(stdout, "{json}");
		}
		Err(err) => {
			let _ = writeln!(
				stdout,
				r#"{{"ok":false,"command":"{}","error":{{"code":"INTERNAL_ERROR","message":"serialization failed: {}"}}}}"#,
				result.command,
				err.to_string().replace('"', "'")
			);
		}
	}
}

/// Short human-readable line on stderr, next to the JSON envelope.
pub fn print_error_stderr(error: &CommandError) {
	let _ = writeln!(io::stderr().lock(), "error[{}]: {}", error.code, error.message);
}
