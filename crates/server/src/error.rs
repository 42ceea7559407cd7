//! Server error type and its HTTP rendering.

use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use psp::ErrorKind;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
	#[error(transparent)]
	Session(#[from] psp::Error),

	#[error("Invalid request: {0}")]
	BadRequest(String),

	#[error("Unauthorized: {0}")]
	Unauthorized(String),

	#[error("Invalid configuration in {}: {message}", path.display())]
	Config { path: PathBuf, message: String },

	#[error("Invalid configuration in ${key}: {message}")]
	Env { key: &'static str, message: String },
}

impl ServerError {
	/// Stable code carried in error bodies and `ERROR` messages.
	pub fn code(&self) -> &'static str {
		match self {
			ServerError::Session(err) => err.kind().code(),
			ServerError::BadRequest(_) => "INVALID_REQUEST",
			ServerError::Unauthorized(_) => ErrorKind::Auth.code(),
			ServerError::Config { .. } | ServerError::Env { .. } => "CONFIG_ERROR",
		}
	}

	pub fn status(&self) -> StatusCode {
		match self {
			ServerError::Session(err) => match err.kind() {
				ErrorKind::NotFound => StatusCode::NOT_FOUND,
				ErrorKind::InvalidState | ErrorKind::NoRecording => StatusCode::CONFLICT,
				ErrorKind::Decode => StatusCode::BAD_REQUEST,
				ErrorKind::Auth => StatusCode::UNAUTHORIZED,
				ErrorKind::NotConnected | ErrorKind::NoAdapter => StatusCode::UNPROCESSABLE_ENTITY,
				ErrorKind::Transport | ErrorKind::Adapter => StatusCode::BAD_GATEWAY,
				ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
			},
			ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
			ServerError::Config { .. } | ServerError::Env { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			error!(target = "psp.server", code = self.code(), error = %self, "request failed");
		}
		let body = json!({
			"error": {
				"code": self.code(),
				"message": self.to_string(),
			}
		});
		(status, Json(body)).into_response()
	}
}
