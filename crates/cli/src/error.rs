use std::path::PathBuf;

use psp_server::ServerError;
use thiserror::Error;

use crate::output::CommandError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Session(#[from] psp::Error),

	#[error(transparent)]
	Server(#[from] ServerError),

	#[error("{action} {}: {source}", path.display())]
	File {
		action: &'static str,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn code(&self) -> &'static str {
		match self {
			CliError::Session(err) => err.kind().code(),
			CliError::Server(err) => err.code(),
			CliError::File { .. } => "IO_ERROR",
			CliError::InvalidInput(_) => "INVALID_INPUT",
			CliError::Anyhow(_) => "INTERNAL_ERROR",
		}
	}

	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		CommandError {
			code: self.code().to_string(),
			message: self.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_errors_keep_their_code() {
		let err = CliError::from(psp::Error::NotFound { id: "abc".into() });
		let command_error = err.to_command_error();

		assert_eq!(command_error.code, "NOT_FOUND");
		assert!(command_error.message.contains("abc"));
	}

	#[test]
	fn file_errors_name_the_path() {
		let err = CliError::File {
			action: "reading",
			path: PathBuf::from("/tmp/missing.json"),
			source: std::io::Error::from(std::io::ErrorKind::NotFound),
		};

		assert_eq!(err.code(), "IO_ERROR");
		assert!(err.to_string().starts_with("reading /tmp/missing.json"));
	}
}
