//! Server configuration.
//!
//! Resolution order, later sources winning:
//!
//! 1. Built-in defaults
//! 2. JSON config file (`--config`, else `$XDG_CONFIG_HOME/psp/config.json`)
//! 3. `PSP_HOST`, `PSP_PORT`, `PSP_STORAGE_DIR`, `PSP_AUTH_TOKEN`
//! 4. Command line flags, applied by the caller

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServerError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SEND_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
	pub host: String,
	pub port: u16,
	/// Root of the filesystem session store.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub storage_dir: Option<PathBuf>,
	/// Token required by `CONNECT` and the `/api` routes. Auth is off when unset.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub auth_token: Option<String>,
	/// Liveness sweep period.
	pub ping_interval_secs: u64,
	/// Outbound messages queued per connection before new ones are dropped.
	pub send_buffer: usize,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			host: DEFAULT_HOST.to_string(),
			port: DEFAULT_PORT,
			storage_dir: None,
			auth_token: None,
			ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
			send_buffer: DEFAULT_SEND_BUFFER,
		}
	}
}

impl ServerConfig {
	/// Defaults, overlaid with `path` (or the default config file when it
	/// exists) and then the process environment.
	pub fn resolve(path: Option<&Path>) -> Result<Self, ServerError> {
		let mut config = match path {
			Some(path) => Self::load(path)?,
			None => match default_config_path() {
				Some(path) if path.is_file() => Self::load(&path)?,
				_ => Self::default(),
			},
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self, ServerError> {
		let content = fs::read_to_string(path).map_err(|err| ServerError::Config {
			path: path.to_path_buf(),
			message: err.to_string(),
		})?;
		let config = serde_json::from_str(&content).map_err(|err| ServerError::Config {
			path: path.to_path_buf(),
			message: err.to_string(),
		})?;
		debug!(target = "psp.server", path = %path.display(), "loaded server config");
		Ok(config)
	}

	/// Applies `PSP_*` overrides read through `lookup`.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ServerError> {
		if let Some(host) = lookup("PSP_HOST") {
			self.host = host;
		}
		if let Some(port) = lookup("PSP_PORT") {
			self.port = port
				.parse()
				.map_err(|_| ServerError::Env {
					key: "PSP_PORT",
					message: format!("not a port number: {port}"),
				})?;
		}
		if let Some(dir) = lookup("PSP_STORAGE_DIR") {
			self.storage_dir = Some(PathBuf::from(dir));
		}
		if let Some(token) = lookup("PSP_AUTH_TOKEN") {
			self.auth_token = Some(token).filter(|token| !token.is_empty());
		}
		Ok(())
	}

	/// Storage root: the configured directory, else the platform data dir.
	pub fn storage_dir(&self) -> PathBuf {
		self.storage_dir.clone().unwrap_or_else(default_storage_dir)
	}

	pub fn ping_interval(&self) -> Duration {
		Duration::from_secs(self.ping_interval_secs.max(1))
	}

	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

/// `$XDG_CONFIG_HOME/psp/config.json` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("psp").join("config.json"))
}

/// `$XDG_DATA_HOME/psp/sessions` or the platform equivalent, falling back to
/// `./.psp/sessions`.
pub fn default_storage_dir() -> PathBuf {
	dirs::data_dir()
		.map(|dir| dir.join("psp").join("sessions"))
		.unwrap_or_else(|| PathBuf::from(".psp").join("sessions"))
}
