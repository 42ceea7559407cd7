use std::path::PathBuf;

use psp_server::ServerConfig;
use serde_json::{Value, json};
use tracing::info;

use crate::cli::ServeArgs;
use crate::error::Result;

pub async fn run(args: ServeArgs, storage_dir: Option<PathBuf>) -> Result<Value> {
	let config = resolve_config(args, storage_dir)?;
	let addr = config.bind_addr();
	info!(target = "psp.cli", %addr, "starting session server");

	psp_server::run(config).await?;
	Ok(json!({"addr": addr, "stopped": true}))
}

/// Config file and environment, then flags on top.
pub fn resolve_config(args: ServeArgs, storage_dir: Option<PathBuf>) -> Result<ServerConfig> {
	let mut config = ServerConfig::resolve(args.config.as_deref())?;
	if let Some(host) = args.host {
		config.host = host;
	}
	if let Some(port) = args.port {
		config.port = port;
	}
	if storage_dir.is_some() {
		config.storage_dir = storage_dir;
	}
	Ok(config)
}
