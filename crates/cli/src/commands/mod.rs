pub mod serve;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use psp::{FileSystemStorage, SessionContext};
use psp_server::ServerConfig;
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::error::Result;

/// Runs the parsed command and returns its envelope data.
pub async fn dispatch(cli: Cli) -> Result<Value> {
	match cli.command {
		Commands::Serve(args) => serve::run(args, cli.storage_dir).await,
		Commands::Session(args) => {
			let ctx = session_context(cli.storage_dir)?;
			session::run(&ctx, args.action).await
		}
	}
}

/// Filesystem-backed context rooted at `storage_dir`, or at the directory the
/// server config resolves to.
pub fn session_context(storage_dir: Option<PathBuf>) -> Result<SessionContext> {
	let dir = match storage_dir {
		Some(dir) => dir,
		None => ServerConfig::resolve(None)?.storage_dir(),
	};
	debug!(target = "psp.cli", dir = %dir.display(), "using session store");
	Ok(SessionContext::new(Arc::new(FileSystemStorage::new(dir))))
}
