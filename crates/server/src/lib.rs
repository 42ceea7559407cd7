//! Session distributor and CRUD API server.
//!
//! Serves three things from one axum router:
//!
//! - `/ws`: the real-time session distributor (see [`ws`])
//! - `/api/sessions/...`: CRUD over persisted sessions (see [`api`])
//! - `/health`: liveness probe
//!
//! All shared state is explicit: [`AppState`] carries the [`SessionContext`]
//! and the [`SessionDistributor`], and sessions mutated through the API
//! publish to the distributor via [`DistributorObserver`].

pub mod api;
pub mod config;
pub mod distributor;
pub mod error;
pub mod observer;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use psp::{FileSystemStorage, SessionContext, StorageProvider};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::info;

pub use config::ServerConfig;
pub use distributor::{ConnectionId, SessionDistributor};
pub use error::ServerError;
pub use observer::DistributorObserver;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
	pub ctx: SessionContext,
	pub distributor: SessionDistributor,
	/// Required bearer/`CONNECT` token. `None` disables auth.
	pub auth_token: Option<Arc<str>>,
}

impl AppState {
	/// Wires `storage` to a fresh distributor.
	pub fn new(storage: Arc<dyn StorageProvider>, config: &ServerConfig) -> Self {
		let distributor = SessionDistributor::new(config.send_buffer);
		let ctx = SessionContext::new(storage).with_observer(Arc::new(DistributorObserver::new(distributor.clone())));
		Self {
			ctx,
			distributor,
			auth_token: config.auth_token.as_deref().map(Arc::from),
		}
	}

	pub fn token_matches(&self, presented: Option<&str>) -> bool {
		match &self.auth_token {
			Some(expected) => presented == Some(&**expected),
			None => true,
		}
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/ws", get(ws::ws_handler))
		.nest("/api", api::routes(state.clone()))
		.with_state(state)
}

async fn health() -> Json<Value> {
	Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

/// Serves `state` on `listener` until `shutdown` resolves, sweeping stale
/// connections every `ping_interval`.
pub async fn serve_with_shutdown<F>(listener: TcpListener, state: AppState, ping_interval: Duration, shutdown: F) -> Result<()>
where
	F: Future<Output = ()> + Send + 'static,
{
	let addr = listener.local_addr().context("Reading listener address")?;
	let sweeper = state.distributor.spawn_sweeper(ping_interval);
	info!(target = "psp.server", %addr, auth = state.auth_token.is_some(), "session server listening");

	let result = axum::serve(listener, router(state).into_make_service())
		.with_graceful_shutdown(shutdown)
		.await
		.context("Session server error");

	sweeper.abort();
	info!(target = "psp.server", "session server stopped");
	result
}

/// Runs the server described by `config` until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<()> {
	let storage_dir = config.storage_dir();
	tokio::fs::create_dir_all(&storage_dir)
		.await
		.with_context(|| format!("Creating storage directory {}", storage_dir.display()))?;
	info!(target = "psp.server", dir = %storage_dir.display(), "using filesystem storage");

	let state = AppState::new(Arc::new(FileSystemStorage::new(storage_dir)), &config);

	let addr: SocketAddr = config
		.bind_addr()
		.parse()
		.with_context(|| format!("Invalid host/port combination: {}", config.bind_addr()))?;
	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind session server to {addr}"))?;

	serve_with_shutdown(listener, state, config.ping_interval(), async {
		let _ = tokio::signal::ctrl_c().await;
	})
	.await
}
