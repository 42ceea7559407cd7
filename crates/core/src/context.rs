//! Explicitly constructed engine context shared by sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use psp_protocol::{BrowserSessionState, SessionMetadata};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::storage::StorageProvider;

/// Receives session mutations after they are persisted.
///
/// Called synchronously from the mutating operation, so implementations must
/// not block.
pub trait SessionObserver: Send + Sync {
	/// Metadata or state of a session changed.
	fn session_updated(&self, metadata: &SessionMetadata, state: &BrowserSessionState);

	/// A discrete occurrence within a session.
	fn session_event(&self, session_id: &str, data: serde_json::Value);

	fn session_deleted(&self, _session_id: &str) {}
}

/// Source of epoch-millisecond timestamps.
#[derive(Debug, Clone, Default)]
pub enum Clock {
	#[default]
	System,
	/// Manually driven clock for tests and deterministic tooling.
	Manual(Arc<AtomicU64>),
}

impl Clock {
	pub fn manual(start_ms: u64) -> Self {
		Clock::Manual(Arc::new(AtomicU64::new(start_ms)))
	}

	pub fn now_ms(&self) -> u64 {
		match self {
			Clock::System => SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.map(|elapsed| elapsed.as_millis() as u64)
				.unwrap_or(0),
			Clock::Manual(now) => now.load(Ordering::SeqCst),
		}
	}

	/// Moves a manual clock forward. No effect on the system clock.
	pub fn advance(&self, ms: u64) {
		if let Clock::Manual(now) = self {
			now.fetch_add(ms, Ordering::SeqCst);
		}
	}
}

/// Storage provider, observer, per-id locks and clock used by sessions.
///
/// Cheap to clone; clones share everything. Two contexts built separately
/// share nothing, so isolated engines can run side by side.
#[derive(Clone)]
pub struct SessionContext {
	storage: Arc<dyn StorageProvider>,
	observer: Option<Arc<dyn SessionObserver>>,
	clock: Clock,
	locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SessionContext {
	pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
		Self {
			storage,
			observer: None,
			clock: Clock::System,
			locks: Arc::default(),
		}
	}

	pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
		self.observer = Some(observer);
		self
	}

	pub fn with_clock(mut self, clock: Clock) -> Self {
		self.clock = clock;
		self
	}

	pub fn storage(&self) -> &Arc<dyn StorageProvider> {
		&self.storage
	}

	pub fn observer(&self) -> Option<&Arc<dyn SessionObserver>> {
		self.observer.as_ref()
	}

	pub fn clock(&self) -> &Clock {
		&self.clock
	}

	pub fn now_ms(&self) -> u64 {
		self.clock.now_ms()
	}

	/// Serializes writers of one session id within this context.
	///
	/// Lock entries nobody holds are dropped on the next acquisition.
	pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
		let entry = {
			let mut locks = self.locks.lock();
			locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
			locks.entry(id.to_string()).or_default().clone()
		};
		entry.lock_owned().await
	}

	pub(crate) fn notify_updated(&self, metadata: &SessionMetadata, state: &BrowserSessionState) {
		if let Some(observer) = &self.observer {
			observer.session_updated(metadata, state);
		}
	}

	pub(crate) fn notify_event(&self, session_id: &str, data: serde_json::Value) {
		if let Some(observer) = &self.observer {
			observer.session_event(session_id, data);
		}
	}

	pub(crate) fn notify_deleted(&self, session_id: &str) {
		if let Some(observer) = &self.observer {
			observer.session_deleted(session_id);
		}
	}

	#[cfg(test)]
	fn tracked_locks(&self) -> usize {
		self.locks.lock().len()
	}
}

impl fmt::Debug for SessionContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionContext")
			.field("observer", &self.observer.is_some())
			.field("clock", &self.clock)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::storage::MemoryStorage;

	fn context() -> SessionContext {
		SessionContext::new(Arc::new(MemoryStorage::new()))
	}

	#[test]
	fn manual_clock_advances() {
		let clock = Clock::manual(10);
		clock.advance(5);
		assert_eq!(clock.now_ms(), 15);
		assert!(Clock::System.now_ms() > 1_600_000_000_000);
	}

	#[tokio::test]
	async fn same_id_is_serialized() {
		let ctx = context();
		let guard = ctx.lock("s1").await;

		let other = ctx.clone();
		let waiter = tokio::spawn(async move {
			let _guard = other.lock("s1").await;
		});
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!waiter.is_finished());

		drop(guard);
		waiter.await.unwrap();
	}

	#[tokio::test]
	async fn different_ids_do_not_block() {
		let ctx = context();
		let _a = ctx.lock("a1").await;
		let _b = tokio::time::timeout(Duration::from_millis(50), ctx.lock("b1")).await.unwrap();
	}

	#[tokio::test]
	async fn idle_locks_are_pruned() {
		let ctx = context();
		drop(ctx.lock("a1").await);
		drop(ctx.lock("b1").await);
		let _c = ctx.lock("c1").await;
		assert_eq!(ctx.tracked_locks(), 1);
	}
}
