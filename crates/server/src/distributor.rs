//! Fan-out of session mutations to subscribed connections.
//!
//! Connections, their single subscription and the per-session subscriber
//! sets live in one [`Registry`] behind one mutex, shared by connect,
//! subscribe, broadcast and the liveness sweep. Each connection owns a
//! bounded outbound queue; a full queue drops the message for that
//! connection only, so one slow client never delays the rest.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use psp_protocol::ServerMessage;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

#[derive(Debug)]
struct Connection {
	tx: mpsc::Sender<ServerMessage>,
	/// Cleared by each sweep, set again by an inbound `PONG`.
	alive: bool,
	subscription: Option<String>,
}

#[derive(Debug, Default)]
struct Registry {
	next_id: ConnectionId,
	connections: HashMap<ConnectionId, Connection>,
	subscribers: HashMap<String, HashSet<ConnectionId>>,
}

impl Registry {
	fn detach(&mut self, id: ConnectionId, session_id: &str) {
		if let Some(set) = self.subscribers.get_mut(session_id) {
			set.remove(&id);
			if set.is_empty() {
				self.subscribers.remove(session_id);
			}
		}
	}

	fn remove(&mut self, id: ConnectionId) -> bool {
		match self.connections.remove(&id) {
			Some(connection) => {
				if let Some(session_id) = connection.subscription {
					self.detach(id, &session_id);
				}
				true
			}
			None => false,
		}
	}
}

/// Explicit pub/sub registry. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct SessionDistributor {
	registry: Arc<Mutex<Registry>>,
	send_buffer: usize,
}

impl SessionDistributor {
	pub fn new(send_buffer: usize) -> Self {
		Self {
			registry: Arc::default(),
			send_buffer: send_buffer.max(1),
		}
	}

	/// Registers a connection and returns its id and outbound queue.
	pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
		let (tx, rx) = mpsc::channel(self.send_buffer);
		let mut registry = self.registry.lock();
		registry.next_id += 1;
		let id = registry.next_id;
		registry.connections.insert(
			id,
			Connection {
				tx,
				alive: true,
				subscription: None,
			},
		);
		debug!(target = "psp.distributor", connection = id, "connection registered");
		(id, rx)
	}

	/// Forgets a connection and all its subscriptions.
	pub fn disconnect(&self, id: ConnectionId) {
		if self.registry.lock().remove(id) {
			debug!(target = "psp.distributor", connection = id, "connection removed");
		}
	}

	/// Subscribes `id` to `session_id`, replacing any prior subscription.
	/// Returns false for an unknown connection.
	pub fn subscribe(&self, id: ConnectionId, session_id: &str) -> bool {
		let mut registry = self.registry.lock();
		let previous = match registry.connections.get_mut(&id) {
			Some(connection) => connection.subscription.replace(session_id.to_string()),
			None => return false,
		};
		if let Some(previous) = previous.filter(|previous| previous != session_id) {
			registry.detach(id, &previous);
		}
		registry.subscribers.entry(session_id.to_string()).or_default().insert(id);
		debug!(target = "psp.distributor", connection = id, session = session_id, "subscribed");
		true
	}

	/// Drops the subscription of `id` if it is to `session_id`.
	pub fn unsubscribe(&self, id: ConnectionId, session_id: &str) -> bool {
		let mut registry = self.registry.lock();
		let Some(connection) = registry.connections.get_mut(&id) else {
			return false;
		};
		if connection.subscription.as_deref() != Some(session_id) {
			return false;
		}
		connection.subscription = None;
		registry.detach(id, session_id);
		debug!(target = "psp.distributor", connection = id, session = session_id, "unsubscribed");
		true
	}

	/// Queues `message` for every subscriber of `session_id` and returns how
	/// many accepted it. No subscribers is a no-op.
	pub fn broadcast(&self, session_id: &str, message: ServerMessage) -> usize {
		let registry = self.registry.lock();
		let Some(subscribers) = registry.subscribers.get(session_id) else {
			return 0;
		};

		let mut delivered = 0;
		for id in subscribers {
			let Some(connection) = registry.connections.get(id) else {
				continue;
			};
			match connection.tx.try_send(message.clone()) {
				Ok(()) => delivered += 1,
				Err(TrySendError::Full(_)) => {
					warn!(target = "psp.distributor", connection = *id, session = session_id, "send queue full, dropping message");
				}
				Err(TrySendError::Closed(_)) => {}
			}
		}
		delivered
	}

	pub fn publish_update(&self, session_id: &str, data: serde_json::Value) -> usize {
		self.broadcast(
			session_id,
			ServerMessage::Update {
				session_id: session_id.to_string(),
				data,
			},
		)
	}

	pub fn publish_event(&self, session_id: &str, data: serde_json::Value) -> usize {
		self.broadcast(
			session_id,
			ServerMessage::Event {
				session_id: session_id.to_string(),
				data,
			},
		)
	}

	/// Queues a message for one connection.
	pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
		let registry = self.registry.lock();
		registry
			.connections
			.get(&id)
			.is_some_and(|connection| connection.tx.try_send(message).is_ok())
	}

	/// Records an answer to the last liveness probe.
	pub fn mark_alive(&self, id: ConnectionId) {
		if let Some(connection) = self.registry.lock().connections.get_mut(&id) {
			connection.alive = true;
		}
	}

	/// One liveness round: connections that did not answer the previous probe
	/// are removed (dropping their queue closes the socket); every other
	/// connection is probed with `PING`. Returns the removed ids.
	pub fn sweep(&self) -> Vec<ConnectionId> {
		let mut registry = self.registry.lock();

		let stale: Vec<ConnectionId> = registry
			.connections
			.iter()
			.filter(|(_, connection)| !connection.alive)
			.map(|(id, _)| *id)
			.collect();
		for id in &stale {
			registry.remove(*id);
		}

		for (id, connection) in registry.connections.iter_mut() {
			match connection.tx.try_send(ServerMessage::Ping) {
				Ok(()) | Err(TrySendError::Closed(_)) => connection.alive = false,
				// Unprobed, so not judged this round.
				Err(TrySendError::Full(_)) => {
					debug!(target = "psp.distributor", connection = *id, "send queue full, ping deferred to next sweep");
				}
			}
		}

		if !stale.is_empty() {
			info!(target = "psp.distributor", reaped = stale.len(), "closed unresponsive connections");
		}
		stale
	}

	/// Runs [`sweep`](Self::sweep) every `interval` until the handle is aborted.
	pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
		let distributor = self.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await;
			loop {
				ticker.tick().await;
				distributor.sweep();
			}
		})
	}

	pub fn connection_count(&self) -> usize {
		self.registry.lock().connections.len()
	}

	pub fn subscriber_count(&self, session_id: &str) -> usize {
		self.registry.lock().subscribers.get(session_id).map_or(0, HashSet::len)
	}

	pub fn subscription_of(&self, id: ConnectionId) -> Option<String> {
		self.registry.lock().connections.get(&id).and_then(|c| c.subscription.clone())
	}
}

impl Default for SessionDistributor {
	fn default() -> Self {
		Self::new(crate::config::DEFAULT_SEND_BUFFER)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
		let mut out = Vec::new();
		while let Ok(message) = rx.try_recv() {
			out.push(message);
		}
		out
	}

	#[test]
	fn updates_reach_only_the_subscribed_session() {
		let distributor = SessionDistributor::default();
		let (a, mut rx_a) = distributor.connect();
		let (b, mut rx_b) = distributor.connect();
		distributor.subscribe(a, "S");
		distributor.subscribe(b, "T");

		distributor.publish_update("S", json!({"n": 1}));
		distributor.publish_update("T", json!({"n": 2}));
		distributor.publish_update("S", json!({"n": 3}));

		let got_a: Vec<_> = drain(&mut rx_a).iter().map(|m| m.session_id().map(str::to_string)).collect();
		assert_eq!(got_a, vec![Some("S".to_string()), Some("S".to_string())]);
		let got_b = drain(&mut rx_b);
		assert_eq!(got_b.len(), 1);
		assert_eq!(got_b[0].session_id(), Some("T"));
	}

	#[test]
	fn subscribing_again_replaces_the_prior_subscription() {
		let distributor = SessionDistributor::default();
		let (id, mut rx) = distributor.connect();
		distributor.subscribe(id, "S");
		distributor.subscribe(id, "T");

		assert_eq!(distributor.subscriber_count("S"), 0);
		assert_eq!(distributor.subscription_of(id).as_deref(), Some("T"));
		assert_eq!(distributor.publish_update("S", json!({})), 0);
		assert!(drain(&mut rx).is_empty());
	}

	#[test]
	fn unsubscribe_prunes_empty_sets() {
		let distributor = SessionDistributor::default();
		let (id, _rx) = distributor.connect();
		distributor.subscribe(id, "S");

		assert!(!distributor.unsubscribe(id, "other"));
		assert!(distributor.unsubscribe(id, "S"));
		assert_eq!(distributor.subscriber_count("S"), 0);
		assert!(distributor.registry.lock().subscribers.is_empty());
	}

	#[test]
	fn broadcast_without_subscribers_is_a_noop() {
		let distributor = SessionDistributor::default();
		assert_eq!(distributor.publish_event("nobody", json!({})), 0);
	}

	#[test]
	fn full_queue_drops_for_that_connection_only() {
		let distributor = SessionDistributor::new(1);
		let (slow, _slow_rx) = distributor.connect();
		let (fast, mut fast_rx) = distributor.connect();
		distributor.subscribe(slow, "S");
		distributor.subscribe(fast, "S");

		assert_eq!(distributor.publish_update("S", json!({"n": 1})), 2);
		drain(&mut fast_rx);
		assert_eq!(distributor.publish_update("S", json!({"n": 2})), 1);
		assert_eq!(drain(&mut fast_rx).len(), 1);
	}

	#[test]
	fn silent_connections_are_reaped_on_the_second_sweep() {
		let distributor = SessionDistributor::default();
		let (silent, mut silent_rx) = distributor.connect();
		let (chatty, mut chatty_rx) = distributor.connect();
		distributor.subscribe(silent, "S");
		distributor.subscribe(chatty, "S");

		assert!(distributor.sweep().is_empty());
		assert_eq!(drain(&mut silent_rx), vec![ServerMessage::Ping]);
		assert_eq!(drain(&mut chatty_rx), vec![ServerMessage::Ping]);
		distributor.mark_alive(chatty);

		assert_eq!(distributor.sweep(), vec![silent]);
		assert_eq!(distributor.subscriber_count("S"), 1);
		assert_eq!(distributor.connection_count(), 1);
		assert!(matches!(silent_rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
	}

	#[test]
	fn a_full_queue_defers_the_probe_instead_of_reaping() {
		let distributor = SessionDistributor::new(1);
		let (busy, mut busy_rx) = distributor.connect();
		distributor.subscribe(busy, "S");
		assert_eq!(distributor.publish_update("S", json!({"n": 1})), 1);

		assert!(distributor.sweep().is_empty());
		assert!(distributor.sweep().is_empty());
		assert_eq!(distributor.connection_count(), 1);

		assert_eq!(drain(&mut busy_rx).len(), 1);
		assert!(distributor.sweep().is_empty());
		assert_eq!(drain(&mut busy_rx), vec![ServerMessage::Ping]);
		assert_eq!(distributor.sweep(), vec![busy]);
	}

	#[test]
	fn disconnect_leaves_no_trace() {
		let distributor = SessionDistributor::default();
		let (id, _rx) = distributor.connect();
		distributor.subscribe(id, "S");
		distributor.disconnect(id);

		assert_eq!(distributor.connection_count(), 0);
		assert_eq!(distributor.subscriber_count("S"), 0);
		assert!(!distributor.subscribe(id, "S"));
	}

	#[tokio::test(start_paused = true)]
	async fn sweeper_reaps_within_two_intervals() {
		let distributor = SessionDistributor::default();
		let (id, _rx) = distributor.connect();
		distributor.subscribe(id, "S");

		let sweeper = distributor.spawn_sweeper(Duration::from_secs(10));
		tokio::time::sleep(Duration::from_secs(21)).await;

		assert_eq!(distributor.connection_count(), 0);
		assert_eq!(distributor.subscriber_count("S"), 0);
		sweeper.abort();
	}
}
