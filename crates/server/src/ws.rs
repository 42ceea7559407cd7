//! WebSocket endpoint of the session distributor.
//!
//! Each socket gets a distributor connection and a writer task draining its
//! outbound queue. The reader loop handles [`ClientMessage`]s; a handling
//! error is answered with `ERROR` and the socket stays open, except auth
//! failures, which send `ERROR` and close.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use psp::ErrorKind;
use psp_protocol::{ClientMessage, ServerMessage};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::distributor::ConnectionId;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

enum Flow {
	Continue,
	Close,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
	let (id, rx) = state.distributor.connect();
	info!(target = "psp.distributor", connection = id, "client connected");

	let (mut ws_tx, mut ws_rx) = socket.split();
	let mut send_task = tokio::spawn(async move {
		let mut outbound = ReceiverStream::new(rx);
		while let Some(message) = outbound.next().await {
			let text = match serde_json::to_string(&message) {
				Ok(text) => text,
				Err(err) => {
					warn!(target = "psp.distributor", connection = id, error = %err, "dropping unserializable message");
					continue;
				}
			};
			if ws_tx.send(Message::Text(text.into())).await.is_err() {
				return;
			}
		}
		let _ = ws_tx.send(Message::Close(None)).await;
	});

	let mut authenticated = state.auth_token.is_none();
	let mut writer_done = false;
	loop {
		tokio::select! {
			_ = &mut send_task => {
				writer_done = true;
				break;
			}
			frame = ws_rx.next() => match frame {
				Some(Ok(Message::Text(text))) => {
					if let Flow::Close = handle_text(&state, id, text.as_str(), &mut authenticated).await {
						break;
					}
				}
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(err)) => {
					debug!(target = "psp.distributor", connection = id, error = %err, "websocket error");
					break;
				}
			}
		}
	}

	state.distributor.disconnect(id);
	if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
		send_task.abort();
	}
	info!(target = "psp.distributor", connection = id, "client disconnected");
}

async fn handle_text(state: &AppState, id: ConnectionId, text: &str, authenticated: &mut bool) -> Flow {
	let message: ClientMessage = match serde_json::from_str(text) {
		Ok(message) => message,
		Err(err) => {
			reply(state, id, ServerMessage::error("INVALID_MESSAGE", err.to_string()));
			return Flow::Continue;
		}
	};

	match message {
		ClientMessage::Connect { token } => {
			if !state.token_matches(token.as_deref()) {
				warn!(target = "psp.distributor", connection = id, "rejected CONNECT with invalid token");
				reply(state, id, ServerMessage::error(ErrorKind::Auth.code(), "invalid or missing token"));
				return Flow::Close;
			}
			*authenticated = true;
			reply(state, id, ServerMessage::Connected { connection_id: id });
		}
		ClientMessage::Ping => {
			state.distributor.mark_alive(id);
			reply(state, id, ServerMessage::Pong);
		}
		ClientMessage::Pong => state.distributor.mark_alive(id),
		ClientMessage::Subscribe { session_id } => {
			if !*authenticated {
				reply(state, id, ServerMessage::error(ErrorKind::Auth.code(), "CONNECT with a token first"));
				return Flow::Close;
			}
			match state.ctx.storage().exists(&session_id).await {
				Ok(true) => {
					state.distributor.subscribe(id, &session_id);
					reply(state, id, ServerMessage::Subscribed { session_id });
				}
				Ok(false) => {
					let err = psp::Error::NotFound { id: session_id };
					reply(state, id, ServerMessage::error(err.kind().code(), err.to_string()));
				}
				Err(err) => reply(state, id, ServerMessage::error(err.kind().code(), err.to_string())),
			}
		}
		ClientMessage::Unsubscribe { session_id } => {
			if state.distributor.unsubscribe(id, &session_id) {
				reply(state, id, ServerMessage::Unsubscribed { session_id });
			} else {
				reply(
					state,
					id,
					ServerMessage::error("NOT_SUBSCRIBED", format!("not subscribed to {session_id}")),
				);
			}
		}
	}
	Flow::Continue
}

fn reply(state: &AppState, id: ConnectionId, message: ServerMessage) {
	if !state.distributor.send_to(id, message) {
		debug!(target = "psp.distributor", connection = id, "reply dropped");
	}
}
