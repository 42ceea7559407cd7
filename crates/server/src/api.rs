//! CRUD HTTP API over persisted sessions.

use std::collections::BTreeSet;

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use psp::{CreateOptions, Session, codec};
use psp_protocol::{MetadataPatch, SessionFilter, TimeRange};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::AppState;
use crate::error::ServerError;

type ApiResult<T> = Result<T, ServerError>;

/// Routes mounted under `/api`, guarded by the bearer token when one is
/// configured.
pub fn routes(state: AppState) -> axum::Router<AppState> {
	Router::new()
		.route("/sessions", post(create_session).get(list_sessions))
		.route(
			"/sessions/{id}",
			get(get_session).patch(update_session).delete(delete_session),
		)
		.route("/sessions/{id}/clone", post(clone_session))
		.route("/sessions/{id}/messages", post(add_message))
		.layer(middleware::from_fn_with_state(state, require_bearer))
}

async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> ApiResult<Response> {
	if state.auth_token.is_some() {
		let presented = request
			.headers()
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "));
		if !state.token_matches(presented) {
			return Err(ServerError::Unauthorized("missing or invalid bearer token".into()));
		}
	}
	Ok(next.run(request).await)
}

/// Query string of `GET /api/sessions`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
	pub name: Option<String>,
	/// Comma-separated tags, all required.
	pub tags: Option<String>,
	pub created_after: Option<u64>,
	pub created_before: Option<u64>,
	pub updated_after: Option<u64>,
	pub updated_before: Option<u64>,
	pub limit: Option<usize>,
	pub offset: Option<usize>,
}

impl ListQuery {
	pub fn into_filter(self) -> SessionFilter {
		let range = |from: Option<u64>, to: Option<u64>| (from.is_some() || to.is_some()).then_some(TimeRange { from, to });
		let tags: BTreeSet<String> = self
			.tags
			.as_deref()
			.unwrap_or_default()
			.split(',')
			.map(str::trim)
			.filter(|tag| !tag.is_empty())
			.map(str::to_string)
			.collect();

		SessionFilter {
			name: self.name.filter(|name| !name.is_empty()),
			tags,
			created: range(self.created_after, self.created_before),
			updated: range(self.updated_after, self.updated_before),
			limit: self.limit,
			offset: self.offset,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
	#[serde(default)]
	pub metadata: Option<MetadataPatch>,
	/// Codec-encoded state replacing the current one.
	#[serde(default)]
	pub state: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloneRequest {
	#[serde(default)]
	pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
	pub author: String,
	pub content: String,
}

async fn create_session(State(state): State<AppState>, Json(options): Json<CreateOptions>) -> ApiResult<impl IntoResponse> {
	if options.name.trim().is_empty() {
		return Err(ServerError::BadRequest("name must not be empty".into()));
	}
	let session = Session::create(&state.ctx, options, None).await?;
	info!(target = "psp.server", id = %session.id(), "session created via api");
	Ok((
		StatusCode::CREATED,
		Json(json!({"sessionId": session.id(), "metadata": session.metadata()})),
	))
}

async fn list_sessions(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Json<Value>> {
	let filter = query.into_filter();
	let sessions = state.ctx.storage().list(&filter).await?;
	debug!(target = "psp.server", count = sessions.len(), "sessions listed");
	Ok(Json(json!({"sessions": sessions})))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
	let record = state.ctx.storage().load(&id).await?;
	Ok(Json(codec::encode_record(&record)?))
}

async fn update_session(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(request): Json<UpdateRequest>,
) -> ApiResult<Json<Value>> {
	let patch = request.metadata.filter(|patch| !patch.is_empty());
	if patch.is_none() && request.state.is_none() {
		return Err(ServerError::BadRequest("nothing to update: send metadata and/or state".into()));
	}
	let new_state = request
		.state
		.as_ref()
		.map(codec::decode)
		.transpose()
		.map_err(psp::Error::from)?;

	let mut session = Session::load(&state.ctx, &id).await?;
	session.update(patch.as_ref(), new_state).await?;
	Ok(Json(codec::encode_record(&session.record())?))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
	let mut session = Session::load(&state.ctx, &id).await?;
	session.delete().await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn clone_session(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(request): Json<CloneRequest>,
) -> ApiResult<impl IntoResponse> {
	let session = Session::load(&state.ctx, &id).await?;
	let clone = session.clone_as(request.name.as_deref()).await?;
	Ok((
		StatusCode::CREATED,
		Json(json!({"sessionId": clone.id(), "metadata": clone.metadata()})),
	))
}

async fn add_message(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(request): Json<MessageRequest>,
) -> ApiResult<impl IntoResponse> {
	let mut session = Session::load(&state.ctx, &id).await?;
	let message = session.add_message(request.author, request.content).await?;
	Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn list_query_builds_filter() {
		let query = ListQuery {
			tags: Some("a, b,,".into()),
			updated_after: Some(10),
			limit: Some(5),
			..Default::default()
		};
		let filter = query.into_filter();

		assert_eq!(filter.tags.len(), 2);
		assert_eq!(filter.updated, Some(TimeRange { from: Some(10), to: None }));
		assert_eq!(filter.created, None);
		assert_eq!(filter.limit, Some(5));
	}
}
