use std::path::Path;
use std::sync::Arc;

use psp::testing::{MemoryAdapter, MemoryBrowser};
use psp::{CreateOptions, PlaybackOptions, Session, SessionContext, TargetHandle, codec, prune_expired};
use psp_protocol::SessionFilter;
use serde_json::{Value, json};
use tracing::info;

use crate::cli::SessionAction;
use crate::error::{CliError, Result};

pub async fn run(ctx: &SessionContext, action: SessionAction) -> Result<Value> {
	match action {
		SessionAction::Create {
			name,
			description,
			tags,
			expire_in,
		} => {
			if name.trim().is_empty() {
				return Err(CliError::InvalidInput("session name must not be empty".into()));
			}
			let mut options = tags.into_iter().fold(CreateOptions::new(name), |options, tag| options.tag(tag));
			if let Some(description) = description {
				options = options.description(description);
			}
			if let Some(secs) = expire_in {
				options = options.expire_in(secs);
			}
			let session = Session::create(ctx, options, None).await?;
			Ok(json!({"sessionId": session.id(), "metadata": session.metadata()}))
		}
		SessionAction::List {
			name,
			tags,
			limit,
			offset,
		} => {
			let filter = SessionFilter {
				name,
				tags: tags.into_iter().collect(),
				limit,
				offset,
				..Default::default()
			};
			let sessions = ctx.storage().list(&filter).await?;
			Ok(json!({"count": sessions.len(), "sessions": sessions}))
		}
		SessionAction::Show { id } => {
			let record = ctx.storage().load(&id).await?;
			Ok(codec::encode_record(&record)?)
		}
		SessionAction::Delete { id } => {
			let mut session = Session::load(ctx, &id).await?;
			session.delete().await?;
			Ok(json!({"deleted": id}))
		}
		SessionAction::Clone { id, name } => {
			let session = Session::load(ctx, &id).await?;
			let clone = session.clone_as(name.as_deref()).await?;
			Ok(json!({"sessionId": clone.id(), "metadata": clone.metadata()}))
		}
		SessionAction::Export { id, file } => export(ctx, &id, &file).await,
		SessionAction::Import { file } => import(ctx, &file).await,
		SessionAction::Prune => {
			let pruned = prune_expired(ctx).await?;
			Ok(json!({"count": pruned.len(), "pruned": pruned}))
		}
		SessionAction::Replay { id, speed, validate } => replay(ctx, &id, speed, validate).await,
	}
}

async fn export(ctx: &SessionContext, id: &str, file: &Path) -> Result<Value> {
	let record = ctx.storage().load(id).await?;
	let text = codec::record_to_string(&record)?;
	tokio::fs::write(file, text).await.map_err(|source| CliError::File {
		action: "writing",
		path: file.to_path_buf(),
		source,
	})?;
	info!(target = "psp.cli", id = %id, path = %file.display(), "session exported");
	Ok(json!({"sessionId": id, "path": file}))
}

async fn import(ctx: &SessionContext, file: &Path) -> Result<Value> {
	let text = tokio::fs::read_to_string(file).await.map_err(|source| CliError::File {
		action: "reading",
		path: file.to_path_buf(),
		source,
	})?;
	let record = codec::record_from_str(&text)?;
	let original_id = record.metadata.id.clone();

	let session = Session::import(ctx, record).await?;
	Ok(json!({
		"sessionId": session.id(),
		"originalId": original_id,
		"metadata": session.metadata(),
	}))
}

/// Restores the session into a fresh in-memory browser and plays its
/// recording there. Nothing is persisted.
async fn replay(ctx: &SessionContext, id: &str, speed: f64, validate: bool) -> Result<Value> {
	let mut session = Session::load(ctx, id).await?;
	let adapter = Arc::new(MemoryAdapter::new(MemoryBrowser::default()));
	session.set_adapter(adapter.clone());

	let target = TargetHandle::new("replay");
	let restored = session.restore(Some(&target)).await?;
	let options = PlaybackOptions::default().with_speed(speed).validate_targets(validate);
	let played = session.play_recording(None, options).await?;

	let browser = adapter.browser().lock().await;
	Ok(json!({
		"sessionId": id,
		"restore": restored,
		"playback": played,
		"actions": browser.actions(),
		"finalUrl": browser.url,
	}))
}
