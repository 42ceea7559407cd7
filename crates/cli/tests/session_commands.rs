//! `psp session ...` against a real filesystem store.

use std::sync::Arc;

use psp::protocol::{BrowserSessionState, Event, HistoryState, RecordingState};
use psp::{Clock, FileSystemStorage, Session, SessionContext};
use psp_cli::cli::SessionAction;
use psp_cli::commands::{self, session};
use serde_json::Value;
use tempfile::TempDir;

fn store() -> (TempDir, SessionContext) {
	let dir = TempDir::new().unwrap();
	let ctx = commands::session_context(Some(dir.path().to_path_buf())).unwrap();
	(dir, ctx)
}

async fn create(ctx: &SessionContext, name: &str, tags: &[&str]) -> String {
	let data = session::run(
		ctx,
		SessionAction::Create {
			name: name.into(),
			description: None,
			tags: tags.iter().map(|tag| tag.to_string()).collect(),
			expire_in: None,
		},
	)
	.await
	.unwrap();
	data["sessionId"].as_str().unwrap().to_string()
}

fn list(name: Option<&str>, tags: &[&str]) -> SessionAction {
	SessionAction::List {
		name: name.map(str::to_string),
		tags: tags.iter().map(|tag| tag.to_string()).collect(),
		limit: None,
		offset: None,
	}
}

#[tokio::test]
async fn create_list_clone_delete() {
	let (_dir, ctx) = store();
	let gmail = create(&ctx, "gmail", &["work", "mail"]).await;
	create(&ctx, "github", &["work"]).await;

	let listed = session::run(&ctx, list(None, &["work", "mail"])).await.unwrap();
	assert_eq!(listed["count"], 1);
	assert_eq!(listed["sessions"][0]["id"], gmail.as_str());

	let cloned = session::run(
		&ctx,
		SessionAction::Clone {
			id: gmail.clone(),
			name: None,
		},
	)
	.await
	.unwrap();
	assert_eq!(cloned["metadata"]["name"], "gmail (Clone)");

	let by_name = session::run(&ctx, list(Some("GMAIL"), &[])).await.unwrap();
	assert_eq!(by_name["count"], 2);

	session::run(&ctx, SessionAction::Delete { id: gmail.clone() }).await.unwrap();
	let err = session::run(&ctx, SessionAction::Show { id: gmail }).await.unwrap_err();
	assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn empty_name_is_rejected() {
	let (_dir, ctx) = store();
	let err = session::run(
		&ctx,
		SessionAction::Create {
			name: "  ".into(),
			description: None,
			tags: Vec::new(),
			expire_in: None,
		},
	)
	.await
	.unwrap_err();
	assert_eq!(err.code(), "INVALID_INPUT");
}

#[tokio::test]
async fn export_then_import_elsewhere_keeps_the_id() {
	let (dir, source) = store();
	let id = create(&source, "exported", &["x"]).await;
	let file = dir.path().join("exported.json");

	session::run(
		&source,
		SessionAction::Export {
			id: id.clone(),
			file: file.clone(),
		},
	)
	.await
	.unwrap();

	let (_other_dir, target) = store();
	let imported = session::run(&target, SessionAction::Import { file: file.clone() }).await.unwrap();
	assert_eq!(imported["sessionId"], id.as_str());
	assert_eq!(imported["metadata"]["tags"], serde_json::json!(["x"]));

	// Same store: the id is taken, so the copy gets a fresh one.
	let again = session::run(&source, SessionAction::Import { file }).await.unwrap();
	assert_ne!(again["sessionId"], id.as_str());
	assert_eq!(again["originalId"], id.as_str());
}

#[tokio::test]
async fn import_reports_decode_errors() {
	let (dir, ctx) = store();
	let file = dir.path().join("broken.json");
	std::fs::write(&file, r#"{"metadata": {"id": "abc", "name": "x"}, "state": {"storage": {"cookies": 3}}}"#).unwrap();

	let err = session::run(&ctx, SessionAction::Import { file }).await.unwrap_err();
	assert_eq!(err.code(), "DECODE_ERROR");

	let missing = session::run(
		&ctx,
		SessionAction::Import {
			file: dir.path().join("nope.json"),
		},
	)
	.await
	.unwrap_err();
	assert_eq!(missing.code(), "IO_ERROR");
}

#[tokio::test]
async fn prune_removes_only_expired_sessions() {
	let dir = TempDir::new().unwrap();
	let clock = Clock::manual(1_000);
	let ctx = SessionContext::new(Arc::new(FileSystemStorage::new(dir.path()))).with_clock(clock.clone());

	let short = Session::create(&ctx, psp::CreateOptions::new("short").expire_in(1), None)
		.await
		.unwrap();
	let kept = create(&ctx, "kept", &[]).await;

	clock.advance(5_000);
	let pruned = session::run(&ctx, SessionAction::Prune).await.unwrap();
	assert_eq!(pruned["pruned"], serde_json::json!([short.id()]));

	let listed = session::run(&ctx, list(None, &[])).await.unwrap();
	assert_eq!(listed["count"], 1);
	assert_eq!(listed["sessions"][0]["id"], kept.as_str());
}

#[tokio::test]
async fn replay_runs_the_recording_in_memory() {
	let (_dir, ctx) = store();
	let mut recorded = Session::create(&ctx, psp::CreateOptions::new("recorded"), None).await.unwrap();

	let mut state = BrowserSessionState::empty(1);
	state.origin = "https://app.example".into();
	state.history = Some(HistoryState::single("https://app.example/login", None, 1));
	state.recording = Some(RecordingState::from_events(
		1,
		vec![
			Event::new("click", 0).target("#user"),
			Event::new("input", 10).target("#user").data(serde_json::json!({"value": "ada"})),
			Event::new("hover", 20).target("#menu"),
			Event::new("click", 30).target("#submit"),
		],
	));
	recorded.update_state(state).await.unwrap();

	let data: Value = session::run(
		&ctx,
		SessionAction::Replay {
			id: recorded.id().to_string(),
			speed: 0.0,
			validate: false,
		},
	)
	.await
	.unwrap();

	assert_eq!(data["restore"]["navigatedTo"], "https://app.example/login");
	assert_eq!(data["playback"]["executed"], 3);
	assert_eq!(data["playback"]["skippedUnknown"], 1);
	assert_eq!(
		data["actions"],
		serde_json::json!(["navigate:https://app.example/login", "click:#user", "input:#user", "click:#submit"])
	);
}

#[tokio::test]
async fn replay_without_recording_fails() {
	let (_dir, ctx) = store();
	let id = create(&ctx, "blank", &[]).await;

	let err = session::run(
		&ctx,
		SessionAction::Replay {
			id,
			speed: 0.0,
			validate: true,
		},
	)
	.await
	.unwrap_err();
	assert_eq!(err.code(), "NO_RECORDING");
}
