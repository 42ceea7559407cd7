//! Session-state engine for the Persistent Sessions Protocol.
//!
//! Captures a live browser's state through an [`Adapter`], persists it as a
//! `{metadata, state}` record through a [`StorageProvider`], and restores or
//! replays it later, possibly with a different automation engine.
//!
//! ```ignore
//! use std::sync::Arc;
//! use psp::{CreateOptions, FileSystemStorage, Session, SessionContext, TargetHandle};
//!
//! let ctx = SessionContext::new(Arc::new(FileSystemStorage::new("./sessions")));
//! let mut session = Session::create(&ctx, CreateOptions::new("gmail"), Some(adapter)).await?;
//! session.capture(Some(&TargetHandle::new("tab-1"))).await?;
//!
//! let reopened = Session::load(&ctx, session.id()).await?;
//! ```

pub mod adapter;
pub mod codec;
pub mod context;
pub mod error;
pub mod player;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod testing;

pub use adapter::{
	Adapter, AdapterCapabilities, PlaybackOptions, PlaybackReport, RecordingOptions, RestoreReport, StateSink, StorageArea,
	TargetHandle, apply_in_order, origin_of,
};
pub use context::{Clock, SessionContext, SessionObserver};
pub use error::{DecodeError, Error, ErrorKind, Result};
pub use player::{ActionExecutor, play_events};
pub use psp_protocol as protocol;
pub use recorder::Recorder;
pub use session::{CreateOptions, Session, prune_expired};
pub use storage::{FileSystemStorage, MemoryStorage, StorageProvider};
