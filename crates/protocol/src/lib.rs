//! Wire and value types for the Persistent Sessions Protocol.
//!
//! Everything here is plain data: the serializable browser state, session
//! metadata and filters, recorded interaction events, and the real-time
//! message protocol spoken between the session distributor and its clients.
//! Conversion between these values and persisted JSON trees lives in the
//! `psp` core crate's codec.

pub mod cookie;
pub mod realtime;
pub mod recording;
pub mod session;
pub mod state;

pub use cookie::{Cookie, SameSite};
pub use realtime::{ClientMessage, ServerMessage};
pub use recording::{Event, EventKind, RecordingState};
pub use session::{MetadataPatch, SessionFilter, SessionMessage, SessionMetadata, SessionRecord, SessionStatus, TimeRange};
pub use state::{
	BrowserSessionState, DomState, HistoryEntry, HistoryState, NetworkCapture, NetworkState, OriginStorage, ScrollPosition, StorageSnapshot,
	STATE_VERSION,
};
