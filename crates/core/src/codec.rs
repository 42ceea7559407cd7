//! Conversion between in-memory session values and JSON trees.
//!
//! This is the only place per-origin storage is flattened to or rebuilt from
//! JSON. Storage providers persist what [`encode_record`] produces and read it
//! back through [`decode_record`].
//!
//! Decoding is lenient about absent data and strict about shape: a missing or
//! `null` `storage`, `cookies`, `localStorage` or `sessionStorage` decodes as
//! empty, while a `cookies` that is not an array is a [`DecodeError`] naming
//! the offending path.

use psp_protocol::{BrowserSessionState, STATE_VERSION, SessionMetadata, SessionRecord};
use serde_json::{Map, Value};

use crate::error::{DecodeError, Result};

const OPTIONAL_SECTIONS: [&str; 5] = ["dom", "history", "network", "recording", "extensions"];

/// Encodes a state into a JSON tree.
pub fn encode(state: &BrowserSessionState) -> Result<Value> {
	Ok(serde_json::to_value(state)?)
}

/// Decodes a JSON tree into a state.
pub fn decode(tree: &Value) -> std::result::Result<BrowserSessionState, DecodeError> {
	decode_at(tree, "")
}

/// Encodes a persisted `{metadata, state}` record.
pub fn encode_record(record: &SessionRecord) -> Result<Value> {
	let mut tree = Map::new();
	tree.insert("metadata".into(), serde_json::to_value(&record.metadata)?);
	tree.insert("state".into(), encode(&record.state)?);
	Ok(Value::Object(tree))
}

/// Decodes a persisted `{metadata, state}` record.
pub fn decode_record(tree: &Value) -> std::result::Result<SessionRecord, DecodeError> {
	let metadata = decode_metadata(tree)?;
	let state = match tree.get("state") {
		Some(state) => decode_at(state, "state")?,
		None => return Err(DecodeError::new("state", "missing field")),
	};
	Ok(SessionRecord { metadata, state })
}

/// Decodes only the metadata half of a persisted record.
pub fn decode_metadata(tree: &Value) -> std::result::Result<SessionMetadata, DecodeError> {
	if !tree.is_object() {
		return Err(DecodeError::new("$", "expected an object"));
	}
	match tree.get("metadata") {
		Some(metadata @ Value::Object(_)) => {
			serde_json::from_value(metadata.clone()).map_err(|err| DecodeError::new("metadata", err.to_string()))
		}
		Some(_) => Err(DecodeError::new("metadata", "expected an object")),
		None => Err(DecodeError::new("metadata", "missing field")),
	}
}

/// Renders a record as the pretty UTF-8 JSON written to disk.
pub fn record_to_string(record: &SessionRecord) -> Result<String> {
	Ok(serde_json::to_string_pretty(&encode_record(record)?)?)
}

/// Parses a record from JSON text.
pub fn record_from_str(text: &str) -> Result<SessionRecord> {
	let tree: Value = serde_json::from_str(text)?;
	Ok(decode_record(&tree)?)
}

fn decode_at(tree: &Value, prefix: &str) -> std::result::Result<BrowserSessionState, DecodeError> {
	let mut tree = tree.clone();
	normalize_state(&mut tree, prefix)?;
	serde_json::from_value(tree).map_err(|err| DecodeError::new(path(prefix, "$"), err.to_string()))
}

fn path(prefix: &str, segment: &str) -> String {
	match (prefix.is_empty(), segment) {
		(true, _) => segment.to_string(),
		(false, "$") => prefix.to_string(),
		(false, _) => format!("{prefix}.{segment}"),
	}
}

fn normalize_state(tree: &mut Value, prefix: &str) -> std::result::Result<(), DecodeError> {
	let Some(state) = tree.as_object_mut() else {
		return Err(DecodeError::new(path(prefix, "$"), "expected an object"));
	};

	default_if_absent(state, "version", || Value::String(STATE_VERSION.to_string()));
	default_if_absent(state, "timestamp", || Value::from(0u64));
	default_if_absent(state, "origin", || Value::String(String::new()));
	default_if_absent(state, "storage", || Value::Object(Map::new()));

	let storage_path = path(prefix, "storage");
	let Some(storage) = state.get_mut("storage").and_then(Value::as_object_mut) else {
		return Err(DecodeError::new(storage_path, "expected an object"));
	};

	default_if_absent(storage, "cookies", || Value::Array(Vec::new()));
	match storage.get("cookies") {
		Some(Value::Array(cookies)) => {
			if let Some(index) = cookies.iter().position(|cookie| !cookie.is_object()) {
				return Err(DecodeError::new(
					format!("{storage_path}.cookies[{index}]"),
					"expected an object",
				));
			}
		}
		_ => return Err(DecodeError::new(format!("{storage_path}.cookies"), "expected an array")),
	}

	for area in ["localStorage", "sessionStorage"] {
		default_if_absent(storage, area, || Value::Object(Map::new()));
		normalize_origin_map(storage.get_mut(area), &format!("{storage_path}.{area}"))?;
	}

	for section in OPTIONAL_SECTIONS {
		match state.get(section) {
			Some(Value::Null) => {
				state.remove(section);
			}
			Some(Value::Object(_)) | None => {}
			Some(_) => return Err(DecodeError::new(path(prefix, section), "expected an object")),
		}
	}

	if let Some(recording) = state.get_mut("recording").and_then(Value::as_object_mut) {
		default_if_absent(recording, "events", || Value::Array(Vec::new()));
		if !recording.get("events").is_some_and(Value::is_array) {
			return Err(DecodeError::new(path(prefix, "recording.events"), "expected an array"));
		}
	}

	Ok(())
}

fn normalize_origin_map(map: Option<&mut Value>, at: &str) -> std::result::Result<(), DecodeError> {
	let Some(origins) = map.and_then(Value::as_object_mut) else {
		return Err(DecodeError::new(at, "expected an object"));
	};

	for (origin, entries) in origins.iter_mut() {
		if entries.is_null() {
			*entries = Value::Object(Map::new());
		}
		let Some(entries) = entries.as_object() else {
			return Err(DecodeError::new(format!("{at}[{origin}]"), "expected an object"));
		};
		if let Some((key, _)) = entries.iter().find(|(_, value)| !value.is_string()) {
			return Err(DecodeError::new(format!("{at}[{origin}].{key}"), "expected a string"));
		}
	}
	Ok(())
}

fn default_if_absent(map: &mut Map<String, Value>, key: &str, default: impl FnOnce() -> Value) {
	match map.get(key) {
		None | Some(Value::Null) => {
			map.insert(key.to_string(), default());
		}
		Some(_) => {}
	}
}
