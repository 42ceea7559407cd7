//! In-process storage provider.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use psp_protocol::{SessionFilter, SessionMetadata, SessionRecord};
use serde_json::Value;
use tracing::warn;

use super::{StorageProvider, validate_id};
use crate::codec;
use crate::error::{Error, Result};

/// Keeps encoded records in a map. Records go through the codec on every
/// save and load, so callers never share mutable state with the store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	records: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}
}

#[async_trait]
impl StorageProvider for MemoryStorage {
	async fn save(&self, record: &SessionRecord) -> Result<()> {
		validate_id(&record.metadata.id)?;
		let tree = codec::encode_record(record)?;
		self.records.write().insert(record.metadata.id.clone(), tree);
		Ok(())
	}

	async fn load(&self, id: &str) -> Result<SessionRecord> {
		let records = self.records.read();
		let tree = records.get(id).ok_or_else(|| Error::NotFound { id: id.to_string() })?;
		Ok(codec::decode_record(tree)?)
	}

	async fn delete(&self, id: &str) -> Result<()> {
		self.records.write().remove(id);
		Ok(())
	}

	async fn exists(&self, id: &str) -> Result<bool> {
		Ok(self.records.read().contains_key(id))
	}

	async fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionMetadata>> {
		let records = self.records.read();
		let sessions = records.iter().filter_map(|(id, tree)| match codec::decode_metadata(tree) {
			Ok(metadata) => Some(metadata),
			Err(err) => {
				warn!(target = "psp.storage", id = %id, error = %err, "skipping unreadable session record");
				None
			}
		});
		Ok(filter.apply(sessions))
	}

	async fn clear(&self) -> Result<usize> {
		let mut records = self.records.write();
		let removed = records.len();
		records.clear();
		Ok(removed)
	}
}
