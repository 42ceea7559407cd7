//! Persistence of `{metadata, state}` records by session id.

mod fs;
mod memory;

pub use fs::FileSystemStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use psp_protocol::{SessionFilter, SessionMetadata, SessionRecord};
use tracing::debug;

use crate::error::{Error, Result};

/// Backend that stores session records.
///
/// Implementations must be safe to share between sessions and tasks.
#[async_trait]
pub trait StorageProvider: Send + Sync {
	/// Upserts `record` under its metadata id.
	async fn save(&self, record: &SessionRecord) -> Result<()>;

	/// Fails with [`Error::NotFound`] when no record exists.
	async fn load(&self, id: &str) -> Result<SessionRecord>;

	/// Removes the record. Deleting an absent record is a no-op.
	async fn delete(&self, id: &str) -> Result<()>;

	async fn exists(&self, id: &str) -> Result<bool>;

	/// Lists metadata matching `filter`, newest `updated_at` first, with
	/// offset then limit applied. Unreadable records are skipped.
	async fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionMetadata>>;

	/// Deletes every record and returns how many were removed.
	async fn clear(&self) -> Result<usize> {
		let all = self.list(&SessionFilter::default()).await?;
		for metadata in &all {
			self.delete(&metadata.id).await?;
		}
		debug!(target = "psp.storage", removed = all.len(), "storage cleared");
		Ok(all.len())
	}
}

/// Rejects ids that cannot be stored safely: shorter than a shard prefix or
/// able to escape the storage root.
pub fn validate_id(id: &str) -> Result<()> {
	if id.chars().count() < 2 {
		return Err(Error::InvalidState(format!("session id `{id}` is shorter than two characters")));
	}
	if id.starts_with('.') || id.contains(['/', '\\', '\0']) {
		return Err(Error::InvalidState(format!("session id `{id}` contains path characters")));
	}
	Ok(())
}

/// Shard directory name of `id`: its first two characters.
pub fn shard_of(id: &str) -> &str {
	match id.char_indices().nth(2) {
		Some((end, _)) => &id[..end],
		None => id,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shards_by_first_two_characters() {
		assert_eq!(shard_of("ab12-cd"), "ab");
		assert_eq!(shard_of("éa9"), "éa");
		assert_eq!(shard_of("ab"), "ab");
	}

	#[test]
	fn rejects_unsafe_ids() {
		assert!(validate_id("a").is_err());
		assert!(validate_id("../etc").is_err());
		assert!(validate_id("ab/cd").is_err());
		assert!(validate_id("ab\\cd").is_err());
		assert!(validate_id("5f3c8a2e-0b7d-4c1e-9a61-2d8f4b6e7c90").is_ok());
	}
}
