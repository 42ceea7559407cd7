//! Filesystem storage provider.
//!
//! Records live at `<root>/<shard>/<id>.json` where `shard` is the first two
//! characters of the id. Writes go to a sibling `.tmp` file that is renamed
//! into place, so readers never observe a half-written record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use psp_protocol::{SessionFilter, SessionMetadata, SessionRecord};
use tokio::fs;
use tracing::{debug, warn};

use super::{StorageProvider, shard_of, validate_id};
use crate::codec;
use crate::error::{Error, Result};

const RECORD_EXT: &str = "json";

/// Stores one pretty-printed JSON file per session.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
	root: PathBuf,
}

impl FileSystemStorage {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Path of the record file for `id`.
	pub fn record_path(&self, id: &str) -> Result<PathBuf> {
		validate_id(id)?;
		Ok(self.root.join(shard_of(id)).join(format!("{id}.{RECORD_EXT}")))
	}

	async fn read_metadata(path: &Path) -> Result<SessionMetadata> {
		let content = fs::read_to_string(path).await?;
		let tree: serde_json::Value = serde_json::from_str(&content)?;
		Ok(codec::decode_metadata(&tree)?)
	}

	async fn shard_dirs(&self) -> Result<Vec<PathBuf>> {
		let mut entries = match fs::read_dir(&self.root).await {
			Ok(entries) => entries,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err.into()),
		};

		let mut dirs = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			if entry.file_type().await?.is_dir() {
				dirs.push(entry.path());
			}
		}
		Ok(dirs)
	}
}

#[async_trait]
impl StorageProvider for FileSystemStorage {
	async fn save(&self, record: &SessionRecord) -> Result<()> {
		let id = &record.metadata.id;
		let path = self.record_path(id)?;
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await?;
		}

		let content = codec::record_to_string(record)?;
		let tmp = path.with_extension(format!("{RECORD_EXT}.tmp"));
		fs::write(&tmp, content).await?;
		fs::rename(&tmp, &path).await?;

		debug!(target = "psp.storage", id = %id, path = %path.display(), "saved session");
		Ok(())
	}

	async fn load(&self, id: &str) -> Result<SessionRecord> {
		let path = self.record_path(id)?;
		let content = match fs::read_to_string(&path).await {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				return Err(Error::NotFound { id: id.to_string() });
			}
			Err(err) => return Err(err.into()),
		};

		let record = codec::record_from_str(&content)?;
		debug!(target = "psp.storage", id = %id, "loaded session");
		Ok(record)
	}

	async fn delete(&self, id: &str) -> Result<()> {
		let path = self.record_path(id)?;
		match fs::remove_file(&path).await {
			Ok(()) => {
				debug!(target = "psp.storage", id = %id, "deleted session");
				Ok(())
			}
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(err) => Err(err.into()),
		}
	}

	async fn exists(&self, id: &str) -> Result<bool> {
		let path = self.record_path(id)?;
		Ok(fs::try_exists(&path).await?)
	}

	async fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionMetadata>> {
		let mut sessions = Vec::new();

		for shard in self.shard_dirs().await? {
			let mut entries = fs::read_dir(&shard).await?;
			while let Some(entry) = entries.next_entry().await? {
				let path = entry.path();
				if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
					continue;
				}

				match Self::read_metadata(&path).await {
					Ok(metadata) => sessions.push(metadata),
					Err(err) => {
						warn!(target = "psp.storage", path = %path.display(), error = %err, "skipping unreadable session record");
					}
				}
			}
		}

		Ok(filter.apply(sessions))
	}
}

#[cfg(test)]
mod tests {
	use psp_protocol::{BrowserSessionState, SessionStatus};
	use tempfile::TempDir;

	use super::*;

	fn record(id: &str, updated_at: u64) -> SessionRecord {
		SessionRecord {
			metadata: SessionMetadata {
				id: id.to_string(),
				name: format!("session {id}"),
				description: String::new(),
				created_at: 1,
				updated_at,
				tags: Default::default(),
				created_with: "memory".into(),
				expire_at: None,
				participants: None,
				messages: None,
				status: SessionStatus::Active,
			},
			state: BrowserSessionState::empty(updated_at),
		}
	}

	#[tokio::test]
	async fn save_creates_shard_directories() {
		let temp = TempDir::new().unwrap();
		let storage = FileSystemStorage::new(temp.path().join("nested"));

		storage.save(&record("ab1234", 5)).await.unwrap();

		assert!(temp.path().join("nested/ab/ab1234.json").is_file());
		assert!(!temp.path().join("nested/ab/ab1234.json.tmp").exists());
		assert_eq!(storage.load("ab1234").await.unwrap(), record("ab1234", 5));
	}

	#[tokio::test]
	async fn save_is_an_upsert() {
		let temp = TempDir::new().unwrap();
		let storage = FileSystemStorage::new(temp.path());

		storage.save(&record("cd01", 1)).await.unwrap();
		storage.save(&record("cd01", 9)).await.unwrap();

		assert_eq!(storage.load("cd01").await.unwrap().metadata.updated_at, 9);
		assert_eq!(storage.list(&SessionFilter::default()).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn load_missing_is_not_found() {
		let temp = TempDir::new().unwrap();
		let storage = FileSystemStorage::new(temp.path());
		assert!(matches!(storage.load("zz99").await, Err(Error::NotFound { .. })));
	}

	#[tokio::test]
	async fn delete_absent_is_a_noop() {
		let temp = TempDir::new().unwrap();
		let storage = FileSystemStorage::new(temp.path());

		storage.delete("ef00").await.unwrap();
		storage.save(&record("ef00", 1)).await.unwrap();
		storage.delete("ef00").await.unwrap();
		assert!(!storage.exists("ef00").await.unwrap());
	}

	#[tokio::test]
	async fn list_skips_a_corrupt_record() {
		let temp = TempDir::new().unwrap();
		let storage = FileSystemStorage::new(temp.path());
		storage.save(&record("aa01", 1)).await.unwrap();
		storage.save(&record("bb02", 2)).await.unwrap();
		std::fs::write(temp.path().join("aa/aa99.json"), "{ not json").unwrap();

		let listed = storage.list(&SessionFilter::default()).await.unwrap();
		let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
		assert_eq!(ids, vec!["bb02", "aa01"]);
	}

	#[tokio::test]
	async fn list_on_missing_root_is_empty() {
		let temp = TempDir::new().unwrap();
		let storage = FileSystemStorage::new(temp.path().join("absent"));
		assert!(storage.list(&SessionFilter::default()).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn clear_removes_everything() {
		let temp = TempDir::new().unwrap();
		let storage = FileSystemStorage::new(temp.path());
		for id in ["aa01", "ab02", "cc03"] {
			storage.save(&record(id, 1)).await.unwrap();
		}

		assert_eq!(storage.clear().await.unwrap(), 3);
		assert!(storage.list(&SessionFilter::default()).await.unwrap().is_empty());
	}

	#[test]
	fn unsafe_ids_never_reach_the_filesystem() {
		let storage = FileSystemStorage::new("/tmp/psp");
		assert!(matches!(storage.record_path("../x"), Err(Error::InvalidState(_))));
	}
}
