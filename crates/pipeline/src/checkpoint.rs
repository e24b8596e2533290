//! Durable set of processed chunk ids.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct CheckpointFile<'a> {
    processed: &'a BTreeSet<String>,
    updated_at: DateTime<Utc>,
}

/// Both shapes found in existing checkpoint files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredCheckpoint {
    Ids(Vec<String>),
    Object { processed: Vec<String> },
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable or corrupt files all yield an empty set.
    pub async fn load(&self) -> BTreeSet<String> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Checkpoint unreadable, starting from scratch");
                return BTreeSet::new();
            }
        };

        match serde_json::from_str::<StoredCheckpoint>(&text) {
            Ok(StoredCheckpoint::Ids(ids)) | Ok(StoredCheckpoint::Object { processed: ids }) => {
                let processed: BTreeSet<String> = ids.into_iter().collect();
                info!(processed = processed.len(), "Loaded checkpoint");
                processed
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Checkpoint corrupt, starting from scratch");
                BTreeSet::new()
            }
        }
    }

    /// Replace the checkpoint with the full processed set.
    pub async fn save(&self, processed: &BTreeSet<String>) -> Result<()> {
        let file = CheckpointFile {
            processed,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&file).context("Failed to serialize checkpoint")?;
        index::write_atomic(&self.path, &json)
            .await
            .with_context(|| format!("Failed to save checkpoint {}", self.path.display()))
    }

    pub async fn reset(&self) -> Result<()> {
        remove_if_exists(&self.path).await
    }
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        store.save(&ids(&["b", "a"])).await.unwrap();

        assert_eq!(store.load().await, ids(&["a", "b"]));
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"processed\""));
        assert!(text.contains("\"updated_at\""));
    }

    #[tokio::test]
    async fn test_accepts_plain_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, r#"["x", "y"]"#).unwrap();

        assert_eq!(CheckpointStore::new(path).load().await, ids(&["x", "y"]));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, r#"{"processed": ["x""#).unwrap();

        assert!(CheckpointStore::new(path).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_and_reset() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().await.is_empty());

        store.save(&ids(&["a"])).await.unwrap();
        store.reset().await.unwrap();
        store.reset().await.unwrap();

        assert!(store.load().await.is_empty());
    }
}
