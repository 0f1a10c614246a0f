//! Durable storage for the scheduled-post set
//!
//! The whole collection is written through to a single JSON document after
//! every mutation. On restart the document is the source of truth; armed
//! timers are rebuilt from it by the scheduler sweep.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StorageError};
use crate::types::ScheduledPost;

const STORE_FILE: &str = "scheduled_posts.json";

/// File-backed store for [`ScheduledPost`] records
pub struct PostStore {
    path: PathBuf,
}

impl PostStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(StorageError::IoError)?;
        Ok(Self {
            path: dir.join(STORE_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records; a missing file is an empty collection, not an error
    pub async fn load(&self) -> Result<HashMap<String, ScheduledPost>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no store file yet, starting empty");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(StorageError::IoError(e).into()),
        };

        let records: Vec<ScheduledPost> =
            serde_json::from_slice(&bytes).map_err(StorageError::SerializeError)?;

        Ok(records.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    /// Write the full record set, atomically replacing the previous document
    pub async fn save(&self, posts: &HashMap<String, ScheduledPost>) -> Result<()> {
        let mut records: Vec<&ScheduledPost> = posts.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let bytes = serde_json::to_vec_pretty(&records).map_err(StorageError::SerializeError)?;

        // Write to a sibling temp file first so a crash mid-write never
        // truncates the live document
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(StorageError::IoError)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(StorageError::IoError)?;

        debug!(count = records.len(), path = %self.path.display(), "persisted scheduled posts");
        Ok(())
    }
}
