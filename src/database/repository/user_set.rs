//! File-backed set of user ids.

use std::path::{Path, PathBuf};

use dashmap::DashSet;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::database::files::{read_json, write_json};
use crate::error::StoreResult;

/// In-memory id set mirrored to a JSON array on disk.
///
/// Lookups never touch the disk. Inserts update memory first, then rewrite
/// the whole file atomically; if the write fails the id stays in memory and
/// the next successful write persists it.
pub(crate) struct UserSet {
    path: PathBuf,
    ids: DashSet<u64>,
    write_lock: Mutex<()>,
}

impl UserSet {
    /// Load the set; an unreadable file is logged and treated as empty.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match read_json::<Vec<u64>>(&path).await {
            Ok(ids) => ids.unwrap_or_default(),
            Err(e) => {
                warn!("Starting with an empty set: {}", e);
                Vec::new()
            }
        };
        debug!("Loaded {} ids from {}", ids.len(), path.display());

        Self {
            path,
            ids: ids.into_iter().collect(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Insert and persist. Returns `Ok(false)` without writing when already present.
    pub async fn insert(&self, id: u64) -> StoreResult<bool> {
        if !self.ids.insert(id) {
            return Ok(false);
        }
        self.persist().await?;
        Ok(true)
    }

    async fn persist(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot: Vec<u64> = self.ids.iter().map(|id| *id).collect();
        snapshot.sort_unstable();
        write_json(&self.path, &snapshot).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
