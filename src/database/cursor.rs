//! Durable ingestion cursor: the id of the last fully processed update.

use std::path::PathBuf;

use crate::database::files::write_atomic;
use crate::error::{StoreError, StoreResult};

/// Single-integer cursor file (`offset`).
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Last saved update id; `None` when nothing was saved yet.
    pub async fn load(&self) -> StoreResult<Option<u32>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path)(e)),
        };

        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse::<u32>()
            .map(Some)
            .map_err(|_| StoreError::Cursor {
                path: self.path.clone(),
                value: value.to_string(),
            })
    }

    pub async fn save(&self, last_processed: u32) -> StoreResult<()> {
        write_atomic(&self.path, last_processed.to_string().as_bytes()).await
    }
}
