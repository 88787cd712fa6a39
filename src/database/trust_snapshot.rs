//! Periodic snapshot of trust counters (`trust.json`).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::database::files::{read_json, write_json};
use crate::error::StoreResult;

/// userId -> consecutive ham count.
#[derive(Debug, Clone)]
pub struct TrustSnapshotFile {
    path: PathBuf,
}

impl TrustSnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> StoreResult<HashMap<u64, u32>> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    pub async fn save(&self, counts: &HashMap<u64, u32>) -> StoreResult<()> {
        write_json(&self.path, counts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn restores_what_was_saved() {
        let dir = tempfile::tempdir().unwrap();
        let file = TrustSnapshotFile::new(dir.path().join("trust.json"));

        assert!(file.load().await.unwrap().is_empty());

        let counts = HashMap::from([(11u64, 1u32), (22, 2)]);
        file.save(&counts).await.unwrap();
        assert_eq!(file.load().await.unwrap(), counts);
    }
}
