//! Fingerprints of messages already confirmed as spam.

use std::path::PathBuf;

use dashmap::DashSet;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::database::files::{read_json, write_json};
use crate::error::StoreResult;

/// Hex SHA-256 of a normalized message text.
pub fn fingerprint(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Repository of known-bad message fingerprints (`known_bad.json`).
///
/// Callers pass normalized text; two spam copies that only differ in case,
/// spacing or lookalike letters share a fingerprint.
pub struct KnownBadRepository {
    path: PathBuf,
    fingerprints: DashSet<String>,
    write_lock: Mutex<()>,
}

impl KnownBadRepository {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let fingerprints = match read_json::<Vec<String>>(&path).await {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                warn!("Starting without known-bad fingerprints: {}", e);
                Vec::new()
            }
        };
        info!("{} known-bad fingerprints loaded", fingerprints.len());

        Self {
            path,
            fingerprints: fingerprints.into_iter().collect(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_known_bad(&self, normalized: &str) -> bool {
        !normalized.is_empty() && self.fingerprints.contains(&fingerprint(normalized))
    }

    /// Remember a message as spam. Returns `Ok(false)` if it was already known.
    pub async fn mark_bad(&self, normalized: &str) -> StoreResult<bool> {
        if normalized.is_empty() || !self.fingerprints.insert(fingerprint(normalized)) {
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;
        let mut snapshot: Vec<String> = self.fingerprints.iter().map(|f| f.clone()).collect();
        snapshot.sort_unstable();
        write_json(&self.path, &snapshot).await?;
        Ok(true)
    }
}
