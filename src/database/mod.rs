//! Database module exports.
//!
//! All persistence is plain files under `DATA_DIR`, rewritten atomically.

mod cursor;
pub mod files;
mod repository;
mod trust_snapshot;

pub use cursor::CursorFile;
pub use repository::{ApprovedRepository, BlacklistRepository, KnownBadRepository};
pub use trust_snapshot::TrustSnapshotFile;
