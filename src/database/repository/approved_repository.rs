//! Approved users: senders whose messages skip the pipeline.

use std::path::PathBuf;

use teloxide::types::UserId;
use tracing::info;

use super::user_set::UserSet;
use crate::error::StoreResult;

/// Repository of approved user ids (`approved.json`).
pub struct ApprovedRepository {
    users: UserSet,
}

impl ApprovedRepository {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let users = UserSet::open(path).await;
        info!("{} approved users loaded", users.len());
        Self { users }
    }

    pub fn is_approved(&self, user: UserId) -> bool {
        self.users.contains(user.0)
    }

    /// Approve a user. Idempotent; the file is rewritten before this returns.
    pub async fn approve(&self, user: UserId) -> StoreResult<bool> {
        let added = self.users.insert(user.0).await?;
        if added {
            info!("User {} approved ({})", user, self.users.path().display());
        }
        Ok(added)
    }
}
