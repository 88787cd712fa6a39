//! Known spammer ids.

use std::path::PathBuf;

use teloxide::types::UserId;
use tracing::info;

use super::user_set::UserSet;
use crate::error::StoreResult;

/// Repository of blacklisted user ids (`blacklist.json`).
pub struct BlacklistRepository {
    users: UserSet,
}

impl BlacklistRepository {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let users = UserSet::open(path).await;
        info!("{} blacklisted users loaded", users.len());
        Self { users }
    }

    pub fn is_blacklisted(&self, user: UserId) -> bool {
        self.users.contains(user.0)
    }

    /// Add a user confirmed as a spammer by a moderator.
    pub async fn add(&self, user: UserId) -> StoreResult<bool> {
        self.users.insert(user.0).await
    }
}
