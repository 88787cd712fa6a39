//! Error types for platform calls and persistence.
//!
//! Neither kind is allowed to abort moderation: call sites log them and move on.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// A failed call to the platform action API.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Transport or API error reported by teloxide.
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),

    /// The call was refused by a test double.
    #[cfg(test)]
    #[error("action rejected: {0}")]
    Rejected(String),
}

impl ActionError {
    /// True when the bot lacks the admin right needed for the call.
    ///
    /// These are surfaced to moderators as a privilege notice instead of only being logged.
    pub fn is_privilege(&self) -> bool {
        let text = self.to_string().to_lowercase();
        text.contains("not enough rights")
            || text.contains("need administrator rights")
            || text.contains("not an administrator")
            || text.contains("can't remove chat owner")
            || text.contains("have no rights")
    }

    /// True when a delete failed because the message no longer exists.
    pub fn is_missing_message(&self) -> bool {
        self.to_string()
            .to_lowercase()
            .contains("message to delete not found")
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

/// A failed read or write of one of the bot's data files.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed cursor in {path}: {value:?}")]
    Cursor { path: PathBuf, value: String },
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
