//! External trust oracles that are not plain files: the spam classifier and
//! the club membership directory.

mod classifier;
mod club;

pub use classifier::{SpamClassifier, Verdict};
pub use club::ClubDirectory;

#[cfg(test)]
pub(crate) use classifier::{HAM_EXAMPLES, SPAM_EXAMPLES};
