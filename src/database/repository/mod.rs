//! Repository module - file-backed trust oracles.

mod approved_repository;
mod blacklist_repository;
mod known_bad_repository;
mod user_set;

pub use approved_repository::ApprovedRepository;
pub use blacklist_repository::BlacklistRepository;
pub use known_bad_repository::KnownBadRepository;
