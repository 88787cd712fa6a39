//! Cache module - expiring keyed state built on Moka.
//!
//! Every time-bounded map the moderator keeps (recent message snapshots,
//! review tokens, unban attempt counters, membership answers) is a
//! `TypedCache` built from one of the `CacheConfig` presets.
//!
//! ## Usage
//!
//! ```rust
//! let tokens: TypedCache<String, FlaggedMessage> =
//!     TypedCache::new("pending_bans", CacheConfig::review_tokens());
//!
//! tokens.insert(token, flagged);
//! let flagged = tokens.take(&token);
//! ```

mod config;
mod typed;

pub use config::CacheConfig;
pub use typed::TypedCache;
