//! Text normalizer and heuristic filters.
//!
//! Pure functions only; everything here is deterministic and side-effect free
//! apart from loading the stop-word list.

mod heuristics;
mod normalize;

pub use heuristics::{StopWords, lookalike_words, too_many_emojis};
pub use normalize::{fold, normalize};
