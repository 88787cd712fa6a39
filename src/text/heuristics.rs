//! Cheap content heuristics run before the classifier.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::{info, warn};

use super::normalize::{cyrillic_twin, is_cyrillic, normalize};

/// More emoji than this is always excessive.
const EMOJI_LIMIT: usize = 5;

/// Short messages are excessive when at least this many emoji...
const EMOJI_MIN_FOR_DENSITY: usize = 3;

/// ...make up at least half of the visible characters.
const EMOJI_DENSITY: f64 = 0.5;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static regex"));

/// True when `text` is mostly emoji or carries more than a handful of them.
pub fn too_many_emojis(text: &str) -> bool {
    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    let emojis = text.chars().filter(|c| is_emoji(*c)).count();

    if emojis > EMOJI_LIMIT {
        return true;
    }

    emojis >= EMOJI_MIN_FOR_DENSITY && emojis as f64 >= visible as f64 * EMOJI_DENSITY
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F1E6..=0x1F1FF // regional indicators
            | 0x1F300..=0x1F5FF
            | 0x1F600..=0x1F64F
            | 0x1F680..=0x1F6FF
            | 0x1F900..=0x1F9FF
            | 0x1FA70..=0x1FAFF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
    )
}

/// Distinct words that mix Cyrillic letters with Latin lookalikes, in order of appearance.
///
/// Expects case-folded text (see [`super::fold`]); normalized text has already
/// had the lookalikes mapped away.
pub fn lookalike_words(folded: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();

    for word in WORD.find_iter(folded).map(|m| m.as_str()) {
        let has_cyrillic = word.chars().any(is_cyrillic);
        let has_lookalike = word
            .chars()
            .any(|c| c.is_ascii_alphabetic() && cyrillic_twin(c).is_some());

        if has_cyrillic && has_lookalike && !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }

    words
}

/// Stop-word list matched against normalized text.
///
/// Entries match at the start of a word, so `заработ` catches `заработок`
/// and `заработать`. Multi-word entries match as phrases.
#[derive(Debug, Default)]
pub struct StopWords {
    pattern: Option<Regex>,
    len: usize,
}

impl StopWords {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut escaped: Vec<String> = entries
            .into_iter()
            .map(|e| normalize(e.as_ref()))
            .filter(|e| !e.is_empty())
            .map(|e| regex::escape(&e))
            .collect();
        escaped.sort();
        escaped.dedup();

        let len = escaped.len();
        if escaped.is_empty() {
            return Self::default();
        }

        let source = format!(r"(?:^|\W)(?:{})", escaped.join("|"));
        let pattern = match RegexBuilder::new(&source).size_limit(64 << 20).build() {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("Stop-word list did not compile, stop-word filter disabled: {}", e);
                None
            }
        };

        Self { pattern, len }
    }

    /// Load one entry per line; `#` starts a comment. A missing file means an empty list.
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let list = Self::new(
                    raw.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#')),
                );
                info!("Loaded {} stop words from {}", list.len, path.display());
                list
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Failed to read stop words from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// True when the normalized text contains any entry.
    pub fn matches(&self, normalized: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|p| p.is_match(normalized))
    }
}
