//! Configuration module for the gatekeeper bot.
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::{Path, PathBuf};

use teloxide::types::ChatId;

/// Knobs of the decision pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationSettings {
    /// Ban blacklisted senders outright instead of sending them to review.
    pub auto_ban_blacklisted: bool,

    /// Ham scores above this are reported as low confidence.
    pub low_confidence_threshold: f64,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            auto_ban_blacklisted: true,
            low_confidence_threshold: -0.7,
        }
    }
}

/// Club directory endpoint.
#[derive(Debug, Clone)]
pub struct ClubApi {
    pub url: String,
    pub token: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,

    /// Chat that receives flagged content, notices and digests.
    pub review_chat_id: ChatId,

    /// Directory holding the cursor, stores and datasets.
    pub data_dir: PathBuf,

    /// Language of bot-authored text (`en` or `ru`).
    pub locale: String,

    pub moderation: ModerationSettings,

    /// Local hour (0-23) at which the daily digest goes out.
    pub digest_hour: u32,

    /// Optional club membership lookups.
    pub club: Option<ClubApi>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if required environment variables are not set.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let review_chat_id = env::var("REVIEW_CHAT_ID")
            .expect("REVIEW_CHAT_ID must be set")
            .trim()
            .parse::<i64>()
            .expect("REVIEW_CHAT_ID must be a chat id");

        let defaults = ModerationSettings::default();
        let moderation = ModerationSettings {
            auto_ban_blacklisted: env::var("AUTO_BAN_BLACKLISTED")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.auto_ban_blacklisted),
            low_confidence_threshold: env::var("LOW_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.low_confidence_threshold),
        };

        let digest_hour = env::var("DIGEST_HOUR")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|h| *h < 24)
            .unwrap_or(9);

        let club = match (env::var("CLUB_API_URL"), env::var("CLUB_API_TOKEN")) {
            (Ok(url), Ok(token)) if !url.trim().is_empty() => Some(ClubApi {
                url: url.trim().trim_end_matches('/').to_string(),
                token,
            }),
            _ => None,
        };

        let locale = match env::var("LOCALE").unwrap_or_default().to_lowercase().as_str() {
            "ru" => "ru".to_string(),
            _ => "en".to_string(),
        };

        Self {
            bot_token: env::var("BOT_TOKEN").expect("BOT_TOKEN must be set"),
            review_chat_id: ChatId(review_chat_id),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            locale,
            moderation,
            digest_hour,
            club,
        }
    }

    /// Locations of the bot's data files.
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir)
    }
}

/// Data files kept under `DATA_DIR`.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub cursor: PathBuf,
    pub approved: PathBuf,
    pub blacklist: PathBuf,
    pub known_bad: PathBuf,
    pub trust: PathBuf,
    pub spam_examples: PathBuf,
    pub ham_examples: PathBuf,
    pub stop_words: PathBuf,
}

impl DataPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            cursor: dir.join("offset"),
            approved: dir.join("approved.json"),
            blacklist: dir.join("blacklist.json"),
            known_bad: dir.join("known_bad.json"),
            trust: dir.join("trust.json"),
            spam_examples: dir.join("spam.txt"),
            ham_examples: dir.join("ham.txt"),
            stop_words: dir.join("stop_words.txt"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
