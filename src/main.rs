//! Gatekeeper - anti-spam moderation agent for Telegram groups.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - File-backed state under `DATA_DIR`
//! - `cache` - Expiring state with Moka
//! - `text` - Normalization and text heuristics
//! - `oracles` - Spam classifier and club directory
//! - `moderation` - Captcha, decision pipeline, review desk, escalation
//! - `bot` - Telegram actions, update ingestion, runtime
//! - `events` - Platform-neutral event types
//! - `i18n` - Message catalogs
//! - `utils` - Formatting helpers

mod bot;
mod cache;
mod config;
mod database;
mod error;
mod events;
mod i18n;
mod moderation;
mod oracles;
mod text;
mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bot::{Ingestion, TelegramActions, TelegramUpdates};
use config::Config;
use database::{
    ApprovedRepository, BlacklistRepository, CursorFile, KnownBadRepository, TrustSnapshotFile,
};
use moderation::{Moderator, ModeratorOptions, Oracles};
use oracles::{ClubDirectory, SpamClassifier};
use text::StopWords;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// HTTP timeout; must outlast the long-poll timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(45);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gatekeeper=info,teloxide=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Gatekeeper...");

    let config = Config::from_env();
    i18n::init();
    info!(
        "Configuration loaded: review chat {}, locale {}, digest at {}:00",
        config.review_chat_id, config.locale, config.digest_hour
    );

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let paths = config.paths();

    // Throttle keeps us inside Telegram's per-chat and global rate limits.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(HTTP_TIMEOUT)
        .build()?;
    let bot = Bot::with_client(&config.bot_token, client).throttle(Limits::default());

    let me = bot.get_me().await?;
    info!("Bot username: @{}", me.username());

    let oracles = Oracles {
        approved: ApprovedRepository::open(&paths.approved).await,
        blacklist: BlacklistRepository::open(&paths.blacklist).await,
        known_bad: KnownBadRepository::open(&paths.known_bad).await,
        classifier: SpamClassifier::load(&paths.spam_examples, &paths.ham_examples).await,
        club: ClubDirectory::new(config.club.as_ref()),
        stop_words: StopWords::load(&paths.stop_words).await,
    };

    let trust_file = TrustSnapshotFile::new(&paths.trust);
    let trust = trust_file.load().await.unwrap_or_else(|e| {
        warn!("Starting with empty trust counters: {}", e);
        Default::default()
    });
    info!("Restored {} trust counters", trust.len());

    let moderator = Arc::new(
        Moderator::new(
            Arc::new(TelegramActions::new(bot.clone())),
            oracles,
            ModeratorOptions {
                review_chat: config.review_chat_id,
                locale: config.locale.clone(),
                settings: config.moderation.clone(),
            },
        )
        .with_trust_counts(trust),
    );

    let ingestion = Ingestion::new(
        TelegramUpdates::new(bot, me.id),
        CursorFile::new(&paths.cursor),
        Arc::clone(&moderator),
    );

    bot::run(moderator, ingestion, trust_file, config.digest_hour).await;
    Ok(())
}
