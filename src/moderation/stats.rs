//! Per-chat ban counters and the daily digest.

use chrono::{DateTime, TimeZone, Timelike};
use dashmap::DashMap;
use teloxide::types::ChatId;

use crate::events::ChatRef;
use crate::i18n::format_text;
use crate::utils::html_escape;

/// What a ban was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanKind {
    Captcha,
    Blacklist,
    KnownBad,
}

/// Counters of one chat since the last digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatCounters {
    pub title: String,
    pub captcha: u64,
    pub blacklist: u64,
    pub known_bad: u64,
}

impl ChatCounters {
    pub fn total(&self) -> u64 {
        self.captcha + self.blacklist + self.known_bad
    }
}

#[derive(Debug, Default)]
pub struct ChatStats {
    chats: DashMap<ChatId, ChatCounters>,
}

impl ChatStats {
    pub fn record(&self, chat: &ChatRef, kind: BanKind) {
        let mut counters = self.chats.entry(chat.id).or_default();
        if counters.title.is_empty() {
            counters.title = chat.title.clone();
        }
        match kind {
            BanKind::Captcha => counters.captcha += 1,
            BanKind::Blacklist => counters.blacklist += 1,
            BanKind::KnownBad => counters.known_bad += 1,
        }
    }

    #[cfg(test)]
    pub fn get(&self, chat: ChatId) -> Option<ChatCounters> {
        self.chats.get(&chat).map(|c| c.clone())
    }

    /// Take every chat's counters, leaving the map empty.
    ///
    /// Each chat is removed atomically; a ban recorded while draining lands in
    /// the next cycle instead of being lost.
    pub fn drain(&self) -> Vec<(ChatId, ChatCounters)> {
        let keys: Vec<ChatId> = self.chats.iter().map(|e| *e.key()).collect();
        let mut drained: Vec<(ChatId, ChatCounters)> =
            keys.into_iter().filter_map(|k| self.chats.remove(&k)).collect();
        drained.sort_by_key(|(id, _)| id.0);
        drained
    }
}

/// True during the configured local hour.
pub fn is_digest_hour<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> bool {
    now.hour() == hour
}

/// Digest text, or `None` when nothing happened.
pub fn render_digest(lang: &str, chats: &[(ChatId, ChatCounters)]) -> Option<String> {
    let lines: Vec<String> = chats
        .iter()
        .filter(|(_, c)| c.total() > 0)
        .map(|(id, c)| {
            let title = if c.title.is_empty() {
                id.to_string()
            } else {
                html_escape(&c.title)
            };
            let (total, captcha) = (c.total().to_string(), c.captcha.to_string());
            let (blacklist, known_bad) = (c.blacklist.to_string(), c.known_bad.to_string());
            format_text(
                lang,
                "digest.chat",
                &[
                    ("chat", title.as_str()),
                    ("total", total.as_str()),
                    ("captcha", captcha.as_str()),
                    ("blacklist", blacklist.as_str()),
                    ("known_bad", known_bad.as_str()),
                ],
            )
        })
        .collect();

    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "{}\n\n{}",
        format_text(lang, "digest.header", &[]),
        lines.join("\n")
    ))
}
