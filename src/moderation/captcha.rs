//! Newcomer challenges.
//!
//! A challenge is created on join, removed by exactly one of: a press by the
//! challenged user, or the timeout sweep. Removal always cancels the
//! challenge's cleanup timer.

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use teloxide::types::{ChatId, MessageId, UserId};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::stats::BanKind;
use super::{Action, Moderator};
use crate::bot::{Button, ChatActions};
use crate::events::{ButtonPress, ChatRef, MemberJoined, Person};
use crate::i18n::{format_text, get_text};
use crate::utils::{html_escape, mention};

/// Emoji shown on the buttons and the catalog key of their description.
pub const CHALLENGE_OPTIONS: [(&str, &str); 8] = [
    ("🐱", "cat"),
    ("🐶", "dog"),
    ("🍎", "apple"),
    ("🚗", "car"),
    ("🌵", "cactus"),
    ("⚽", "ball"),
    ("🎸", "guitar"),
    ("🌙", "moon"),
];

const BUTTONS_PER_ROW: usize = 4;

/// Unanswered challenges older than this are failed by the sweep.
pub const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Challenge and join messages are removed after this long.
pub const CLEANUP_DELAY: Duration = Duration::from_secs(72);

/// Length of the temporary ban for a failed challenge.
pub const RESTRICTION: Duration = Duration::from_secs(20 * 60);

const CALLBACK_PREFIX: &str = "captcha:";

#[derive(Debug)]
pub struct PendingChallenge {
    pub chat: ChatRef,
    pub user: Person,
    pub issued_at: Instant,
    pub answer: usize,
    pub message: MessageId,
    pub join_message: Option<MessageId>,
    cleanup: AbortHandle,
}

/// Result of a press on a challenge button.
#[derive(Debug)]
pub enum Resolution {
    /// Pressed by someone other than the challenged user; nothing changed.
    NotYours,
    /// No such challenge (already resolved or timed out).
    Missing,
    Passed(PendingChallenge),
    Failed(PendingChallenge),
}

/// Pending challenges keyed by (chat, user).
#[derive(Debug, Default)]
pub struct Challenges {
    pending: DashMap<(ChatId, UserId), PendingChallenge>,
}

impl Challenges {
    pub fn is_pending(&self, chat: ChatId, user: UserId) -> bool {
        self.pending.contains_key(&(chat, user))
    }

    /// Register a challenge; hands it back if one already exists.
    pub fn begin(&self, challenge: PendingChallenge) -> Result<(), PendingChallenge> {
        match self.pending.entry((challenge.chat.id, challenge.user.id)) {
            Entry::Occupied(_) => Err(challenge),
            Entry::Vacant(slot) => {
                slot.insert(challenge);
                Ok(())
            }
        }
    }

    /// Remember a join message that arrived after the challenge was issued.
    pub fn attach_join_message(&self, chat: ChatId, user: UserId, message: MessageId) {
        if let Some(mut pending) = self.pending.get_mut(&(chat, user)) {
            pending.join_message.get_or_insert(message);
        }
    }

    pub fn resolve(
        &self,
        chat: ChatId,
        target: UserId,
        presser: UserId,
        option: usize,
    ) -> Resolution {
        if presser != target {
            return Resolution::NotYours;
        }
        let Some((_, pending)) = self.pending.remove(&(chat, target)) else {
            return Resolution::Missing;
        };
        pending.cleanup.abort();

        if option == pending.answer {
            Resolution::Passed(pending)
        } else {
            Resolution::Failed(pending)
        }
    }

    /// Remove every challenge older than [`CHALLENGE_TIMEOUT`] at `now`.
    pub fn expire(&self, now: Instant) -> Vec<PendingChallenge> {
        let stale: Vec<(ChatId, UserId)> = self
            .pending
            .iter()
            .filter(|e| now.duration_since(e.issued_at) > CHALLENGE_TIMEOUT)
            .map(|e| *e.key())
            .collect();

        stale
            .into_iter()
            .filter_map(|key| {
                self.pending
                    .remove_if(&key, |_, c| now.duration_since(c.issued_at) > CHALLENGE_TIMEOUT)
            })
            .map(|(_, pending)| {
                pending.cleanup.abort();
                pending
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn answer(&self, chat: ChatId, user: UserId) -> Option<usize> {
        self.pending.get(&(chat, user)).map(|c| c.answer)
    }
}

pub fn challenge_keyboard(user: UserId) -> Vec<Vec<Button>> {
    CHALLENGE_OPTIONS
        .chunks(BUTTONS_PER_ROW)
        .enumerate()
        .map(|(row, options)| {
            options
                .iter()
                .enumerate()
                .map(|(col, (emoji, _))| {
                    let idx = row * BUTTONS_PER_ROW + col;
                    Button::new(*emoji, format!("{}{}:{}", CALLBACK_PREFIX, user.0, idx))
                })
                .collect()
        })
        .collect()
}

/// `captcha:<user>:<option>` -> (user, option).
pub fn parse_callback(data: &str) -> Option<(UserId, usize)> {
    let (user, option) = data.strip_prefix(CALLBACK_PREFIX)?.split_once(':')?;
    let user = user.parse::<u64>().ok()?;
    let option = option.parse::<usize>().ok()?;
    (option < CHALLENGE_OPTIONS.len()).then_some((UserId(user), option))
}

pub fn is_captcha_data(data: &str) -> bool {
    data.starts_with(CALLBACK_PREFIX)
}

impl<A: ChatActions> Moderator<A> {
    pub(crate) async fn on_join(&self, join: &MemberJoined) {
        for member in &join.members {
            if self.challenges.is_pending(join.chat.id, member.id) {
                if let Some(message) = join.message {
                    self.challenges
                        .attach_join_message(join.chat.id, member.id, message);
                }
                debug!("{} in {} already has a challenge", member.id, join.chat.id);
                continue;
            }

            if self.oracles.approved.is_approved(member.id)
                || self.oracles.club.is_member(member.id).await
            {
                debug!("{} joined {} and is trusted", member.id, join.chat.id);
                continue;
            }

            if self.oracles.blacklist.is_blacklisted(member.id) {
                if self.options.settings.auto_ban_blacklisted {
                    self.ban_blacklisted_joiner(&join.chat, member, join.message)
                        .await;
                }
                continue;
            }

            self.challenge(&join.chat, member, join.message).await;
        }
    }

    async fn ban_blacklisted_joiner(
        &self,
        chat: &ChatRef,
        member: &Person,
        join_message: Option<MessageId>,
    ) {
        let banned = self
            .fenced(
                chat,
                Action::Ban,
                self.actions.ban_user(chat.id, member.id, None, true),
            )
            .await
            .is_some();
        if let Some(message) = join_message {
            self.fenced(chat, Action::Delete, self.actions.delete_message(chat.id, message))
                .await;
        }
        if banned {
            self.stats.record(chat, BanKind::Blacklist);
            info!("Blacklisted {} banned on joining {}", member.id, chat.id);
        }
    }

    /// Issue a challenge unless one is already pending.
    pub(crate) async fn challenge(
        &self,
        chat: &ChatRef,
        user: &Person,
        join_message: Option<MessageId>,
    ) {
        if self.challenges.is_pending(chat.id, user.id) {
            return;
        }

        let answer = rand::rng().random_range(0..CHALLENGE_OPTIONS.len());
        let lang = &self.options.locale;
        let item = get_text(lang, &format!("captcha.items.{}", CHALLENGE_OPTIONS[answer].1));
        let text = format_text(
            lang,
            "captcha.prompt",
            &[
                ("name", mention(user).as_str()),
                ("chat", html_escape(&chat.title).as_str()),
                ("item", item.as_str()),
            ],
        );

        let Some(message) = self
            .fenced(
                chat,
                Action::Challenge,
                self.actions
                    .send_text(chat.id, text, challenge_keyboard(user.id)),
            )
            .await
        else {
            return;
        };

        let doomed: Vec<MessageId> = std::iter::once(message).chain(join_message).collect();
        let cleanup = self.escalation.delete_later(chat.id, doomed, CLEANUP_DELAY);

        let pending = PendingChallenge {
            chat: chat.clone(),
            user: user.clone(),
            issued_at: Instant::now(),
            answer,
            message,
            join_message,
            cleanup,
        };
        match self.challenges.begin(pending) {
            Ok(()) => info!("Challenged {} in {}", user.id, chat.id),
            Err(duplicate) => {
                duplicate.cleanup.abort();
                self.attempt(
                    "drop duplicate challenge",
                    self.actions.delete_message(chat.id, message),
                )
                .await;
            }
        }
    }

    pub(crate) async fn on_captcha_press(&self, press: &ButtonPress) {
        let lang = &self.options.locale;
        let Some((target, option)) = parse_callback(&press.data) else {
            debug!("Malformed challenge payload {:?}", press.data);
            self.answer(press, None).await;
            return;
        };

        match self
            .challenges
            .resolve(press.chat.id, target, press.from.id, option)
        {
            Resolution::NotYours => {
                self.answer(press, Some(get_text(lang, "captcha.not_yours")))
                    .await;
            }
            Resolution::Missing => {
                self.answer(press, Some(get_text(lang, "captcha.expired")))
                    .await;
            }
            Resolution::Passed(pending) => {
                self.answer(press, Some(get_text(lang, "captcha.passed")))
                    .await;
                self.fenced(
                    &pending.chat,
                    Action::Delete,
                    self.actions.delete_message(pending.chat.id, pending.message),
                )
                .await;
                info!("{} passed the challenge in {}", pending.user.id, pending.chat.id);
            }
            Resolution::Failed(pending) => {
                self.answer(press, Some(get_text(lang, "captcha.failed")))
                    .await;
                self.fenced(
                    &pending.chat,
                    Action::Delete,
                    self.actions.delete_message(pending.chat.id, pending.message),
                )
                .await;
                info!("{} failed the challenge in {}", pending.user.id, pending.chat.id);
                self.penalize(pending).await;
            }
        }
    }

    /// Fail every timed-out challenge. Returns how many were failed.
    pub async fn sweep_challenges(&self) -> usize {
        let expired = self.challenges.expire(Instant::now());
        let count = expired.len();
        for pending in expired {
            info!("Challenge of {} in {} timed out", pending.user.id, pending.chat.id);
            self.attempt(
                "delete timed-out challenge",
                self.actions.delete_message(pending.chat.id, pending.message),
            )
            .await;
            self.penalize(pending).await;
        }
        count
    }

    /// Temporary ban, stat, join message removal and scheduled unban.
    async fn penalize(&self, pending: PendingChallenge) {
        let chat = &pending.chat;
        self.stats.record(chat, BanKind::Captcha);

        let until = Utc::now() + chrono::Duration::seconds(RESTRICTION.as_secs() as i64);
        if self
            .fenced(
                chat,
                Action::Restrict,
                self.actions
                    .ban_user(chat.id, pending.user.id, Some(until), false),
            )
            .await
            .is_none()
        {
            warn!("{} stays in {} unrestricted", pending.user.id, chat.id);
        }

        if let Some(message) = pending.join_message {
            self.attempt("delete join message", self.actions.delete_message(chat.id, message))
                .await;
        }

        self.escalation.schedule_unban(chat.id, pending.user.id);
    }
}
