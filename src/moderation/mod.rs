//! Moderation - the decision core.
//!
//! [`Moderator`] owns every piece of in-memory moderation state and routes
//! events to the captcha, pipeline and review handlers. Platform calls go
//! through [`ChatActions`] so the whole core runs against a fake in tests.

mod captcha;
mod escalation;
mod pipeline;
mod review;
mod stats;
mod trust;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use teloxide::types::{ChatId, MessageId, UserId};
use tracing::{debug, warn};

use crate::bot::{ChatActions, EventHandler};
use crate::cache::{CacheConfig, TypedCache};
use crate::config::ModerationSettings;
use crate::database::{ApprovedRepository, BlacklistRepository, KnownBadRepository};
use crate::error::ActionResult;
use crate::events::{ButtonPress, ChatRef, Event, Sender};
use crate::oracles::{ClubDirectory, SpamClassifier};
use crate::text::StopWords;

pub use stats::is_digest_hour;

use captcha::{Challenges, is_captcha_data};
use escalation::Escalation;
use review::{ReviewDesk, is_review_data};
use stats::{ChatStats, render_digest};
use trust::TrustCounters;

/// Everything the pipeline consults to judge a sender or a text.
pub struct Oracles {
    pub approved: ApprovedRepository,
    pub blacklist: BlacklistRepository,
    pub known_bad: KnownBadRepository,
    pub classifier: SpamClassifier,
    pub club: ClubDirectory,
    pub stop_words: StopWords,
}

#[derive(Debug, Clone)]
pub struct ModeratorOptions {
    /// Moderators' chat: reports, notices and the daily digest go here.
    pub review_chat: ChatId,
    pub locale: String,
    pub settings: ModerationSettings,
}

/// Admin right a platform call needs; named in privilege notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ban,
    Delete,
    Restrict,
    Challenge,
}

impl Action {
    pub fn catalog_key(self) -> &'static str {
        match self {
            Action::Ban => "notice.actions.ban",
            Action::Delete => "notice.actions.delete",
            Action::Restrict => "notice.actions.restrict",
            Action::Challenge => "notice.actions.challenge",
        }
    }
}

pub struct Moderator<A> {
    actions: Arc<A>,
    oracles: Oracles,
    options: ModeratorOptions,
    challenges: Challenges,
    escalation: Escalation<A>,
    trust: TrustCounters,
    stats: ChatStats,
    review: ReviewDesk,
    /// Last text per (chat, user), quoted when someone else restricts the user.
    recent: TypedCache<(ChatId, UserId), String>,
    /// Messages already run through the pipeline.
    handled: TypedCache<(ChatId, MessageId), ()>,
}

impl<A: ChatActions> Moderator<A> {
    pub fn new(actions: Arc<A>, oracles: Oracles, options: ModeratorOptions) -> Self {
        Self {
            escalation: Escalation::new(Arc::clone(&actions)),
            actions,
            oracles,
            options,
            challenges: Challenges::default(),
            trust: TrustCounters::default(),
            stats: ChatStats::default(),
            review: ReviewDesk::default(),
            recent: TypedCache::new("recent_messages", CacheConfig::recent_messages()),
            handled: TypedCache::new("handled_messages", CacheConfig::handled_messages()),
        }
    }

    /// Resume ham counters saved by a previous run.
    pub fn with_trust_counts(mut self, counts: HashMap<u64, u32>) -> Self {
        self.trust = TrustCounters::restore(counts);
        self
    }

    pub fn trust_snapshot(&self) -> HashMap<u64, u32> {
        self.trust.snapshot()
    }

    /// Post the daily digest and reset the counters.
    ///
    /// Returns false when there was nothing to report.
    pub async fn send_digest(&self) -> bool {
        let chats = self.stats.drain();
        let Some(text) = render_digest(&self.options.locale, &chats) else {
            return false;
        };
        self.attempt(
            "send digest",
            self.actions
                .send_text(self.options.review_chat, text, Vec::new()),
        )
        .await;
        true
    }

    pub async fn handle(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::Message(msg) => {
                if msg.chat.id == self.options.review_chat {
                    return self.on_review_command(&msg).await;
                }
                if !self.first_delivery(msg.chat.id, msg.id) {
                    debug!("Message {} in {} already handled", msg.id.0, msg.chat.id);
                    return Ok(());
                }
                self.on_message(&msg).await;
            }
            Event::Joined(join) => {
                if join.chat.id == self.options.review_chat {
                    return Ok(());
                }
                if let Some(message) = join.message {
                    if !self.first_delivery(join.chat.id, message) {
                        debug!("Join message {} in {} already handled", message.0, join.chat.id);
                        return Ok(());
                    }
                }
                self.on_join(&join).await;
            }
            Event::Press(press) => {
                if is_captcha_data(&press.data) {
                    self.on_captcha_press(&press).await;
                } else if is_review_data(&press.data) {
                    self.on_review_press(&press).await;
                } else {
                    debug!("Unknown button payload {:?}", press.data);
                    self.answer(&press, None).await;
                }
            }
            Event::Restricted(restricted) => {
                if restricted.chat.id != self.options.review_chat {
                    self.on_restricted(&restricted).await;
                }
            }
        }
        Ok(())
    }

    fn first_delivery(&self, chat: ChatId, message: MessageId) -> bool {
        self.handled.insert_new((chat, message), ())
    }

    /// Run a platform call that needs an admin right in `chat`.
    ///
    /// Failures are logged; missing rights also produce a privilege notice.
    pub(crate) async fn fenced<T>(
        &self,
        chat: &ChatRef,
        action: Action,
        call: impl Future<Output = ActionResult<T>>,
    ) -> Option<T> {
        self.checked(chat, action, call).await.ok()
    }

    /// Like [`Moderator::fenced`], but hands the error back to the caller.
    pub(crate) async fn checked<T>(
        &self,
        chat: &ChatRef,
        action: Action,
        call: impl Future<Output = ActionResult<T>>,
    ) -> ActionResult<T> {
        let result = call.await;
        if let Err(e) = &result {
            warn!("{:?} in {} failed: {}", action, chat.id, e);
            if e.is_privilege() {
                self.privilege_notice(chat, action).await;
            }
        }
        result
    }

    /// Run a platform call whose failure is only worth a log line.
    pub(crate) async fn attempt<T>(
        &self,
        what: &str,
        call: impl Future<Output = ActionResult<T>>,
    ) -> Option<T> {
        match call.await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Failed to {}: {}", what, e);
                None
            }
        }
    }

    pub(crate) async fn answer(&self, press: &ButtonPress, text: Option<String>) {
        self.attempt(
            "answer button press",
            self.actions.answer_press(press.query_id.clone(), text),
        )
        .await;
    }

    /// Permanently ban a message author: a user with history revoked, or a channel.
    pub(crate) async fn ban_sender(&self, chat: &ChatRef, sender: &Sender) -> bool {
        let call = async {
            match sender {
                Sender::User(person) => {
                    self.actions
                        .ban_user(chat.id, person.id, None, true)
                        .await
                }
                Sender::Channel { id, .. } => self.actions.ban_channel(chat.id, *id).await,
            }
        };
        self.fenced(chat, Action::Ban, call).await.is_some()
    }
}

impl<A: ChatActions> EventHandler for Moderator<A> {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        Moderator::handle(self, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, REVIEW_CHAT, TestBed, group, person, text_message};

    #[tokio::test]
    async fn unknown_buttons_are_acknowledged() {
        let h = TestBed::new().build().await;
        h.moderator
            .handle(Event::Press(ButtonPress {
                query_id: "q1".into(),
                from: person(1, "Ann"),
                chat: group(-1),
                message: MessageId(5),
                data: "settings:open".into(),
            }))
            .await
            .unwrap();

        assert_eq!(
            h.actions.calls(),
            vec![Call::Answer {
                query_id: "q1".into(),
                text: None
            }]
        );
    }

    #[tokio::test]
    async fn digest_is_posted_once_then_reset() {
        let h = TestBed::new().blacklist(&[6]).build().await;
        let chat = group(-1);
        let msg = text_message(&chat, 7, &person(6, "Spammer"), "hi");
        h.moderator.handle(Event::Message(msg)).await.unwrap();
        h.actions.clear();

        assert!(h.moderator.send_digest().await);
        let digest = &h.actions.sent_to(REVIEW_CHAT)[0];
        assert!(digest.contains("<b>group -1</b>: 1 bans (0 captcha, 1 blacklist, 0 known spam)"));

        assert!(!h.moderator.send_digest().await);
        assert_eq!(h.actions.sent_to(REVIEW_CHAT).len(), 1);
    }

    #[tokio::test]
    async fn join_redelivery_is_ignored() {
        let h = TestBed::new().build().await;
        let join = crate::events::MemberJoined {
            chat: group(-1),
            members: vec![person(4, "Ann")],
            message: Some(MessageId(50)),
        };
        h.moderator.handle(Event::Joined(join.clone())).await.unwrap();
        h.moderator.handle(Event::Joined(join)).await.unwrap();

        assert_eq!(h.actions.sent_to(ChatId(-1)).len(), 1);
    }

    #[tokio::test]
    async fn trust_counts_survive_a_restart() {
        let h = TestBed::new().build().await;
        let chat = group(-1);
        let msg = text_message(&chat, 1, &person(30, "Ann"), "thanks for the link");
        h.moderator.handle(Event::Message(msg)).await.unwrap();
        let saved = h.moderator.trust_snapshot();
        assert_eq!(saved.get(&30), Some(&1));

        let restarted = TestBed::new().build().await;
        let moderator = Moderator::new(
            Arc::clone(&restarted.actions),
            Oracles {
                approved: ApprovedRepository::open(&restarted.paths.approved).await,
                blacklist: BlacklistRepository::open(&restarted.paths.blacklist).await,
                known_bad: KnownBadRepository::open(&restarted.paths.known_bad).await,
                classifier: SpamClassifier::from_examples(
                    crate::oracles::SPAM_EXAMPLES,
                    crate::oracles::HAM_EXAMPLES,
                ),
                club: ClubDirectory::with_members(Vec::new()),
                stop_words: StopWords::new(Vec::<String>::new()),
            },
            restarted.moderator.options.clone(),
        )
        .with_trust_counts(saved);
        assert_eq!(moderator.trust.get(UserId(30)), Some(1));
    }
}
