//! Review desk: reports, moderator buttons and review-chat commands.

use teloxide::types::{ChatId, MessageId, UserId};
use tracing::{debug, info, warn};

use super::pipeline::Reason;
use super::{Action, Moderator};
use crate::bot::{Button, ChatActions};
use crate::cache::{CacheConfig, TypedCache};
use crate::events::{ButtonPress, ChatRef, IncomingMessage, MemberRestricted, Sender};
use crate::i18n::{format_text, get_text};
use crate::text::normalize;
use crate::utils::{describe_sender, html_escape, mention, truncate};

/// Quoted message text in a report is cut to this many characters.
const MAX_QUOTED_CHARS: usize = 1000;

/// A reported message a moderator may still ban for.
#[derive(Debug, Clone)]
pub struct FlaggedMessage {
    pub chat: ChatRef,
    pub message: MessageId,
    pub sender: Sender,
    pub text: Option<String>,
}

impl From<&IncomingMessage> for FlaggedMessage {
    fn from(msg: &IncomingMessage) -> Self {
        Self {
            chat: msg.chat.clone(),
            message: msg.id,
            sender: msg.sender.clone(),
            text: msg.usable_text().map(str::to_string),
        }
    }
}

/// Button payloads handed out with reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPayload {
    /// `ban:<chat>:<offender>`; the offender is a user id or a channel id.
    Ban { chat: ChatId, offender: i64 },
    /// `spam:<chat>:<message>`
    Spam { chat: ChatId, message: MessageId },
    /// `ham:<chat>:<message>`
    Ham { chat: ChatId, message: MessageId },
}

impl ReviewPayload {
    pub fn parse(data: &str) -> Option<Self> {
        let (kind, rest) = data.split_once(':')?;
        let (chat, id) = rest.split_once(':')?;
        let chat = ChatId(chat.parse().ok()?);
        match kind {
            "ban" => Some(Self::Ban {
                chat,
                offender: id.parse().ok()?,
            }),
            "spam" => Some(Self::Spam {
                chat,
                message: MessageId(id.parse().ok()?),
            }),
            "ham" => Some(Self::Ham {
                chat,
                message: MessageId(id.parse().ok()?),
            }),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Ban { chat, offender } => format!("ban:{}:{}", chat, offender),
            Self::Spam { chat, message } => format!("spam:{}:{}", chat, message.0),
            Self::Ham { chat, message } => format!("ham:{}:{}", chat, message.0),
        }
    }

    pub fn for_ban(chat: ChatId, sender: &Sender) -> Self {
        let offender = match sender {
            Sender::User(person) => person.id.0 as i64,
            Sender::Channel { id, .. } => id.0,
        };
        Self::Ban { chat, offender }
    }
}

pub fn is_review_data(data: &str) -> bool {
    ["ban:", "spam:", "ham:"].iter().any(|p| data.starts_with(p))
}

/// Tokens behind the report buttons.
#[derive(Debug)]
pub struct ReviewDesk {
    bans: TypedCache<String, FlaggedMessage>,
    /// Message text keyed by `<chat>:<message>`, for the Spam/Ham buttons.
    samples: TypedCache<String, String>,
}

impl Default for ReviewDesk {
    fn default() -> Self {
        Self {
            bans: TypedCache::new("review_bans", CacheConfig::review_tokens()),
            samples: TypedCache::new("review_samples", CacheConfig::review_tokens()),
        }
    }
}

fn sample_key(chat: ChatId, message: MessageId) -> String {
    format!("{}:{}", chat, message.0)
}

impl<A: ChatActions> Moderator<A> {
    fn describe(&self, reason: &Reason) -> String {
        let lang = &self.options.locale;
        let key = format!("review.reason.{}", reason.tag());
        match reason {
            Reason::Lookalike { words, more } => {
                let mut listed = html_escape(&words.join(", "));
                if *more {
                    listed.push(' ');
                    listed.push_str(&get_text(lang, "review.reason.lookalike_more"));
                }
                format_text(lang, &key, &[("words", listed.as_str())])
            }
            Reason::Spam { score } | Reason::LowConfidence { score } => {
                format_text(lang, &key, &[("score", format!("{:.2}", score).as_str())])
            }
            _ => get_text(lang, &key),
        }
    }

    fn render_card(&self, msg: &IncomingMessage, reason: &Reason) -> String {
        let lang = &self.options.locale;
        let text = match msg.usable_text() {
            Some(text) => html_escape(&truncate(text, MAX_QUOTED_CHARS)),
            None => get_text(lang, "review.no_text"),
        };
        format_text(
            lang,
            "review.card",
            &[
                ("tag", reason.tag()),
                ("reason", self.describe(reason).as_str()),
                ("chat", html_escape(&msg.chat.title).as_str()),
                ("sender", describe_sender(&msg.sender).as_str()),
                ("text", text.as_str()),
            ],
        )
    }

    /// Forward the original and post a report card. Must run before the original is deleted.
    pub(crate) async fn report(&self, msg: &IncomingMessage, reason: &Reason) {
        let review = self.options.review_chat;
        let lang = &self.options.locale;

        self.attempt(
            "forward to review",
            self.actions.forward(review, msg.chat.id, msg.id),
        )
        .await;

        let keyboard = if reason.is_harmful() {
            let data = ReviewPayload::for_ban(msg.chat.id, &msg.sender).encode();
            self.review.bans.insert(data.clone(), FlaggedMessage::from(msg));
            vec![vec![Button::new(get_text(lang, "review.buttons.ban"), data)]]
        } else {
            let key = sample_key(msg.chat.id, msg.id);
            self.review
                .samples
                .insert(key, msg.usable_text().unwrap_or_default().to_string());
            vec![vec![
                Button::new(
                    get_text(lang, "review.buttons.spam"),
                    ReviewPayload::Spam {
                        chat: msg.chat.id,
                        message: msg.id,
                    }
                    .encode(),
                ),
                Button::new(
                    get_text(lang, "review.buttons.ham"),
                    ReviewPayload::Ham {
                        chat: msg.chat.id,
                        message: msg.id,
                    }
                    .encode(),
                ),
            ]]
        };

        let card = self.render_card(msg, reason);
        self.attempt("post report", self.actions.send_text(review, card, keyboard))
            .await;
    }

    pub(crate) async fn on_review_press(&self, press: &ButtonPress) {
        let lang = &self.options.locale;
        if press.chat.id != self.options.review_chat {
            debug!("Review button pressed outside the review chat: {}", press.chat.id);
            self.answer(press, None).await;
            return;
        }
        let Some(payload) = ReviewPayload::parse(&press.data) else {
            debug!("Malformed review payload {:?}", press.data);
            self.answer(press, None).await;
            return;
        };

        let reply = match payload {
            ReviewPayload::Ban { .. } => match self.review.bans.take(&press.data) {
                Some(flagged) => {
                    self.ban_flagged(flagged, &press.from.name).await;
                    "review.banned"
                }
                None => "review.already_handled",
            },
            ReviewPayload::Spam { chat, message } | ReviewPayload::Ham { chat, message } => {
                match self.review.samples.take(&sample_key(chat, message)) {
                    Some(text) => {
                        let spam = matches!(payload, ReviewPayload::Spam { .. });
                        self.add_sample(&text, spam).await;
                        if spam { "review.added_spam" } else { "review.added_ham" }
                    }
                    None => "review.already_handled",
                }
            }
        };

        self.attempt(
            "clear report buttons",
            self.actions.clear_buttons(press.chat.id, press.message),
        )
        .await;
        self.answer(press, Some(get_text(lang, reply))).await;
    }

    /// Ban the author of a flagged message and learn from it.
    async fn ban_flagged(&self, flagged: FlaggedMessage, moderator: &str) {
        let chat = &flagged.chat;
        self.ban_sender(chat, &flagged.sender).await;
        self.fenced(
            chat,
            Action::Delete,
            self.actions.delete_message(chat.id, flagged.message),
        )
        .await;

        if let Some(user) = flagged.sender.user_id() {
            if let Err(e) = self.oracles.blacklist.add(user).await {
                warn!("{} blacklisted in memory only: {}", user, e);
            }
        }
        if let Some(text) = flagged.text.as_deref() {
            self.add_sample(text, true).await;
            if let Err(e) = self.oracles.known_bad.mark_bad(&normalize(text)).await {
                warn!("Known-bad fingerprint not persisted: {}", e);
            }
        }
        info!(
            "Moderator {} banned the author of message {} in {}",
            moderator, flagged.message.0, chat.id
        );
    }

    async fn add_sample(&self, text: &str, spam: bool) {
        let result = if spam {
            self.oracles.classifier.add_spam_example(text).await
        } else {
            self.oracles.classifier.add_ham_example(text).await
        };
        if let Err(e) = result {
            warn!("Training example kept in memory only: {}", e);
        }
    }

    /// `/spam`, `/ham` (as a reply) and `/approve <id>` in the review chat.
    pub(crate) async fn on_review_command(&self, msg: &IncomingMessage) -> anyhow::Result<()> {
        let lang = &self.options.locale;
        let review = self.options.review_chat;
        let Some(text) = msg.usable_text() else {
            return Ok(());
        };
        let mut words = text.split_whitespace();
        let Some(command) = words.next().and_then(|c| c.split('@').next()) else {
            return Ok(());
        };

        let reply = match command {
            "/spam" | "/ham" => {
                let Some(sample) = msg.reply_text.as_deref().filter(|t| !t.trim().is_empty())
                else {
                    self.notify(review, get_text(lang, "review.reply_required")).await;
                    return Ok(());
                };
                if command == "/spam" {
                    self.oracles.classifier.add_spam_example(sample).await?;
                    get_text(lang, "review.added_spam")
                } else {
                    self.oracles.classifier.add_ham_example(sample).await?;
                    get_text(lang, "review.added_ham")
                }
            }
            "/approve" => match words.next().and_then(|id| id.parse::<u64>().ok()) {
                Some(id) => {
                    let user = UserId(id);
                    let key = if self.oracles.approved.approve(user).await? {
                        "review.approved"
                    } else {
                        "review.already_approved"
                    };
                    format_text(lang, key, &[("user", id.to_string().as_str())])
                }
                None => get_text(lang, "review.approve_usage"),
            },
            _ => return Ok(()),
        };

        self.notify(review, reply).await;
        Ok(())
    }

    /// Tell moderators that someone else restricted a member, with their last message.
    pub(crate) async fn on_restricted(&self, event: &MemberRestricted) {
        let lang = &self.options.locale;
        let last = match self.recent.get(&(event.chat.id, event.user.id)) {
            Some(text) => html_escape(&truncate(&text, MAX_QUOTED_CHARS)),
            None => get_text(lang, "notice.no_recent"),
        };
        let key = if event.banned {
            "notice.banned"
        } else {
            "notice.restricted"
        };
        let text = format_text(
            lang,
            key,
            &[
                ("user", mention(&event.user).as_str()),
                ("chat", html_escape(&event.chat.title).as_str()),
                ("by", mention(&event.by).as_str()),
                ("text", last.as_str()),
            ],
        );
        self.notify(self.options.review_chat, text).await;
    }

    pub(crate) async fn privilege_notice(&self, chat: &ChatRef, action: Action) {
        let lang = &self.options.locale;
        let text = format_text(
            lang,
            "notice.privilege",
            &[
                ("action", get_text(lang, action.catalog_key()).as_str()),
                ("chat", html_escape(&chat.title).as_str()),
            ],
        );
        self.notify(self.options.review_chat, text).await;
    }

    pub(crate) async fn notify(&self, chat: ChatId, text: String) {
        self.attempt("send notice", self.actions.send_text(chat, text, Vec::new()))
            .await;
    }
}
