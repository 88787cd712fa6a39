//! The twelve-rule decision pipeline.
//!
//! Rules are evaluated in [`RULES`] order and the first one that fires decides.
//! Evaluating a rule has no side effects; [`Moderator::apply`] carries the
//! decision out.

use teloxide::types::UserId;
use tracing::{debug, info, warn};

use super::captcha::Challenges;
use super::stats::BanKind;
use super::{Action, Moderator, Oracles};
use crate::bot::ChatActions;
use crate::config::ModerationSettings;
use crate::events::{IncomingMessage, Sender};
use crate::oracles::Verdict;
use crate::text::{fold, lookalike_words, normalize, too_many_emojis};

/// At most this many lookalike words are listed in a report.
pub const MAX_LISTED_LOOKALIKES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    PendingChallenge,
    Approved,
    ClubMember,
    Blacklisted,
    NoText,
    KnownBad,
    Emoji,
    Lookalike,
    StopWord,
    Classifier,
    Channel,
    Ham,
}

pub const RULES: [Rule; 12] = [
    Rule::PendingChallenge,
    Rule::Approved,
    Rule::ClubMember,
    Rule::Blacklisted,
    Rule::NoText,
    Rule::KnownBad,
    Rule::Emoji,
    Rule::Lookalike,
    Rule::StopWord,
    Rule::Classifier,
    Rule::Channel,
    Rule::Ham,
];

/// Why a message went to review or got its author banned.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    Blacklisted,
    NoText,
    KnownBad,
    Emoji,
    Lookalike { words: Vec<String>, more: bool },
    StopWord,
    Spam { score: f64 },
    Channel,
    LowConfidence { score: f64 },
}

impl Reason {
    pub fn tag(&self) -> &'static str {
        match self {
            Reason::Blacklisted => "blacklisted",
            Reason::NoText => "no-text",
            Reason::KnownBad => "known-bad",
            Reason::Emoji => "emoji",
            Reason::Lookalike { .. } => "lookalike",
            Reason::StopWord => "stop-word",
            Reason::Spam { .. } => "spam",
            Reason::Channel => "channel",
            Reason::LowConfidence { .. } => "low-confidence",
        }
    }

    /// Everything but low-confidence ham gets a ban button.
    pub fn is_harmful(&self) -> bool {
        !matches!(self, Reason::LowConfidence { .. })
    }

    pub fn ban_kind(&self) -> Option<BanKind> {
        match self {
            Reason::Blacklisted => Some(BanKind::Blacklist),
            Reason::KnownBad => Some(BanKind::KnownBad),
            _ => None,
        }
    }
}

/// Terminal outcome for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Sender is mid-challenge: delete, nothing else.
    Suppress,
    Allow,
    Ban { reason: Reason },
    Review { reason: Reason, delete: bool },
    Ham { score: f64, low_confidence: bool },
}

/// Lazily computed views of one message.
pub(crate) struct Scan<'m> {
    msg: &'m IncomingMessage,
    folded: Option<String>,
    normalized: Option<String>,
    verdict: Option<Verdict>,
}

impl<'m> Scan<'m> {
    pub fn new(msg: &'m IncomingMessage) -> Self {
        Self {
            msg,
            folded: None,
            normalized: None,
            verdict: None,
        }
    }

    fn text(&self) -> &'m str {
        self.msg.usable_text().unwrap_or_default()
    }

    fn folded(&mut self) -> &str {
        let text = self.text();
        self.folded.get_or_insert_with(|| fold(text))
    }

    fn normalized(&mut self) -> &str {
        let text = self.text();
        self.normalized.get_or_insert_with(|| normalize(text))
    }

    fn verdict(&mut self, oracles: &Oracles) -> Verdict {
        if let Some(verdict) = self.verdict {
            return verdict;
        }
        let verdict = oracles.classifier.classify(self.normalized());
        self.verdict = Some(verdict);
        verdict
    }
}

/// Read-only view of everything the rules consult.
pub(crate) struct Pipeline<'a> {
    pub oracles: &'a Oracles,
    pub challenges: &'a Challenges,
    pub settings: &'a ModerationSettings,
}

impl Pipeline<'_> {
    pub async fn decide(&self, msg: &IncomingMessage) -> (Rule, Decision) {
        let mut scan = Scan::new(msg);
        for rule in RULES {
            if let Some(decision) = self.check(rule, &mut scan).await {
                return (rule, decision);
            }
        }
        (Rule::Ham, Decision::Allow)
    }

    /// Evaluate a single rule; `None` passes the message on to the next one.
    pub async fn check(&self, rule: Rule, scan: &mut Scan<'_>) -> Option<Decision> {
        let msg = scan.msg;
        let user: Option<UserId> = msg.sender.user_id();

        match rule {
            Rule::PendingChallenge => user
                .filter(|u| self.challenges.is_pending(msg.chat.id, *u))
                .map(|_| Decision::Suppress),

            Rule::Approved => user
                .filter(|u| self.oracles.approved.is_approved(*u))
                .map(|_| Decision::Allow),

            Rule::ClubMember => {
                let user = user?;
                self.oracles.club.is_member(user).await.then_some(Decision::Allow)
            }

            Rule::Blacklisted => user
                .filter(|u| self.oracles.blacklist.is_blacklisted(*u))
                .map(|_| {
                    if self.settings.auto_ban_blacklisted {
                        Decision::Ban {
                            reason: Reason::Blacklisted,
                        }
                    } else {
                        Decision::Review {
                            reason: Reason::Blacklisted,
                            delete: true,
                        }
                    }
                }),

            Rule::NoText => msg.usable_text().is_none().then_some(Decision::Review {
                reason: Reason::NoText,
                delete: false,
            }),

            Rule::KnownBad => self
                .oracles
                .known_bad
                .is_known_bad(scan.normalized())
                .then_some(Decision::Ban {
                    reason: Reason::KnownBad,
                }),

            Rule::Emoji => too_many_emojis(scan.text()).then_some(Decision::Review {
                reason: Reason::Emoji,
                delete: true,
            }),

            Rule::Lookalike => {
                let mut words = lookalike_words(scan.folded());
                if words.len() <= 1 {
                    return None;
                }
                let more = words.len() > MAX_LISTED_LOOKALIKES;
                words.truncate(MAX_LISTED_LOOKALIKES);
                Some(Decision::Review {
                    reason: Reason::Lookalike { words, more },
                    delete: true,
                })
            }

            Rule::StopWord => self
                .oracles
                .stop_words
                .matches(scan.normalized())
                .then_some(Decision::Review {
                    reason: Reason::StopWord,
                    delete: true,
                }),

            Rule::Classifier => {
                let verdict = scan.verdict(self.oracles);
                verdict.is_spam.then_some(Decision::Review {
                    reason: Reason::Spam {
                        score: verdict.score,
                    },
                    delete: true,
                })
            }

            Rule::Channel => matches!(msg.sender, Sender::Channel { .. }).then_some(
                Decision::Review {
                    reason: Reason::Channel,
                    delete: false,
                },
            ),

            Rule::Ham => {
                let score = scan.verdict(self.oracles).score;
                let low_confidence =
                    score.is_finite() && score > self.settings.low_confidence_threshold;
                Some(Decision::Ham {
                    score,
                    low_confidence,
                })
            }
        }
    }
}

impl<A: ChatActions> Moderator<A> {
    pub(crate) fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            oracles: &self.oracles,
            challenges: &self.challenges,
            settings: &self.options.settings,
        }
    }

    /// Run the pipeline on a group message and carry out the decision.
    pub(crate) async fn on_message(&self, msg: &IncomingMessage) {
        if let (Some(user), Some(text)) = (msg.sender.user(), msg.usable_text()) {
            self.recent.insert((msg.chat.id, user.id), text.to_string());
        }

        let (rule, decision) = self.pipeline().decide(msg).await;
        debug!(
            "Message {} in {}: {:?} -> {:?}",
            msg.id.0, msg.chat.id, rule, decision
        );
        self.apply(msg, decision).await;
    }

    pub(crate) async fn apply(&self, msg: &IncomingMessage, decision: Decision) {
        let chat = &msg.chat;

        match decision {
            Decision::Suppress => {
                self.fenced(chat, Action::Delete, self.actions.delete_message(chat.id, msg.id))
                    .await;
            }

            Decision::Allow => {}

            Decision::Ban { reason } => {
                let delete = self
                    .checked(chat, Action::Delete, self.actions.delete_message(chat.id, msg.id))
                    .await;
                let deleted = delete.is_ok();
                // A message that was already gone was handled before a restart.
                let replayed = matches!(&delete, Err(e) if e.is_missing_message());
                let banned = self.ban_sender(chat, &msg.sender).await;
                if banned && !replayed {
                    if let Some(kind) = reason.ban_kind() {
                        self.stats.record(chat, kind);
                    }
                }
                info!(
                    "[{}] message {} in {} deleted={} sender banned={}",
                    reason.tag(),
                    msg.id.0,
                    chat.id,
                    deleted,
                    banned
                );
            }

            Decision::Review { reason, delete } => {
                self.report(msg, &reason).await;
                if delete {
                    self.fenced(chat, Action::Delete, self.actions.delete_message(chat.id, msg.id))
                        .await;
                }
                info!(
                    "[{}] message {} in {} sent to review (deleted: {})",
                    reason.tag(),
                    msg.id.0,
                    chat.id,
                    delete
                );
            }

            Decision::Ham {
                score,
                low_confidence,
            } => {
                if low_confidence {
                    self.report(msg, &Reason::LowConfidence { score }).await;
                }
                if let Some(user) = msg.sender.user_id() {
                    self.record_ham(user).await;
                }
            }
        }
    }

    async fn record_ham(&self, user: UserId) {
        if !self.trust.record_ham(user) {
            return;
        }
        match self.oracles.approved.approve(user).await {
            Ok(_) => info!("{} promoted to approved", user),
            Err(e) => warn!("{} promoted but not persisted: {}", user, e),
        }
    }
}
