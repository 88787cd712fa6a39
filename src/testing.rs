//! Test doubles: a recording [`ChatActions`] and a moderator test bed.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use teloxide::types::{ChatId, MessageId, UserId};
use tempfile::TempDir;

use crate::bot::{Button, ChatActions};
use crate::config::{DataPaths, ModerationSettings};
use crate::database::{ApprovedRepository, BlacklistRepository, KnownBadRepository};
use crate::error::{ActionError, ActionResult};
use crate::events::{ChatRef, IncomingMessage, Person, Sender};
use crate::moderation::{Moderator, ModeratorOptions, Oracles};
use crate::oracles::{ClubDirectory, HAM_EXAMPLES, SPAM_EXAMPLES, SpamClassifier};
use crate::text::StopWords;

pub const REVIEW_CHAT: ChatId = ChatId(-1000);

/// A platform call as seen by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Delete {
        chat: ChatId,
        message: MessageId,
    },
    Ban {
        chat: ChatId,
        user: UserId,
        until: Option<DateTime<Utc>>,
        revoke: bool,
    },
    BanChannel {
        chat: ChatId,
        channel: ChatId,
    },
    Unban {
        chat: ChatId,
        user: UserId,
    },
    Send {
        chat: ChatId,
        text: String,
        keyboard: Vec<Vec<Button>>,
    },
    Forward {
        to: ChatId,
        from: ChatId,
        message: MessageId,
    },
    ClearButtons {
        chat: ChatId,
        message: MessageId,
    },
    Answer {
        query_id: String,
        text: Option<String>,
    },
}

/// Records calls; deleting a message twice fails like the real API does.
#[derive(Default)]
pub struct RecordingActions {
    calls: Mutex<Vec<Call>>,
    deleted: Mutex<HashSet<(ChatId, MessageId)>>,
    denied: Mutex<HashSet<&'static str>>,
    next_message: AtomicI32,
}

impl RecordingActions {
    /// Make every call of `kind` ("delete", "ban", "send", ...) fail with a rights error.
    pub fn deny(&self, kind: &'static str) {
        self.denied.lock().insert(kind);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Successful deletions, in call order.
    pub fn deleted(&self) -> Vec<(ChatId, MessageId)> {
        let deleted = self.deleted.lock();
        let mut out = Vec::new();
        for call in self.calls.lock().iter() {
            if let Call::Delete { chat, message } = call {
                let key = (*chat, *message);
                if deleted.contains(&key) && !out.contains(&key) {
                    out.push(key);
                }
            }
        }
        out
    }

    /// Texts sent to `chat`.
    pub fn sent_to(&self, chat: ChatId) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Send { chat: to, text, .. } if *to == chat => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Keyboard of the last message sent to `chat`.
    pub fn last_keyboard(&self, chat: ChatId) -> Vec<Vec<Button>> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|c| match c {
                Call::Send {
                    chat: to, keyboard, ..
                } if *to == chat => Some(keyboard.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn record(&self, kind: &'static str, call: Call) -> ActionResult<()> {
        self.calls.lock().push(call);
        if self.denied.lock().contains(kind) {
            return Err(ActionError::Rejected(
                "Bad Request: not enough rights".to_string(),
            ));
        }
        Ok(())
    }
}

impl ChatActions for RecordingActions {
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> ActionResult<()> {
        self.record("delete", Call::Delete { chat, message })?;
        if !self.deleted.lock().insert((chat, message)) {
            return Err(ActionError::Rejected(
                "Bad Request: message to delete not found".to_string(),
            ));
        }
        Ok(())
    }

    async fn ban_user(
        &self,
        chat: ChatId,
        user: UserId,
        until: Option<DateTime<Utc>>,
        revoke: bool,
    ) -> ActionResult<()> {
        self.record(
            "ban",
            Call::Ban {
                chat,
                user,
                until,
                revoke,
            },
        )
    }

    async fn ban_channel(&self, chat: ChatId, channel: ChatId) -> ActionResult<()> {
        self.record("ban", Call::BanChannel { chat, channel })
    }

    async fn unban_user(&self, chat: ChatId, user: UserId) -> ActionResult<()> {
        self.record("unban", Call::Unban { chat, user })
    }

    async fn send_text(
        &self,
        chat: ChatId,
        text: String,
        keyboard: Vec<Vec<Button>>,
    ) -> ActionResult<MessageId> {
        self.record(
            "send",
            Call::Send {
                chat,
                text,
                keyboard,
            },
        )?;
        Ok(MessageId(10_000 + self.next_message.fetch_add(1, Ordering::SeqCst)))
    }

    async fn forward(&self, to: ChatId, from: ChatId, message: MessageId) -> ActionResult<()> {
        self.record("forward", Call::Forward { to, from, message })
    }

    async fn clear_buttons(&self, chat: ChatId, message: MessageId) -> ActionResult<()> {
        self.record("clear", Call::ClearButtons { chat, message })
    }

    async fn answer_press(&self, query_id: String, text: Option<String>) -> ActionResult<()> {
        self.record("answer", Call::Answer { query_id, text })
    }
}

pub fn person(id: u64, name: &str) -> Person {
    Person {
        id: UserId(id),
        name: name.to_string(),
        username: None,
    }
}

pub fn group(id: i64) -> ChatRef {
    ChatRef {
        id: ChatId(id),
        title: format!("group {}", id),
    }
}

pub fn text_message(chat: &ChatRef, id: i32, from: &Person, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat: chat.clone(),
        id: MessageId(id),
        sender: Sender::User(from.clone()),
        text: Some(text.to_string()),
        album: None,
        reply_text: None,
    }
}

/// Builder for a moderator over [`RecordingActions`] and a temp data dir.
pub struct TestBed {
    settings: ModerationSettings,
    club: Vec<u64>,
    blacklist: Vec<u64>,
    approved: Vec<u64>,
    stop_words: Vec<String>,
}

/// A built test bed. Keep `dir` alive for the duration of the test.
pub struct Harness {
    pub dir: TempDir,
    pub paths: DataPaths,
    pub actions: Arc<RecordingActions>,
    pub moderator: Arc<Moderator<RecordingActions>>,
}

impl TestBed {
    pub fn new() -> Self {
        Self {
            settings: ModerationSettings::default(),
            club: Vec::new(),
            blacklist: Vec::new(),
            approved: Vec::new(),
            stop_words: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: ModerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn club(mut self, ids: &[u64]) -> Self {
        self.club.extend_from_slice(ids);
        self
    }

    pub fn blacklist(mut self, ids: &[u64]) -> Self {
        self.blacklist.extend_from_slice(ids);
        self
    }

    pub fn approved(mut self, ids: &[u64]) -> Self {
        self.approved.extend_from_slice(ids);
        self
    }

    pub fn stop_words(mut self, words: &[&str]) -> Self {
        self.stop_words.extend(words.iter().map(|w| w.to_string()));
        self
    }

    pub async fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());

        let approved = ApprovedRepository::open(&paths.approved).await;
        for id in self.approved {
            approved.approve(UserId(id)).await.unwrap();
        }
        let blacklist = BlacklistRepository::open(&paths.blacklist).await;
        for id in self.blacklist {
            blacklist.add(UserId(id)).await.unwrap();
        }

        let oracles = Oracles {
            approved,
            blacklist,
            known_bad: KnownBadRepository::open(&paths.known_bad).await,
            classifier: SpamClassifier::from_examples(SPAM_EXAMPLES, HAM_EXAMPLES),
            club: ClubDirectory::with_members(self.club),
            stop_words: StopWords::new(self.stop_words),
        };

        let actions = Arc::new(RecordingActions::default());
        let moderator = Arc::new(Moderator::new(
            Arc::clone(&actions),
            oracles,
            ModeratorOptions {
                review_chat: REVIEW_CHAT,
                locale: "en".to_string(),
                settings: self.settings,
            },
        ));

        Harness {
            dir,
            paths,
            actions,
            moderator,
        }
    }
}
