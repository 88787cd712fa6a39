//! Domain events.
//!
//! Platform updates are converted into these before they reach the moderator
//! (see `bot::convert`), so the moderation code never touches teloxide types
//! beyond the id newtypes.

use teloxide::types::{ChatId, MessageId, UserId};

/// One unit of work for the moderator.
#[derive(Debug, Clone)]
pub enum Event {
    Message(IncomingMessage),
    Joined(MemberJoined),
    Press(ButtonPress),
    Restricted(MemberRestricted),
}

impl Event {
    /// Album id of a media-group fragment.
    pub fn album(&self) -> Option<&str> {
        match self {
            Event::Message(msg) => msg.album.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRef {
    pub id: ChatId,
    pub title: String,
}

/// A human (or at least a non-bot) account.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: UserId,
    pub name: String,
    pub username: Option<String>,
}

/// Who a message is attributed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Sender {
    User(Person),
    /// Posted "as" a channel; there is no user id to trust or challenge.
    Channel { id: ChatId, title: String },
}

impl Sender {
    pub fn user(&self) -> Option<&Person> {
        match self {
            Sender::User(person) => Some(person),
            Sender::Channel { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user().map(|p| p.id)
    }
}

/// A group message, text or caption already extracted.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat: ChatRef,
    pub id: MessageId,
    pub sender: Sender,
    /// Text or caption; `None` for pure media.
    pub text: Option<String>,
    pub album: Option<String>,
    /// Text of the message this one replies to.
    pub reply_text: Option<String>,
}

impl IncomingMessage {
    /// Text with whitespace-only content treated as absent.
    pub fn usable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// New members in a chat.
#[derive(Debug, Clone)]
pub struct MemberJoined {
    pub chat: ChatRef,
    pub members: Vec<Person>,
    /// The "X joined the group" service message, when the join came with one.
    pub message: Option<MessageId>,
}

/// An inline keyboard button press.
#[derive(Debug, Clone)]
pub struct ButtonPress {
    pub query_id: String,
    pub from: Person,
    pub chat: ChatRef,
    /// Message carrying the keyboard.
    pub message: MessageId,
    pub data: String,
}

/// A member restricted or banned by somebody other than this bot.
#[derive(Debug, Clone)]
pub struct MemberRestricted {
    pub chat: ChatRef,
    pub user: Person,
    pub by: Person,
    pub banned: bool,
}
