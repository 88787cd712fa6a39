//! Utility functions.
//!
//! Formatting helpers for HTML messages sent by the bot.

use crate::events::{Person, Sender};

/// Escape text for Telegram's HTML parse mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Clickable mention of a user.
pub fn mention(person: &Person) -> String {
    let name = if person.name.trim().is_empty() {
        person.id.to_string()
    } else {
        html_escape(&person.name)
    };
    match &person.username {
        Some(username) => format!(
            "<a href=\"tg://user?id={}\">{}</a> (@{})",
            person.id, name, username
        ),
        None => format!("<a href=\"tg://user?id={}\">{}</a>", person.id, name),
    }
}

/// Display form of a message author.
pub fn describe_sender(sender: &Sender) -> String {
    match sender {
        Sender::User(person) => mention(person),
        Sender::Channel { id, title } => format!("{} [{}]", html_escape(title), id),
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
