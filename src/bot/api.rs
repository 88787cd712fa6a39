//! Platform action API.
//!
//! Everything the moderator does to a chat goes through [`ChatActions`], so the
//! decision code can be exercised against a recording fake.

use std::future::Future;

use chrono::{DateTime, Utc};
use teloxide::adaptors::Throttle;
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, UserId,
};

use crate::error::ActionResult;

/// Type alias for the throttled bot.
pub type ThrottledBot = Throttle<Bot>;

/// Inline keyboard button with callback data.
#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Side-effecting calls against the chat platform.
///
/// Every call is independent: callers decide what a failure means.
pub trait ChatActions: Send + Sync + 'static {
    fn delete_message(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> impl Future<Output = ActionResult<()>> + Send;

    /// Ban a user, temporarily when `until` is set. `revoke` also deletes their history.
    fn ban_user(
        &self,
        chat: ChatId,
        user: UserId,
        until: Option<DateTime<Utc>>,
        revoke: bool,
    ) -> impl Future<Output = ActionResult<()>> + Send;

    /// Ban a channel identity from posting in the chat.
    fn ban_channel(
        &self,
        chat: ChatId,
        channel: ChatId,
    ) -> impl Future<Output = ActionResult<()>> + Send;

    /// Lift a ban; a no-op for users that are not banned.
    fn unban_user(&self, chat: ChatId, user: UserId)
    -> impl Future<Output = ActionResult<()>> + Send;

    /// Send an HTML message, optionally with an inline keyboard.
    fn send_text(
        &self,
        chat: ChatId,
        text: String,
        keyboard: Vec<Vec<Button>>,
    ) -> impl Future<Output = ActionResult<MessageId>> + Send;

    fn forward(
        &self,
        to: ChatId,
        from: ChatId,
        message: MessageId,
    ) -> impl Future<Output = ActionResult<()>> + Send;

    /// Remove the inline keyboard of a message.
    fn clear_buttons(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> impl Future<Output = ActionResult<()>> + Send;

    /// Acknowledge a button press, with an optional toast.
    fn answer_press(
        &self,
        query_id: String,
        text: Option<String>,
    ) -> impl Future<Output = ActionResult<()>> + Send;
}

/// [`ChatActions`] over the throttled teloxide bot.
#[derive(Clone)]
pub struct TelegramActions {
    bot: ThrottledBot,
}

impl TelegramActions {
    pub fn new(bot: ThrottledBot) -> Self {
        Self { bot }
    }
}

fn markup(keyboard: Vec<Vec<Button>>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.into_iter().map(|row| {
        row.into_iter()
            .map(|b| InlineKeyboardButton::callback(b.label, b.data))
            .collect::<Vec<_>>()
    }))
}

impl ChatActions for TelegramActions {
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> ActionResult<()> {
        self.bot.delete_message(chat, message).await?;
        Ok(())
    }

    async fn ban_user(
        &self,
        chat: ChatId,
        user: UserId,
        until: Option<DateTime<Utc>>,
        revoke: bool,
    ) -> ActionResult<()> {
        let mut request = self.bot.ban_chat_member(chat, user).revoke_messages(revoke);
        if let Some(until) = until {
            request = request.until_date(until);
        }
        request.await?;
        Ok(())
    }

    async fn ban_channel(&self, chat: ChatId, channel: ChatId) -> ActionResult<()> {
        self.bot.ban_chat_sender_chat(chat, channel).await?;
        Ok(())
    }

    async fn unban_user(&self, chat: ChatId, user: UserId) -> ActionResult<()> {
        self.bot
            .unban_chat_member(chat, user)
            .only_if_banned(true)
            .await?;
        Ok(())
    }

    async fn send_text(
        &self,
        chat: ChatId,
        text: String,
        keyboard: Vec<Vec<Button>>,
    ) -> ActionResult<MessageId> {
        let mut request = self
            .bot
            .send_message(chat, text)
            .parse_mode(ParseMode::Html);
        if !keyboard.is_empty() {
            request = request.reply_markup(markup(keyboard));
        }
        let sent = request.await?;
        Ok(sent.id)
    }

    async fn forward(&self, to: ChatId, from: ChatId, message: MessageId) -> ActionResult<()> {
        self.bot.forward_message(to, from, message).await?;
        Ok(())
    }

    async fn clear_buttons(&self, chat: ChatId, message: MessageId) -> ActionResult<()> {
        self.bot.edit_message_reply_markup(chat, message).await?;
        Ok(())
    }

    async fn answer_press(&self, query_id: String, text: Option<String>) -> ActionResult<()> {
        let mut request = self.bot.answer_callback_query(query_id);
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await?;
        Ok(())
    }
}
