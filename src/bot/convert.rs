//! Conversion of teloxide updates into domain events.

use teloxide::types::{
    CallbackQuery, Chat, ChatMemberKind, ChatMemberUpdated, Message, Update, UpdateKind, User,
    UserId,
};
use tracing::debug;

use crate::events::{
    ButtonPress, ChatRef, Event, IncomingMessage, MemberJoined, MemberRestricted, Person, Sender,
};

/// Convert one update. `None` for anything the moderator does not care about.
pub fn convert(update: Update, me: UserId) -> Option<Event> {
    match update.kind {
        UpdateKind::Message(msg) => from_message(&msg),
        UpdateKind::CallbackQuery(q) => from_callback(&q),
        UpdateKind::ChatMember(change) => from_member_change(&change, me),
        _ => None,
    }
}

fn chat_ref(chat: &Chat) -> ChatRef {
    ChatRef {
        id: chat.id,
        title: chat.title().unwrap_or_default().to_string(),
    }
}

fn person(user: &User) -> Person {
    Person {
        id: user.id,
        name: user.full_name(),
        username: user.username.clone(),
    }
}

fn text_of(msg: &Message) -> Option<String> {
    msg.text().or_else(|| msg.caption()).map(str::to_string)
}

fn from_message(msg: &Message) -> Option<Event> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return None;
    }
    let chat = chat_ref(&msg.chat);

    if let Some(users) = msg.new_chat_members() {
        let members: Vec<Person> = users.iter().filter(|u| !u.is_bot).map(person).collect();
        if members.is_empty() {
            return None;
        }
        return Some(Event::Joined(MemberJoined {
            chat,
            members,
            message: Some(msg.id),
        }));
    }

    if msg.is_automatic_forward() {
        debug!("Skipping automatic forward {} in {}", msg.id.0, chat.id);
        return None;
    }

    // Channel posts arrive with a placeholder bot account in `from`, so the
    // sender chat has to be checked first.
    let sender = match (&msg.sender_chat, &msg.from) {
        (Some(sender_chat), _) if sender_chat.id == msg.chat.id => {
            debug!("Skipping anonymous admin post in {}", chat.id);
            return None;
        }
        (Some(sender_chat), _) => Sender::Channel {
            id: sender_chat.id,
            title: sender_chat.title().unwrap_or_default().to_string(),
        },
        (None, Some(user)) if !user.is_bot => Sender::User(person(user)),
        _ => return None,
    };

    Some(Event::Message(IncomingMessage {
        chat,
        id: msg.id,
        sender,
        text: text_of(msg),
        album: msg.media_group_id().map(|id| id.to_string()),
        reply_text: msg.reply_to_message().and_then(text_of),
    }))
}

fn from_callback(q: &CallbackQuery) -> Option<Event> {
    let (Some(data), Some(message)) = (&q.data, &q.message) else {
        debug!("Skipping callback {} without data or message", q.id);
        return None;
    };

    Some(Event::Press(ButtonPress {
        query_id: q.id.clone(),
        from: person(&q.from),
        chat: chat_ref(message.chat()),
        message: message.id(),
        data: data.clone(),
    }))
}

fn is_limited(kind: &ChatMemberKind) -> bool {
    kind.is_restricted() || kind.is_banned()
}

fn from_member_change(change: &ChatMemberUpdated, me: UserId) -> Option<Event> {
    let old = &change.old_chat_member;
    let new = &change.new_chat_member;
    let user = &new.user;
    if user.is_bot {
        return None;
    }

    if !old.kind.is_present() && new.kind.is_present() && !is_limited(&new.kind) {
        return Some(Event::Joined(MemberJoined {
            chat: chat_ref(&change.chat),
            members: vec![person(user)],
            message: None,
        }));
    }

    if is_limited(&new.kind) && !is_limited(&old.kind) && change.from.id != me {
        return Some(Event::Restricted(MemberRestricted {
            chat: chat_ref(&change.chat),
            user: person(user),
            by: person(&change.from),
            banned: new.kind.is_banned(),
        }));
    }

    None
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use teloxide::types::{ChatId, MessageId};

    use super::*;

    const ME: UserId = UserId(999);
    const GROUP: i64 = -100_123;

    fn update(kind: &str, body: Value) -> Update {
        let mut raw = json!({ "update_id": 1 });
        raw[kind] = body;
        let update: Update = serde_json::from_str(&raw.to_string()).unwrap();
        // teloxide keeps unparseable updates as `Error` instead of failing.
        assert!(!matches!(update.kind, UpdateKind::Error(_)), "{:?}", update.kind);
        update
    }

    fn user(id: u64, name: &str) -> Value {
        json!({ "id": id, "is_bot": false, "first_name": name })
    }

    fn bot_user(id: u64) -> Value {
        json!({ "id": id, "is_bot": true, "first_name": "Helper", "username": "helper_bot" })
    }

    fn group() -> Value {
        json!({ "id": GROUP, "type": "supergroup", "title": "Rustaceans" })
    }

    fn channel() -> Value {
        json!({ "id": -100_777, "type": "channel", "title": "Deals" })
    }

    fn message(id: i32, chat: Value, from: Value) -> Value {
        json!({ "message_id": id, "date": 1_700_000_000, "chat": chat, "from": from })
    }

    fn with(mut base: Value, extra: Value) -> Value {
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        base
    }

    fn text(id: i32, chat: Value, from: Value, text: &str) -> Value {
        with(message(id, chat, from), json!({ "text": text }))
    }

    fn member_change(from: Value, target: Value, old: &str, new: Value) -> Value {
        json!({
            "chat": group(),
            "from": from,
            "date": 1_700_000_000,
            "old_chat_member": { "user": target, "status": old },
            "new_chat_member": new,
        })
    }

    #[test]
    fn group_text_becomes_a_message() {
        let body = with(
            text(7, group(), user(5, "Ann"), "hello"),
            json!({ "reply_to_message": text(6, group(), user(8, "Bob"), "hi all") }),
        );

        let Some(Event::Message(msg)) = convert(update("message", body), ME) else {
            panic!("expected a message");
        };
        assert_eq!(msg.chat.id, ChatId(GROUP));
        assert_eq!(msg.chat.title, "Rustaceans");
        assert_eq!(msg.id, MessageId(7));
        assert_eq!(msg.sender.user_id(), Some(UserId(5)));
        assert_eq!(msg.text.as_deref(), Some("hello"));
        assert_eq!(msg.reply_text.as_deref(), Some("hi all"));
        assert_eq!(msg.album, None);
    }

    #[test]
    fn album_caption_is_the_text() {
        let body = with(
            message(9, group(), user(5, "Ann")),
            json!({
                "photo": [{
                    "file_id": "a",
                    "file_unique_id": "b",
                    "file_size": 10,
                    "width": 1,
                    "height": 1,
                }],
                "caption": "buy now",
                "media_group_id": "g1",
            }),
        );

        let Some(Event::Message(msg)) = convert(update("message", body), ME) else {
            panic!("expected a message");
        };
        assert_eq!(msg.text.as_deref(), Some("buy now"));
        assert_eq!(msg.album.as_deref(), Some("g1"));
    }

    #[test]
    fn private_chats_and_bots_are_ignored() {
        let private = json!({ "id": 5, "type": "private", "first_name": "Ann" });
        let body = text(1, private, user(5, "Ann"), "hello");
        assert!(convert(update("message", body), ME).is_none());

        let body = text(2, group(), bot_user(50), "hello");
        assert!(convert(update("message", body), ME).is_none());
    }

    #[test]
    fn automatic_forwards_are_ignored() {
        let body = with(
            text(3, group(), user(777_000, "Telegram"), "new post"),
            json!({ "sender_chat": channel(), "is_automatic_forward": true }),
        );
        assert!(convert(update("message", body), ME).is_none());
    }

    #[test]
    fn anonymous_admin_posts_are_ignored() {
        let anonymous = json!({
            "id": 1_087_968_824,
            "is_bot": true,
            "first_name": "Group",
            "username": "GroupAnonymousBot",
        });
        let body = with(
            text(4, group(), anonymous, "rules updated"),
            json!({ "sender_chat": group() }),
        );
        assert!(convert(update("message", body), ME).is_none());
    }

    #[test]
    fn channel_sender_is_kept_as_a_channel() {
        let body = with(
            text(5, group(), user(136_817_688, "Channel"), "cheap deals"),
            json!({ "sender_chat": channel() }),
        );

        let Some(Event::Message(msg)) = convert(update("message", body), ME) else {
            panic!("expected a message");
        };
        assert_eq!(
            msg.sender,
            Sender::Channel {
                id: ChatId(-100_777),
                title: "Deals".to_string(),
            }
        );
    }

    #[test]
    fn new_members_become_a_join_with_its_message() {
        let body = with(
            message(10, group(), user(5, "Ann")),
            json!({ "new_chat_members": [user(5, "Ann"), bot_user(50)] }),
        );

        let Some(Event::Joined(join)) = convert(update("message", body), ME) else {
            panic!("expected a join");
        };
        assert_eq!(join.message, Some(MessageId(10)));
        assert_eq!(join.members.len(), 1);
        assert_eq!(join.members[0].id, UserId(5));
        assert_eq!(join.members[0].name, "Ann");

        let body = with(
            message(11, group(), user(5, "Ann")),
            json!({ "new_chat_members": [bot_user(50)] }),
        );
        assert!(convert(update("message", body), ME).is_none());
    }

    #[test]
    fn member_update_join_has_no_message() {
        let body = member_change(
            user(5, "Ann"),
            user(5, "Ann"),
            "left",
            json!({ "user": user(5, "Ann"), "status": "member" }),
        );

        let Some(Event::Joined(join)) = convert(update("chat_member", body), ME) else {
            panic!("expected a join");
        };
        assert_eq!(join.chat.id, ChatId(GROUP));
        assert_eq!(join.message, None);
        assert_eq!(join.members[0].id, UserId(5));
    }

    #[test]
    fn bans_by_others_are_reported_but_not_our_own() {
        let kicked = json!({ "user": user(5, "Ann"), "status": "kicked", "until_date": 0 });

        let body = member_change(user(77, "Mod"), user(5, "Ann"), "member", kicked.clone());
        let Some(Event::Restricted(change)) = convert(update("chat_member", body), ME) else {
            panic!("expected a restriction");
        };
        assert_eq!(change.user.id, UserId(5));
        assert_eq!(change.by.id, UserId(77));
        assert!(change.banned);

        let body = member_change(bot_user(ME.0), user(5, "Ann"), "member", kicked);
        assert!(convert(update("chat_member", body), ME).is_none());
    }

    #[test]
    fn button_press_keeps_query_and_message() {
        let body = json!({
            "id": "4242",
            "from": user(5, "Ann"),
            "chat_instance": "x",
            "data": "cap:5:3",
            "message": text(12, group(), bot_user(ME.0), "pick one"),
        });

        let Some(Event::Press(press)) = convert(update("callback_query", body), ME) else {
            panic!("expected a press");
        };
        assert_eq!(press.query_id, "4242");
        assert_eq!(press.from.id, UserId(5));
        assert_eq!(press.chat.id, ChatId(GROUP));
        assert_eq!(press.message, MessageId(12));
        assert_eq!(press.data, "cap:5:3");
    }
}
