//! Conversion of teloxide updates into core `IncomingUpdate`s.

use teloxide::types::{Update, UpdateKind as TgUpdateKind};

use pager_core::{
    domain::{ChatId, MessageId, MessageRef, UpdateId},
    messaging::types::{CallbackQuery, IncomingUpdate, UpdateKind},
};

pub fn to_incoming(update: Update) -> IncomingUpdate {
    let kind = match update.kind {
        TgUpdateKind::CallbackQuery(q) => UpdateKind::Callback(CallbackQuery {
            callback_id: q.id,
            user_id: i64::try_from(q.from.id.0).unwrap_or(i64::MAX),
            data: q.data,
            // Inline-mode messages carry no chat; the callback data still names the target.
            message: q
                .message
                .map(|m| MessageRef::new(ChatId(m.chat.id.0), MessageId(m.id.0))),
        }),
        _ => UpdateKind::Other,
    };

    IncomingUpdate {
        id: UpdateId(i64::from(update.id)),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Update {
        // Parse from text as the Bot API client does; teloxide's `Update`
        // deserializer misreads nested messages when fed a `Value` directly.
        serde_json::from_str(&v.to_string()).unwrap()
    }

    #[test]
    fn callback_query_keeps_data_and_origin() {
        let update = parse(json!({
            "update_id": 10,
            "callback_query": {
                "id": "4382bfdwdsb323b2d9",
                "from": { "id": 42, "is_bot": false, "first_name": "Ann" },
                "message": {
                    "message_id": 20,
                    "date": 1_600_000_000,
                    "chat": { "id": -100123, "type": "supergroup", "title": "Team" },
                    "from": { "id": 7, "is_bot": true, "first_name": "Pager", "username": "pager_bot" },
                    "text": "page 1"
                },
                "chat_instance": "-1",
                "data": "pg:-100123:20:next"
            }
        }));

        let incoming = to_incoming(update);

        assert_eq!(incoming.id, UpdateId(10));
        let q = incoming.callback().unwrap();
        assert_eq!(q.callback_id, "4382bfdwdsb323b2d9");
        assert_eq!(q.user_id, 42);
        assert_eq!(q.data.as_deref(), Some("pg:-100123:20:next"));
        assert_eq!(
            q.message,
            Some(MessageRef::new(ChatId(-100123), MessageId(20)))
        );
    }

    #[test]
    fn plain_messages_are_other() {
        let update = parse(json!({
            "update_id": 11,
            "message": {
                "message_id": 5,
                "date": 1_600_000_000,
                "chat": { "id": 42, "type": "private", "first_name": "Ann" },
                "from": { "id": 42, "is_bot": false, "first_name": "Ann" },
                "text": "hello"
            }
        }));

        let incoming = to_incoming(update);

        assert_eq!(incoming.id, UpdateId(11));
        assert!(incoming.callback().is_none());
    }
}
