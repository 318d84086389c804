//! Callback data carried by navigation buttons.
//!
//! Format: `pg:{chat_id}:{message_id}:{action}` where action is `next`, `prev`,
//! `noop` or a 0-based target page. Telegram caps callback data at 64 bytes;
//! the longest form (`pg:-1001234567890:2147483647:next`) stays well below.

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    pagination::session::Navigation,
    Result,
};

const PREFIX: &str = "pg";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageAction {
    Navigate(Navigation),
    /// The page indicator button; answering it changes nothing.
    Noop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackData {
    pub message: MessageRef,
    pub action: PageAction,
}

impl CallbackData {
    pub fn new(message: MessageRef, action: PageAction) -> Self {
        Self { message, action }
    }

    /// Whether `raw` belongs to the pager at all (other bots' buttons are ignored).
    pub fn is_pager_data(raw: &str) -> bool {
        raw.split(':').next() == Some(PREFIX)
    }

    pub fn encode(&self) -> String {
        let action = match self.action {
            PageAction::Navigate(Navigation::Next) => "next".to_string(),
            PageAction::Navigate(Navigation::Previous) => "prev".to_string(),
            PageAction::Navigate(Navigation::Goto(page)) => page.to_string(),
            PageAction::Noop => "noop".to_string(),
        };
        format!(
            "{PREFIX}:{}:{}:{action}",
            self.message.chat_id.0, self.message.message_id.0
        )
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || Error::MalformedPayload(format!("bad callback data {raw:?}"));

        let mut parts = raw.split(':');
        if parts.next() != Some(PREFIX) {
            return Err(malformed());
        }
        let chat_id = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(malformed)?;
        let message_id = parts
            .next()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(malformed)?;
        let action = match parts.next().ok_or_else(malformed)? {
            "next" => PageAction::Navigate(Navigation::Next),
            "prev" => PageAction::Navigate(Navigation::Previous),
            "noop" => PageAction::Noop,
            other => other
                .parse::<usize>()
                .map(|p| PageAction::Navigate(Navigation::Goto(p)))
                .map_err(|_| malformed())?,
        };
        if parts.next().is_some() {
            return Err(malformed());
        }

        Ok(Self {
            message: MessageRef::new(ChatId(chat_id), MessageId(message_id)),
            action,
        })
    }
}
