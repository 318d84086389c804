use crate::domain::{MessageRef, UpdateId};

/// Platform update as seen by the polling loop.
///
/// Telegram-specific fields live in the Telegram adapter; only what the
/// dispatcher needs crosses the port.
#[derive(Clone, Debug)]
pub struct IncomingUpdate {
    pub id: UpdateId,
    pub kind: UpdateKind,
}

#[derive(Clone, Debug)]
pub enum UpdateKind {
    Callback(CallbackQuery),
    /// Anything we do not handle (messages, edits, member updates...).
    Other,
}

impl IncomingUpdate {
    pub fn callback(&self) -> Option<&CallbackQuery> {
        match &self.kind {
            UpdateKind::Callback(q) => Some(q),
            UpdateKind::Other => None,
        }
    }
}

/// Inline button press relayed by the platform.
#[derive(Clone, Debug)]
pub struct CallbackQuery {
    /// Acknowledgment token; must be answered so the client clears its spinner.
    pub callback_id: String,
    pub user_id: i64,
    pub data: Option<String>,
    /// The message carrying the keyboard, when the platform reports it.
    pub message: Option<MessageRef>,
}

/// Inline keyboard laid out in rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for a single row of buttons.
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }
}

/// Bot API limit on message text after entity parsing, in characters.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// What a messenger can do. The producer sizes pages to `max_message_len` and
/// falls back to separate messages when edits or keyboards are unavailable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}

impl Default for MessagingCapabilities {
    fn default() -> Self {
        Self {
            supports_edit: true,
            supports_inline_keyboards: true,
            max_message_len: TELEGRAM_MAX_MESSAGE_LEN,
        }
    }
}
