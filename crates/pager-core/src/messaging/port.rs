use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UpdateId},
    messaging::types::{IncomingUpdate, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Outbound side of the messaging platform.
///
/// Every call is a network request that can fail transiently (`Error::Transport`)
/// or be refused by the platform (`Error::Platform`).
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Replace the text of `msg`; `keyboard` replaces (or, when `None`, removes) its controls.
    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Inbound side of the messaging platform (long polling).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Verify credentials and return a display name for the bot.
    async fn identify(&self) -> Result<String>;

    /// Fetch updates with id >= `offset`, holding the request open up to `timeout`.
    async fn fetch_updates(&self, offset: UpdateId, timeout: Duration)
        -> Result<Vec<IncomingUpdate>>;
}
