//! Telegram adapter (teloxide).
//!
//! This crate implements the `pager-core` MessagingPort and UpdateSource over
//! the Telegram Bot API.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{AllowedUpdate, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;
use tracing::warn;

pub mod bot;
pub mod updates;

use pager_core::{
    domain::{ChatId, MessageId, MessageRef, UpdateId},
    errors::Error,
    messaging::{
        port::{MessagingPort, UpdateSource},
        types::{IncomingUpdate, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    /// Network-level failures are worth repeating; anything the API answered is not.
    fn map_err(e: RequestError) -> Error {
        match e {
            RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_) => {
                Error::Transport(format!("telegram: {e}"))
            }
            other => Error::Platform(format!("telegram: {other}")),
        }
    }

    /// Run `op`, sleeping through one flood-control `RetryAfter`.
    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!(retry_after = ?d, "telegram flood control, waiting");
                    sleep(d).await;
                }
                res => return res,
            }
        }
    }
}

/// Core keyboard to Telegram markup, row by row.
pub fn to_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .filter(|row| !row.is_empty())
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities::default()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef::new(chat_id, MessageId(msg.id.0)))
    }

    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let markup = keyboard.filter(|kb| !kb.is_empty()).map(to_markup);
        let res = self
            .with_retry(|| {
                let req = self
                    .bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        html.to_string(),
                    )
                    .parse_mode(ParseMode::Html);
                match markup.clone() {
                    Some(m) => req.reply_markup(m),
                    None => req,
                }
            })
            .await;

        match res {
            Ok(_) => Ok(()),
            // Same text and markup as before; the message already shows what we want.
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await
        .map_err(Self::map_err)?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramMessenger {
    async fn identify(&self) -> Result<String> {
        let me = self
            .with_retry(|| self.bot.get_me())
            .await
            .map_err(Self::map_err)?;
        Ok(me.username().to_string())
    }

    async fn fetch_updates(
        &self,
        offset: UpdateId,
        timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>> {
        let offset = i32::try_from(offset.0)
            .map_err(|_| Error::InvalidArgument(format!("update offset {} out of range", offset.0)))?;
        let timeout = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);

        let batch = self
            .with_retry(|| {
                self.bot
                    .get_updates()
                    .offset(offset)
                    .timeout(timeout)
                    .allowed_updates(vec![AllowedUpdate::CallbackQuery])
            })
            .await
            .map_err(Self::map_err)?;

        Ok(batch.into_iter().map(updates::to_incoming).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pager_core::messaging::types::InlineButton;

    #[test]
    fn markup_keeps_rows_and_drops_empty_ones() {
        let button = |label: &str, data: &str| InlineButton {
            label: label.to_string(),
            callback_data: data.to_string(),
        };
        let kb = InlineKeyboard::new(vec![
            vec![button("1/2", "pg:1:2:noop"), button("Next", "pg:1:2:next")],
            vec![],
        ]);

        let markup = to_markup(&kb);

        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[0][1].text, "Next");
    }

    #[test]
    fn api_answers_are_not_retryable() {
        let err = TelegramMessenger::map_err(RequestError::Api(ApiError::MessageToEditNotFound));
        assert!(matches!(err, Error::Platform(_)));
        assert!(!err.is_retryable());

        let err = TelegramMessenger::map_err(RequestError::RetryAfter(Duration::from_secs(3)));
        assert!(err.is_retryable());
    }
}
