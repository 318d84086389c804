use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

const RETRY_DELAY: Duration = Duration::from_millis(300);

/// MessagingPort decorator giving every outbound call a short timeout and a
/// bounded number of attempts.
///
/// Only `Error::Transport` (including timeouts) is retried; platform
/// rejections are returned on the first attempt.
pub struct RetryingMessenger {
    inner: Arc<dyn MessagingPort>,
    call_timeout: Duration,
    max_attempts: u32,
}

impl RetryingMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, call_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            inner,
            call_timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn attempt<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt = 1u32;
        loop {
            let res = match timeout(self.call_timeout, op()).await {
                Ok(res) => res,
                Err(_) => Err(Error::Transport(format!(
                    "{what} timed out after {:?}",
                    self.call_timeout
                ))),
            };

            match res {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(%what, attempt, error = %e, "outbound call failed, retrying");
                    attempt += 1;
                    sleep(RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for RetryingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.attempt("send_message", move || self.inner.send_html(chat_id, html))
            .await
    }

    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        self.attempt("edit_message", move || self.inner.edit_html(msg, html, keyboard))
            .await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.attempt("answer_callback_query", move || {
            self.inner.answer_callback_query(callback_id, text)
        })
        .await
    }
}
