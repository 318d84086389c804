//! Outbound pacing: one global spacing for every call plus a per-chat spacing
//! for sends and edits.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum gap between any two outbound calls.
    pub global_spacing: Duration,
    /// Minimum gap between two sends or edits in the same chat.
    pub per_chat_spacing: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_spacing: Duration::from_millis(40),
            per_chat_spacing: Duration::from_millis(250),
        }
    }
}

/// Next free slot, globally and per chat. Chats whose slot is already in the
/// past are forgotten, so the map only holds chats with a pending spacing.
#[derive(Debug)]
struct Schedule {
    global: Instant,
    chats: HashMap<ChatId, Instant>,
}

/// [`MessagingPort`] decorator that spaces out outbound calls.
///
/// A caller reserves its slot and sleeps outside the lock, so calls keep their
/// reservation order without blocking each other while waiting.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    schedule: Mutex<Schedule>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            schedule: Mutex::new(Schedule {
                global: Instant::now(),
                chats: HashMap::new(),
            }),
        }
    }

    /// Claim the earliest slot for a call and return how long to wait for it.
    fn reserve(&self, chat: Option<ChatId>) -> Duration {
        let now = Instant::now();
        let mut s = self.schedule.lock().unwrap_or_else(PoisonError::into_inner);
        s.chats.retain(|_, next| *next > now);

        let chat_next = chat.and_then(|c| s.chats.get(&c).copied());
        let start = [Some(now), Some(s.global), chat_next]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(now);

        s.global = start + self.cfg.global_spacing;
        if let Some(chat) = chat {
            s.chats.insert(chat, start + self.cfg.per_chat_spacing);
        }
        start - now
    }

    async fn pace(&self, chat: Option<ChatId>) {
        let wait = self.reserve(chat);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    #[cfg(test)]
    fn tracked_chats(&self) -> usize {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .chats
            .len()
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        self.pace(Some(msg.chat_id)).await;
        self.inner.edit_html(msg, html, keyboard).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // Answers carry no chat.
        self.pace(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}
