//! Hand-written fakes for the messaging ports, shared by unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UpdateId},
    errors::Error,
    messaging::{
        port::{MessagingPort, UpdateSource},
        types::{
            CallbackQuery, IncomingUpdate, InlineKeyboard, MessagingCapabilities, UpdateKind,
        },
    },
    Result,
};

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

#[derive(Clone, Debug)]
pub struct EditRecord {
    pub msg: MessageRef,
    pub html: String,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
struct FailPlan {
    remaining: usize,
    make: Option<ErrorFactory>,
}

impl FailPlan {
    fn take(&mut self) -> Option<Error> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.make.as_ref().map(|f| f())
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    delay: Mutex<Duration>,
    capabilities: Mutex<MessagingCapabilities>,
    sends: Mutex<Vec<(ChatId, String)>>,
    edits: Mutex<Vec<EditRecord>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    edit_attempts: AtomicUsize,
    send_failures: Mutex<FailPlan>,
    edit_failures: Mutex<FailPlan>,
    answer_failures: Mutex<FailPlan>,
}

impl FakeMessenger {
    pub fn sent_html(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, html)| html.clone())
            .collect()
    }

    pub fn edits(&self) -> Vec<EditRecord> {
        self.edits.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().unwrap().clone()
    }

    pub fn edit_attempts(&self) -> usize {
        self.edit_attempts.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_capabilities(&self, caps: MessagingCapabilities) {
        *self.capabilities.lock().unwrap() = caps;
    }

    pub fn fail_next_sends(&self, n: usize, make: impl Fn() -> Error + Send + Sync + 'static) {
        *self.send_failures.lock().unwrap() = FailPlan {
            remaining: n,
            make: Some(Box::new(make)),
        };
    }

    pub fn fail_next_edits(&self, n: usize, make: impl Fn() -> Error + Send + Sync + 'static) {
        *self.edit_failures.lock().unwrap() = FailPlan {
            remaining: n,
            make: Some(Box::new(make)),
        };
    }

    pub fn fail_next_answers(&self, n: usize, make: impl Fn() -> Error + Send + Sync + 'static) {
        *self.answer_failures.lock().unwrap() = FailPlan {
            remaining: n,
            make: Some(Box::new(make)),
        };
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef::new(chat_id, MessageId(100 + *guard))
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        *self.capabilities.lock().unwrap()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pause().await;
        if let Some(e) = self.send_failures.lock().unwrap().take() {
            return Err(e);
        }
        self.sends
            .lock()
            .unwrap()
            .push((chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        self.edit_attempts.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(e) = self.edit_failures.lock().unwrap().take() {
            return Err(e);
        }
        self.edits.lock().unwrap().push(EditRecord {
            msg,
            html: html.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.pause().await;
        if let Some(e) = self.answer_failures.lock().unwrap().take() {
            return Err(e);
        }
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

/// Scripted update source. Each `fetch_updates` call pops the next scripted
/// result; once the script runs dry it cancels `on_exhausted` (if set) and
/// behaves like an idle long poll.
#[derive(Default)]
pub struct FakeSource {
    script: Mutex<VecDeque<Result<Vec<IncomingUpdate>>>>,
    offsets: Mutex<Vec<i64>>,
    fetched_at: Mutex<Vec<Instant>>,
    panic_on_exhausted: AtomicBool,
    identify_error: Mutex<Option<Error>>,
    on_exhausted: Mutex<Option<CancellationToken>>,
}

impl FakeSource {
    pub fn push_batch(&self, batch: Vec<IncomingUpdate>) {
        self.script.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_error(&self, e: Error) {
        self.script.lock().unwrap().push_back(Err(e));
    }

    pub fn fail_identify(&self, e: Error) {
        *self.identify_error.lock().unwrap() = Some(e);
    }

    pub fn cancel_when_exhausted(&self, token: CancellationToken) {
        *self.on_exhausted.lock().unwrap() = Some(token);
    }

    /// Panic inside the fetch that finds the script empty.
    pub fn panic_when_exhausted(&self) {
        self.panic_on_exhausted.store(true, Ordering::SeqCst);
    }

    /// When each fetch started, on the tokio clock.
    pub fn fetched_at(&self) -> Vec<Instant> {
        self.fetched_at.lock().unwrap().clone()
    }

    /// Offsets passed to every fetch, in call order.
    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateSource for FakeSource {
    async fn identify(&self) -> Result<String> {
        match self.identify_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok("fake_pager_bot".to_string()),
        }
    }

    async fn fetch_updates(
        &self,
        offset: UpdateId,
        timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>> {
        self.offsets.lock().unwrap().push(offset.0);
        self.fetched_at.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(res) => res,
            None => {
                if self.panic_on_exhausted.load(Ordering::SeqCst) {
                    panic!("update source gave out");
                }
                let token = self.on_exhausted.lock().unwrap().clone();
                if let Some(token) = token {
                    token.cancel();
                }
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn callback_update(id: i64, data: &str, msg: Option<MessageRef>) -> IncomingUpdate {
    IncomingUpdate {
        id: UpdateId(id),
        kind: UpdateKind::Callback(CallbackQuery {
            callback_id: format!("cb-{id}"),
            user_id: 42,
            data: Some(data.to_string()),
            message: msg,
        }),
    }
}

pub fn other_update(id: i64) -> IncomingUpdate {
    IncomingUpdate {
        id: UpdateId(id),
        kind: UpdateKind::Other,
    }
}
