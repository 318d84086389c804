//! Pagination session store.
//!
//! Sessions are serialized as JSON records in a pluggable [`KvBackend`]. Every
//! operation on a key runs under that key's lock, so read-modify-write cycles
//! (page turns) never interleave for the same message.
//!
//! Expiry is lazy: an expired record reads as absent. [`SessionStore::sweep_expired`]
//! removes such records from the backend; the daemon runs it periodically.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::{
    config::Config,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    pagination::{Navigation, PageTurn, PaginationSession},
    Result,
};

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Byte-record storage used by [`SessionStore`].
///
/// `store` must create or overwrite atomically; `remove` must succeed when the
/// key is absent.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Source of "now" for expiry decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type LockMap = Arc<StdMutex<HashMap<MessageRef, Arc<Mutex<()>>>>>;

/// Per-message async locks. An entry lives only while some caller holds or
/// waits on it; the last [`KeyGuard`] to drop removes it.
#[derive(Default)]
struct KeyLocks {
    map: LockMap,
}

impl KeyLocks {
    async fn lock(&self, key: MessageRef) -> KeyGuard {
        let lock = {
            let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            key,
            map: self.map.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct KeyGuard {
    key: MessageRef,
    map: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters clone the Arc under the map lock, so a count of one means
        // only the map still refers to this entry.
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if map
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.key);
        }
    }
}

pub struct SessionStore {
    backend: Arc<dyn KvBackend>,
    locks: KeyLocks,
    ttl: Duration,
    max_pages: usize,
    clock: Clock,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KvBackend>, ttl: Duration, max_pages: usize) -> Self {
        Self {
            backend,
            locks: KeyLocks::default(),
            ttl,
            max_pages: max_pages.max(1),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn from_config(cfg: &Config, backend: Arc<dyn KvBackend>) -> Self {
        Self::new(backend, cfg.session_ttl, cfg.max_pages)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create or overwrite the session for a message.
    pub async fn save(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        pages: Vec<String>,
        current_page: usize,
        title: Option<String>,
    ) -> Result<()> {
        if pages.len() > self.max_pages {
            return Err(Error::InvalidArgument(format!(
                "{} pages exceeds the limit of {}",
                pages.len(),
                self.max_pages
            )));
        }

        let msg = MessageRef::new(chat_id, message_id);
        let session =
            PaginationSession::new(msg, pages, current_page, title, (self.clock)(), self.ttl)?;

        let _guard = self.locks.lock(msg).await;
        self.write(&session).await?;
        debug!(message = %msg, pages = session.total_pages(), "pagination session saved");
        Ok(())
    }

    /// Live session for a message; `Error::NotFound` when absent or expired.
    pub async fn get(&self, chat_id: ChatId, message_id: MessageId) -> Result<PaginationSession> {
        let msg = MessageRef::new(chat_id, message_id);
        let _guard = self.locks.lock(msg).await;
        self.read_live(msg).await?.ok_or(Error::NotFound)
    }

    /// Set the current page. `false` (and no mutation) when the session is
    /// absent/expired or `new_page` is out of range.
    pub async fn update_current_page(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        new_page: usize,
    ) -> Result<bool> {
        let msg = MessageRef::new(chat_id, message_id);
        let _guard = self.locks.lock(msg).await;

        let Some(mut session) = self.read_live(msg).await? else {
            return Ok(false);
        };
        if new_page >= session.total_pages() {
            return Ok(false);
        }
        session.current_page = new_page;
        self.write(&session).await?;
        Ok(true)
    }

    /// Read, clamp and write the page reached by `nav` as one step.
    ///
    /// `None` when the session is absent or expired. Pressing past an edge
    /// yields an unchanged turn without touching the backend.
    pub async fn turn_page(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        nav: Navigation,
    ) -> Result<Option<PageTurn>> {
        let msg = MessageRef::new(chat_id, message_id);
        let _guard = self.locks.lock(msg).await;

        let Some(mut session) = self.read_live(msg).await? else {
            return Ok(None);
        };
        let previous_page = session.current_page;
        let target = session.target_page(nav);
        if target != previous_page {
            session.current_page = target;
            self.write(&session).await?;
        }
        Ok(Some(PageTurn {
            previous_page,
            session,
        }))
    }

    /// Move the session back from `expected` to `previous` after a turn whose
    /// edit did not reach the chat. Does nothing (and returns `false`) when
    /// the page has since moved on, the session is gone, or `previous` is out
    /// of range.
    pub async fn revert_page(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        expected: usize,
        previous: usize,
    ) -> Result<bool> {
        let msg = MessageRef::new(chat_id, message_id);
        let _guard = self.locks.lock(msg).await;

        let Some(mut session) = self.read_live(msg).await? else {
            return Ok(false);
        };
        if session.current_page != expected || previous >= session.total_pages() {
            return Ok(false);
        }
        session.current_page = previous;
        self.write(&session).await?;
        Ok(true)
    }

    /// Remove a session. Succeeds when it does not exist.
    pub async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let msg = MessageRef::new(chat_id, message_id);
        let _guard = self.locks.lock(msg).await;
        self.backend.remove(&record_key(msg)).await
    }

    /// Remove expired and undecodable records. Returns how many were removed.
    ///
    /// Per-record failures are logged and skipped; only a failure to list the
    /// backend is returned.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = (self.clock)();
        let mut removed = 0usize;

        for key in self.backend.keys().await? {
            let Some(msg) = parse_record_key(&key) else {
                continue;
            };
            let _guard = self.locks.lock(msg).await;

            let stale = match self.backend.load(&key).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<PaginationSession>(&bytes) {
                    Ok(session) => session.is_expired_at(now),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(e) => {
                    warn!(key = %key, error = %e, "sweep: failed to read session record");
                    false
                }
            };
            if !stale {
                continue;
            }
            match self.backend.remove(&key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "sweep: failed to remove session record"),
            }
        }

        Ok(removed)
    }

    async fn read_live(&self, msg: MessageRef) -> Result<Option<PaginationSession>> {
        let Some(bytes) = self.backend.load(&record_key(msg)).await? else {
            return Ok(None);
        };
        let session: PaginationSession = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!(message = %msg, error = %e, "undecodable session record treated as absent");
                return Ok(None);
            }
        };
        if session.is_expired_at((self.clock)()) {
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn write(&self, session: &PaginationSession) -> Result<()> {
        let bytes = serde_json::to_vec(session)?;
        self.backend
            .store(&record_key(session.message()), bytes)
            .await
    }
}

fn record_key(msg: MessageRef) -> String {
    format!("{}_{}", msg.chat_id.0, msg.message_id.0)
}

fn parse_record_key(key: &str) -> Option<MessageRef> {
    let (chat, message) = key.rsplit_once('_')?;
    Some(MessageRef::new(
        ChatId(chat.parse().ok()?),
        MessageId(message.parse().ok()?),
    ))
}
