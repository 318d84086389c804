use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    Result,
};

/// Persisted paging state of one paginated message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSession {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub pages: Vec<String>,
    pub current_page: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl PaginationSession {
    pub fn new(
        msg: MessageRef,
        pages: Vec<String>,
        current_page: usize,
        title: Option<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self> {
        if pages.is_empty() {
            return Err(Error::InvalidArgument(
                "a pagination session needs at least one page".to_string(),
            ));
        }
        if current_page >= pages.len() {
            return Err(Error::InvalidArgument(format!(
                "current page {current_page} out of bounds for {} pages",
                pages.len()
            )));
        }
        Ok(Self {
            chat_id: msg.chat_id,
            message_id: msg.message_id,
            pages,
            current_page,
            title,
            created_at,
            ttl_secs: ttl.as_secs(),
        })
    }

    pub fn message(&self) -> MessageRef {
        MessageRef::new(self.chat_id, self.message_id)
    }

    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn last_page(&self) -> usize {
        self.pages.len().saturating_sub(1)
    }

    pub fn current_text(&self) -> &str {
        self.pages
            .get(self.current_page)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Expired once strictly more than `ttl` has elapsed since creation.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(self.ttl()) else {
            return false;
        };
        now.signed_duration_since(self.created_at) > ttl
    }

    /// 1-based "current/total" label shown to users.
    pub fn position_label(&self) -> String {
        format!("{}/{}", self.current_page + 1, self.total_pages())
    }

    /// Page reached by `nav`, clamped to the valid range.
    pub fn target_page(&self, nav: Navigation) -> usize {
        let last = self.last_page();
        match nav {
            Navigation::Next => (self.current_page + 1).min(last),
            Navigation::Previous => self.current_page.saturating_sub(1),
            Navigation::Goto(page) => page.min(last),
        }
    }
}

/// A navigation request against a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    Goto(usize),
}

/// Result of an atomic page turn.
#[derive(Clone, Debug)]
pub struct PageTurn {
    pub previous_page: usize,
    /// Session state after the turn.
    pub session: PaginationSession,
}

impl PageTurn {
    pub fn changed(&self) -> bool {
        self.previous_page != self.session.current_page
    }
}
