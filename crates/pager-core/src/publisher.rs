//! Producer side: turn a long text into a paginated message.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{ChatId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    pagination::{
        nav_keyboard, render_page, split_pages,
        view::{chrome_len, escape_html},
        PaginationSession,
    },
    store::SessionStore,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Published {
    /// Paginated message with navigation controls.
    Paginated { message: MessageRef, pages: usize },
    /// Fit into one message; no session was stored.
    Single(MessageRef),
    /// Pagination disabled: each page went out as its own message.
    Batch(Vec<MessageRef>),
}

pub struct Paginator {
    store: Arc<SessionStore>,
    messenger: Arc<dyn MessagingPort>,
    enabled: bool,
    page_chars: usize,
    max_pages: usize,
}

impl Paginator {
    pub fn new(cfg: &Config, store: Arc<SessionStore>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            store,
            messenger,
            enabled: cfg.pagination_enabled,
            page_chars: cfg.page_chars,
            max_pages: cfg.max_pages,
        }
    }

    pub async fn send_paginated(
        &self,
        chat_id: ChatId,
        text: &str,
        title: Option<&str>,
    ) -> Result<Published> {
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument("nothing to send".to_string()));
        }

        let caps = self.messenger.capabilities();
        let page_chars = self.page_budget(title, caps.max_message_len);
        let pages = split_pages(text, page_chars, self.max_pages);
        let title = title.map(str::to_string);

        if !self.enabled || !caps.supports_edit || !caps.supports_inline_keyboards {
            return self.send_batch(chat_id, &pages, title.as_deref()).await;
        }

        if pages.len() == 1 {
            let html = render_first(chat_id, pages, title, self.store.ttl())?;
            let message = self.messenger.send_html(chat_id, &html).await?;
            return Ok(Published::Single(message));
        }

        let total = pages.len();
        let html = render_first(chat_id, pages.clone(), title.clone(), self.store.ttl())?;
        let message = self.messenger.send_html(chat_id, &html).await?;

        self.store
            .save(chat_id, message.message_id, pages, 0, title)
            .await?;
        let session = self.store.get(chat_id, message.message_id).await?;

        if let Err(e) = self
            .messenger
            .edit_html(message, &render_page(&session), Some(&nav_keyboard(&session)))
            .await
        {
            // Without controls the session is unreachable.
            warn!(message = %message, error = %e, "failed to attach navigation, dropping session");
            if let Err(e) = self.store.delete(chat_id, message.message_id).await {
                warn!(message = %message, error = %e, "failed to delete orphaned session");
            }
            return Err(e);
        }

        info!(message = %message, pages = total, "paginated message sent");
        Ok(Published::Paginated {
            message,
            pages: total,
        })
    }

    /// Page size that keeps title, text and footer within `max_message_len`.
    fn page_budget(&self, title: Option<&str>, max_message_len: usize) -> usize {
        let budget = max_message_len
            .saturating_sub(chrome_len(title))
            .min(self.page_chars)
            .max(1);
        if budget < self.page_chars {
            debug!(configured = self.page_chars, budget, "page size reduced to fit the message limit");
        }
        budget
    }

    async fn send_batch(
        &self,
        chat_id: ChatId,
        pages: &[String],
        title: Option<&str>,
    ) -> Result<Published> {
        let total = pages.len();
        let mut sent = Vec::with_capacity(total);
        for (i, page) in pages.iter().enumerate() {
            let mut html = String::new();
            if let Some(t) = title.filter(|t| !t.trim().is_empty()) {
                html.push_str(&format!("<b>{}</b>", escape_html(t)));
                if total > 1 {
                    html.push_str(&format!(" ({}/{total})", i + 1));
                }
                html.push_str("\n\n");
            }
            html.push_str(&escape_html(page));
            sent.push(self.messenger.send_html(chat_id, &html).await?);
        }
        Ok(Published::Batch(sent))
    }
}

/// Page 1 rendered before the message id is known.
fn render_first(
    chat_id: ChatId,
    pages: Vec<String>,
    title: Option<String>,
    ttl: std::time::Duration,
) -> Result<String> {
    let placeholder = MessageRef::new(chat_id, crate::domain::MessageId(0));
    let session = PaginationSession::new(placeholder, pages, 0, title, chrono::Utc::now(), ttl)?;
    Ok(render_page(&session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messaging::types::MessagingCapabilities,
        pagination::view::{FOOTER_RESERVE, NEXT_LABEL},
        store::{KvBackend, MemoryBackend},
        testing::FakeMessenger,
    };

    struct Harness {
        backend: Arc<MemoryBackend>,
        store: Arc<SessionStore>,
        fake: Arc<FakeMessenger>,
        paginator: Paginator,
    }

    fn harness(enabled: bool) -> Harness {
        harness_with(enabled, 10)
    }

    fn harness_with(enabled: bool, page_chars: usize) -> Harness {
        let mut cfg = Config::with_token("123:abc");
        cfg.pagination_enabled = enabled;
        cfg.page_chars = page_chars;
        cfg.max_pages = 5;
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(SessionStore::from_config(&cfg, backend.clone()));
        let fake = Arc::new(FakeMessenger::default());
        let paginator = Paginator::new(&cfg, store.clone(), fake.clone());
        Harness {
            backend,
            store,
            fake,
            paginator,
        }
    }

    #[tokio::test]
    async fn long_text_gets_a_session_and_controls() {
        let h = harness(true);

        let out = h
            .paginator
            .send_paginated(ChatId(7), "aaaa\nbbbb\ncccc", Some("Report"))
            .await
            .unwrap();

        let Published::Paginated { message, pages } = out else {
            panic!("expected a paginated message, got {out:?}");
        };
        assert_eq!(pages, 2);
        assert_eq!(h.fake.sent_html(), vec!["<b>Report</b>\n\naaaa\nbbbb\n\n📄 1/2"]);

        let edits = h.fake.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].msg, message);
        let kb = edits[0].keyboard.clone().unwrap();
        let labels: Vec<_> = kb.buttons().map(|b| b.label.clone()).collect();
        assert_eq!(labels, vec!["1/2", NEXT_LABEL]);

        let session = h.store.get(ChatId(7), message.message_id).await.unwrap();
        assert_eq!(session.pages, vec!["aaaa\nbbbb", "cccc"]);
        assert_eq!(session.title.as_deref(), Some("Report"));
    }

    #[tokio::test]
    async fn short_text_is_sent_plainly() {
        let h = harness(true);

        let out = h
            .paginator
            .send_paginated(ChatId(7), "hi <there>", None)
            .await
            .unwrap();

        assert!(matches!(out, Published::Single(_)));
        assert_eq!(h.fake.sent_html(), vec!["hi &lt;there&gt;"]);
        assert!(h.fake.edits().is_empty());
        assert!(h.backend.is_empty().await);
    }

    #[tokio::test]
    async fn disabled_pagination_sends_every_page() {
        let h = harness(false);

        let out = h
            .paginator
            .send_paginated(ChatId(7), "aaaa\nbbbb\ncccc", Some("R"))
            .await
            .unwrap();

        let Published::Batch(sent) = out else {
            panic!("expected a batch, got {out:?}");
        };
        assert_eq!(sent.len(), 2);
        assert_eq!(
            h.fake.sent_html(),
            vec!["<b>R</b> (1/2)\n\naaaa\nbbbb", "<b>R</b> (2/2)\n\ncccc"]
        );
        assert!(h.backend.is_empty().await);
    }

    #[tokio::test]
    async fn failed_keyboard_attach_drops_the_session() {
        let h = harness(true);
        h.fake
            .fail_next_edits(1, || Error::Platform("message can't be edited".into()));

        let err = h
            .paginator
            .send_paginated(ChatId(7), "aaaa\nbbbb\ncccc", None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Platform(_)));
        assert!(h.backend.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let h = harness(true);
        assert!(matches!(
            h.paginator.send_paginated(ChatId(7), "  \n ", None).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(h.fake.sent_html().is_empty());
    }

    #[tokio::test]
    async fn pages_shrink_to_leave_room_for_title_and_footer() {
        let h = harness_with(true, 100);
        h.fake.set_capabilities(MessagingCapabilities {
            max_message_len: 40,
            ..MessagingCapabilities::default()
        });
        let text = "x".repeat(60);

        let out = h
            .paginator
            .send_paginated(ChatId(7), &text, Some("Report"))
            .await
            .unwrap();

        let Published::Paginated { message, pages } = out else {
            panic!("expected a paginated message, got {out:?}");
        };
        let budget = 40 - ("Report".len() + 2 + FOOTER_RESERVE);
        assert_eq!(budget, 16);
        assert_eq!(pages, 4);
        let session = h.store.get(ChatId(7), message.message_id).await.unwrap();
        assert!(session.pages.iter().all(|p| p.chars().count() <= budget));
        for edit in h.fake.edits() {
            let visible = edit.html.replace("<b>", "").replace("</b>", "");
            assert!(visible.chars().count() <= 40, "{visible:?} is over the limit");
        }
    }

    #[tokio::test]
    async fn messenger_without_edits_gets_separate_messages() {
        let h = harness(true);
        h.fake.set_capabilities(MessagingCapabilities {
            supports_edit: false,
            ..MessagingCapabilities::default()
        });

        let out = h
            .paginator
            .send_paginated(ChatId(7), "aaaa\nbbbb\ncccc", None)
            .await
            .unwrap();

        assert!(matches!(out, Published::Batch(ref sent) if sent.len() == 2));
        assert!(h.fake.edits().is_empty());
        assert!(h.backend.is_empty().await);
    }

    #[tokio::test]
    async fn failed_first_send_stores_nothing() {
        let h = harness(true);
        h.fake
            .fail_next_sends(1, || Error::Transport("connection reset".into()));

        let err = h
            .paginator
            .send_paginated(ChatId(7), "aaaa\nbbbb\ncccc", None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(h.fake.edits().is_empty());
        assert!(h.backend.is_empty().await);
    }
}
