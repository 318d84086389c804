//! Handles navigation button presses.
//!
//! Every callback query is acknowledged exactly once, whatever happens to it,
//! so the client never keeps spinning. Only "session expired" is shown to the
//! user; everything else is logged and counted.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    domain::MessageRef,
    errors::Error,
    messaging::{port::MessagingPort, types::CallbackQuery},
    pagination::{nav_keyboard, render_page, CallbackData, Navigation, PageAction},
    stats::Stats,
    store::SessionStore,
};

pub const EXPIRED_TEXT: &str = "Session expired, please regenerate.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message now shows `page` (0-based).
    Moved { page: usize },
    /// Edge press; nothing to edit.
    Unchanged,
    /// Page indicator press, answered with the position label.
    Position(String),
    Expired,
    Malformed,
    /// Not pager data.
    Ignored,
    /// Storage or edit failure.
    Failed,
}

pub struct CallbackDispatcher {
    store: Arc<SessionStore>,
    messenger: Arc<dyn MessagingPort>,
    stats: Arc<Stats>,
}

impl CallbackDispatcher {
    pub fn new(
        store: Arc<SessionStore>,
        messenger: Arc<dyn MessagingPort>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            store,
            messenger,
            stats,
        }
    }

    pub async fn dispatch(&self, q: &CallbackQuery) -> DispatchOutcome {
        self.stats.record_callback();

        let (outcome, reply) = self.handle(q).await;
        self.ack(&q.callback_id, reply.as_deref()).await;
        outcome
    }

    async fn handle(&self, q: &CallbackQuery) -> (DispatchOutcome, Option<String>) {
        let Some(raw) = q.data.as_deref().filter(|d| CallbackData::is_pager_data(d)) else {
            debug!(callback = %q.callback_id, "ignoring non-pager callback");
            return (DispatchOutcome::Ignored, None);
        };

        let data = match CallbackData::parse(raw) {
            Ok(d) => d,
            Err(e) => return self.malformed(q, &e),
        };
        if let Some(origin) = q.message {
            if origin != data.message {
                let e = Error::MalformedPayload(format!(
                    "callback data targets {} but was pressed on {origin}",
                    data.message
                ));
                return self.malformed(q, &e);
            }
        }

        let (chat_id, message_id) = (data.message.chat_id, data.message.message_id);
        match data.action {
            PageAction::Noop => match self.store.get(chat_id, message_id).await {
                Ok(session) => {
                    let label = session.position_label();
                    (DispatchOutcome::Position(label.clone()), Some(label))
                }
                Err(Error::NotFound) => self.expired(&data),
                Err(e) => self.storage_failed(&data, &e),
            },
            PageAction::Navigate(nav) => self.navigate(&data, nav).await,
        }
    }

    async fn navigate(
        &self,
        data: &CallbackData,
        nav: Navigation,
    ) -> (DispatchOutcome, Option<String>) {
        let msg = data.message;
        let turn = match self.store.turn_page(msg.chat_id, msg.message_id, nav).await {
            Ok(Some(turn)) => turn,
            Ok(None) => return self.expired(data),
            Err(e) => return self.storage_failed(data, &e),
        };

        if !turn.changed() {
            return (DispatchOutcome::Unchanged, None);
        }

        let session = &turn.session;
        let keyboard = nav_keyboard(session);
        if let Err(e) = self
            .messenger
            .edit_html(msg, &render_page(session), Some(&keyboard))
            .await
        {
            self.stats.record_error();
            warn!(message = %msg, page = session.current_page, error = %e, "failed to edit paginated message");
            self.revert(msg, session.current_page, turn.previous_page).await;
            return (DispatchOutcome::Failed, None);
        }

        debug!(
            message = %msg,
            from = turn.previous_page,
            to = session.current_page,
            "page turned"
        );
        (
            DispatchOutcome::Moved {
                page: session.current_page,
            },
            None,
        )
    }

    /// Put the stored page back to what the chat still shows.
    async fn revert(&self, msg: MessageRef, shown: usize, previous: usize) {
        match self
            .store
            .revert_page(msg.chat_id, msg.message_id, shown, previous)
            .await
        {
            Ok(true) => debug!(message = %msg, page = previous, "page turn rolled back"),
            Ok(false) => debug!(message = %msg, "page moved on; rollback skipped"),
            Err(e) => {
                self.stats.record_storage_error();
                warn!(message = %msg, error = %e, "failed to roll back page turn");
            }
        }
    }

    fn malformed(&self, q: &CallbackQuery, e: &Error) -> (DispatchOutcome, Option<String>) {
        self.stats.record_malformed();
        warn!(callback = %q.callback_id, user = q.user_id, error = %e, "discarding malformed callback");
        (DispatchOutcome::Malformed, None)
    }

    fn expired(&self, data: &CallbackData) -> (DispatchOutcome, Option<String>) {
        self.stats.record_expired();
        debug!(message = %data.message, "pagination session expired");
        (DispatchOutcome::Expired, Some(EXPIRED_TEXT.to_string()))
    }

    fn storage_failed(&self, data: &CallbackData, e: &Error) -> (DispatchOutcome, Option<String>) {
        self.stats.record_storage_error();
        self.stats.record_error();
        warn!(message = %data.message, error = %e, "session store failure");
        (DispatchOutcome::Failed, None)
    }

    async fn ack(&self, callback_id: &str, text: Option<&str>) {
        if let Err(e) = self.messenger.answer_callback_query(callback_id, text).await {
            self.stats.record_error();
            warn!(callback = %callback_id, error = %e, "failed to answer callback query");
        }
    }
}
