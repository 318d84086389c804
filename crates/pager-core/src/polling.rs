//! Long-polling loop feeding callback queries to the dispatcher.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    dispatcher::CallbackDispatcher,
    domain::UpdateId,
    messaging::port::UpdateSource,
    stats::Stats,
    Result,
};

/// Exponential backoff: `initial`, doubling per failure, capped at `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much (up to the cap).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PollingOptions {
    pub long_poll_timeout: Duration,
    /// Pause after an empty batch.
    pub idle_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl PollingOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            long_poll_timeout: cfg.long_poll_timeout,
            idle_interval: cfg.polling_interval,
            backoff_initial: cfg.backoff_initial,
            backoff_max: cfg.backoff_max,
        }
    }
}

/// Sole owner of the update cursor.
pub struct PollingLoop {
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<CallbackDispatcher>,
    stats: Arc<Stats>,
    opts: PollingOptions,
    cursor: i64,
    backoff: Backoff,
}

impl PollingLoop {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        dispatcher: Arc<CallbackDispatcher>,
        stats: Arc<Stats>,
        opts: PollingOptions,
    ) -> Self {
        Self {
            source,
            dispatcher,
            stats,
            backoff: Backoff::new(opts.backoff_initial, opts.backoff_max),
            opts,
            cursor: 0,
        }
    }

    /// Next offset to request; every update below it has been handled.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// One fetch + dispatch cycle. Returns the batch size; on error the cursor
    /// is left untouched.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let mut batch = self
            .source
            .fetch_updates(UpdateId(self.cursor), self.opts.long_poll_timeout)
            .await?;
        batch.sort_by_key(|u| u.id);

        let mut max_id = None;
        for update in &batch {
            self.stats.record_update();
            if let Some(q) = update.callback() {
                let outcome = self.dispatcher.dispatch(q).await;
                debug!(update = update.id.0, ?outcome, "callback dispatched");
            }
            max_id = max_id.max(Some(update.id.0));
        }

        if let Some(max_id) = max_id {
            self.cursor = self.cursor.max(max_id.saturating_add(1));
        }
        Ok(batch.len())
    }

    /// Poll until `cancel` fires. Returns the final cursor.
    pub async fn run(mut self, cancel: CancellationToken) -> i64 {
        info!(cursor = self.cursor, "polling started");

        while !cancel.is_cancelled() {
            let pause = match self.poll_once().await {
                Ok(n) => {
                    self.backoff.reset();
                    (n == 0).then_some(self.opts.idle_interval)
                }
                Err(e) => {
                    self.stats.record_error();
                    let delay = self.backoff.next_delay();
                    warn!(error = %e, retry_in = ?delay, cursor = self.cursor, "fetching updates failed");
                    Some(delay)
                }
            };

            if let Some(pause) = pause.filter(|p| !p.is_zero()) {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(pause) => {}
                }
            }
        }

        info!(cursor = self.cursor, "polling stopped");
        self.cursor
    }
}
