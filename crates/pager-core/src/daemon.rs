//! Daemon lifecycle: identity check, polling task, session sweeper, graceful stop.
//!
//! `Init -> Running -> Stopping -> Stopped`. A failed identity check goes
//! straight to `Stopping`/`Stopped`. On stop the polling task gets
//! `drain_timeout` to finish its current cycle and is aborted after that.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    dispatcher::CallbackDispatcher,
    errors::Error,
    messaging::port::{MessagingPort, UpdateSource},
    polling::{PollingLoop, PollingOptions},
    stats::{Stats, StatsSnapshot},
    store::SessionStore,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DaemonState {
    Init,
    Running,
    Stopping,
    Stopped,
}

pub struct DaemonController {
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<CallbackDispatcher>,
    store: Arc<SessionStore>,
    stats: Arc<Stats>,
    polling: PollingOptions,
    drain_timeout: Duration,
    sweep_interval: Option<Duration>,
    cancel: CancellationToken,
    state: watch::Sender<DaemonState>,
}

impl DaemonController {
    pub fn new(
        cfg: &Config,
        source: Arc<dyn UpdateSource>,
        messenger: Arc<dyn MessagingPort>,
        store: Arc<SessionStore>,
    ) -> Self {
        let stats = Arc::new(Stats::new());
        let dispatcher = Arc::new(CallbackDispatcher::new(
            store.clone(),
            messenger,
            stats.clone(),
        ));
        let (state, _) = watch::channel(DaemonState::Init);
        Self {
            source,
            dispatcher,
            store,
            stats,
            polling: PollingOptions::from_config(cfg),
            drain_timeout: cfg.drain_timeout,
            sweep_interval: cfg.sweep_interval,
            cancel: CancellationToken::new(),
            state,
        }
    }

    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Request a graceful stop. Safe to call from any task, any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run until SIGINT/SIGTERM or [`stop`](Self::stop).
    pub async fn run(&self) -> Result<StatsSnapshot> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves or [`stop`](Self::stop) is called.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<StatsSnapshot> {
        if self.state() != DaemonState::Init {
            return Err(Error::InvalidArgument(
                "daemon can only be started once".to_string(),
            ));
        }

        let bot = match self.source.identify().await {
            Ok(name) => name,
            Err(e) => {
                error!(error = %e, "platform identity check failed");
                self.set_state(DaemonState::Stopping);
                self.cancel.cancel();
                self.set_state(DaemonState::Stopped);
                return Err(e);
            }
        };

        let polling = PollingLoop::new(
            self.source.clone(),
            self.dispatcher.clone(),
            self.stats.clone(),
            self.polling,
        );
        let mut poll_task = tokio::spawn(polling.run(self.cancel.clone()));
        let sweeper = self.spawn_sweeper();

        self.set_state(DaemonState::Running);
        info!(bot = %bot, "pager daemon running");

        let mut failure = None;
        tokio::select! {
            _ = shutdown => info!("shutdown signal received"),
            _ = self.cancel.cancelled() => info!("stop requested"),
            res = &mut poll_task => match res {
                Ok(cursor) if self.cancel.is_cancelled() => info!(cursor, "stop requested"),
                Ok(cursor) => failure = Some(format!("polling returned at cursor {cursor} without a stop request")),
                Err(e) => failure = Some(format!("polling task died: {e}")),
            },
        }
        if let Some(reason) = &failure {
            self.stats.record_error();
            error!(%reason, "polling task exited unexpectedly");
        }

        self.set_state(DaemonState::Stopping);
        self.cancel.cancel();

        if !poll_task.is_finished() {
            match timeout(self.drain_timeout, &mut poll_task).await {
                Ok(Ok(cursor)) => info!(cursor, "polling drained"),
                Ok(Err(e)) => error!(error = %e, "polling task failed"),
                Err(_) => {
                    warn!(drain_timeout = ?self.drain_timeout, "polling did not drain in time, aborting");
                    poll_task.abort();
                }
            }
        }

        if let Some(sweeper) = sweeper {
            sweeper.abort();
            let _ = sweeper.await;
        }

        self.set_state(DaemonState::Stopped);
        let report = self.stats.snapshot();
        info!(%report, "pager daemon stopped");
        match failure {
            Some(reason) => Err(Error::TaskFailed(reason)),
            None => Ok(report),
        }
    }

    fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.sweep_interval.filter(|d| !d.is_zero())?;
        let store = self.store.clone();
        let stats = self.stats.clone();
        let cancel = self.cancel.clone();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match store.sweep_expired().await {
                            Ok(0) => {}
                            Ok(n) => info!(removed = n, "expired pagination sessions swept"),
                            Err(e) => {
                                stats.record_storage_error();
                                warn!(error = %e, "session sweep failed");
                            }
                        }
                    }
                }
            }
        }))
    }

    fn set_state(&self, next: DaemonState) {
        self.state.send_replace(next);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, MessageId, MessageRef},
        store::{KvBackend, MemoryBackend},
        testing::{callback_update, FakeMessenger, FakeSource},
    };

    const MSG: MessageRef = MessageRef {
        chat_id: ChatId(1),
        message_id: MessageId(2),
    };

    fn config() -> Config {
        let mut cfg = Config::with_token("123:abc");
        cfg.long_poll_timeout = Duration::from_secs(10);
        cfg.polling_interval = Duration::from_secs(1);
        cfg.drain_timeout = Duration::from_secs(15);
        cfg.sweep_interval = Some(Duration::from_secs(60));
        cfg
    }

    fn daemon(cfg: &Config, source: Arc<FakeSource>, backend: Arc<MemoryBackend>) -> DaemonController {
        let store = Arc::new(SessionStore::from_config(cfg, backend));
        DaemonController::new(cfg, source, Arc::new(FakeMessenger::default()), store)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_then_stops_on_shutdown_signal() {
        let cfg = config();
        let source = Arc::new(FakeSource::default());
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::from_config(&cfg, backend.clone());
        store
            .save(MSG.chat_id, MSG.message_id, vec!["a".into(), "b".into()], 0, None)
            .await
            .unwrap();
        source.push_batch(vec![callback_update(1, "pg:1:2:next", Some(MSG))]);

        let d = daemon(&cfg, source.clone(), backend);
        assert_eq!(d.state(), DaemonState::Init);

        let mut states = d.subscribe();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let watcher = tokio::spawn(async move {
            states.wait_for(|s| *s == DaemonState::Running).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            let _ = tx.send(());
        });

        let report = d
            .run_until(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        watcher.await.unwrap();

        assert_eq!(d.state(), DaemonState::Stopped);
        assert_eq!(report.total_updates, 1);
        assert_eq!(report.total_callbacks, 1);
        assert_eq!(source.offsets().first(), Some(&0));
        assert!(source.offsets().iter().skip(1).all(|o| *o == 2));
        assert_eq!(store.get(MSG.chat_id, MSG.message_id).await.unwrap().current_page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn identity_failure_stops_without_polling() {
        let cfg = config();
        let source = Arc::new(FakeSource::default());
        source.fail_identify(Error::Platform("Unauthorized".into()));
        let d = daemon(&cfg, source.clone(), Arc::new(MemoryBackend::new()));

        let err = d.run_until(std::future::pending()).await.unwrap_err();

        assert!(matches!(err, Error::Platform(_)));
        assert_eq!(d.state(), DaemonState::Stopped);
        assert!(source.offsets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_the_in_flight_long_poll() {
        let cfg = config();
        let source = Arc::new(FakeSource::default());
        let d = Arc::new(daemon(&cfg, source.clone(), Arc::new(MemoryBackend::new())));

        let runner = {
            let d = d.clone();
            tokio::spawn(async move { d.run_until(std::future::pending()).await })
        };
        d.subscribe()
            .wait_for(|s| *s == DaemonState::Running)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let start = tokio::time::Instant::now();
        d.stop();
        d.stop();
        runner.await.unwrap().unwrap();

        // The idle long poll (10s) finishes inside the 15s drain window.
        assert!(start.elapsed() < Duration::from_secs(15));
        assert_eq!(d.state(), DaemonState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_is_bounded() {
        let mut cfg = config();
        cfg.long_poll_timeout = Duration::from_secs(120);
        cfg.drain_timeout = Duration::from_secs(3);
        let source = Arc::new(FakeSource::default());
        let d = Arc::new(daemon(&cfg, source, Arc::new(MemoryBackend::new())));

        let runner = {
            let d = d.clone();
            tokio::spawn(async move { d.run_until(std::future::pending()).await })
        };
        d.subscribe()
            .wait_for(|s| *s == DaemonState::Running)
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        d.stop();
        runner.await.unwrap().unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(120));
        assert_eq!(d.state(), DaemonState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_sessions_while_running() {
        let mut cfg = config();
        cfg.session_ttl = Duration::from_secs(30);
        let source = Arc::new(FakeSource::default());
        let backend = Arc::new(MemoryBackend::new());

        // Created an hour ago per the store clock.
        let stale = SessionStore::from_config(&cfg, backend.clone()).with_clock(Arc::new(|| {
            chrono::Utc::now() - chrono::Duration::hours(1)
        }));
        stale
            .save(MSG.chat_id, MSG.message_id, vec!["a".into()], 0, None)
            .await
            .unwrap();
        assert_eq!(backend.keys().await.unwrap().len(), 1);

        let d = daemon(&cfg, source, backend.clone());
        let report = d
            .run_until(tokio::time::sleep(Duration::from_secs(90)))
            .await
            .unwrap();

        assert!(backend.is_empty().await);
        assert_eq!(report.storage_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_polling_task_fails_the_run() {
        let cfg = config();
        let source = Arc::new(FakeSource::default());
        source.panic_when_exhausted();
        let d = daemon(&cfg, source.clone(), Arc::new(MemoryBackend::new()));

        let err = d.run_until(std::future::pending()).await.unwrap_err();

        assert!(matches!(err, Error::TaskFailed(_)), "{err}");
        assert_eq!(d.state(), DaemonState::Stopped);
        assert_eq!(source.offsets(), vec![0]);
        assert_eq!(d.stats().errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cannot_start_twice() {
        let cfg = config();
        let d = daemon(
            &cfg,
            Arc::new(FakeSource::default()),
            Arc::new(MemoryBackend::new()),
        );
        d.run_until(async {}).await.unwrap();

        assert!(matches!(
            d.run_until(async {}).await,
            Err(Error::InvalidArgument(_))
        ));
    }
}
