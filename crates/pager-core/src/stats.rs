use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Runtime counters shared by the polling loop and the dispatcher.
#[derive(Debug)]
pub struct Stats {
    started_at: Instant,
    total_updates: AtomicU64,
    total_callbacks: AtomicU64,
    errors: AtomicU64,
    storage_errors: AtomicU64,
    malformed: AtomicU64,
    expired: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub total_updates: u64,
    pub total_callbacks: u64,
    pub errors: u64,
    pub storage_errors: u64,
    pub malformed: u64,
    pub expired: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            total_updates: AtomicU64::new(0),
            total_callbacks: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(&self) {
        self.total_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback(&self) {
        self.total_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            total_updates: self.total_updates.load(Ordering::Relaxed),
            total_callbacks: self.total_callbacks.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.uptime.as_secs();
        write!(
            f,
            "uptime {}h{:02}m{:02}s, updates {}, callbacks {}, errors {} (storage {}), malformed {}, expired {}",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60,
            self.total_updates,
            self.total_callbacks,
            self.errors,
            self.storage_errors,
            self.malformed,
            self.expired
        )
    }
}
