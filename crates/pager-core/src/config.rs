use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error,
    messaging::types::TELEGRAM_MAX_MESSAGE_LEN,
    pagination::view::FOOTER_RESERVE,
    Result,
};

/// Upper bound for every wait the daemon schedules (poll, pause, backoff, drain).
const MAX_WAIT: Duration = Duration::from_secs(3600);
/// Upper bound for `SESSION_TTL_HOURS`: one year.
const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;
const DRAIN_HEADROOM: Duration = Duration::from_secs(5);

/// Typed configuration for the pager daemon.
///
/// Built once at startup and handed to every component by `Arc`.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub proxy_url: Option<String>,

    // Polling
    pub polling_interval: Duration,
    pub long_poll_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub drain_timeout: Duration,

    // Pagination sessions
    pub pagination_enabled: bool,
    pub session_ttl: Duration,
    pub max_pages: usize,
    pub page_chars: usize,
    pub state_dir: PathBuf,
    pub sweep_interval: Option<Duration>,

    // Outbound calls (edit / answer callback)
    pub outbound_timeout: Duration,
    pub outbound_max_attempts: u32,
}

impl Config {
    /// Defaults for everything except the bot token.
    pub fn with_token(token: impl Into<String>) -> Self {
        let long_poll_timeout = Duration::from_secs(10);
        Self {
            telegram_bot_token: token.into(),
            proxy_url: None,
            polling_interval: Duration::from_secs(2),
            long_poll_timeout,
            backoff_initial: Duration::from_millis(1000),
            backoff_max: Duration::from_secs(60),
            drain_timeout: long_poll_timeout + DRAIN_HEADROOM,
            pagination_enabled: true,
            session_ttl: Duration::from_secs(3600),
            max_pages: 20,
            page_chars: 3500,
            state_dir: PathBuf::from("output/.pagination_states"),
            sweep_interval: Some(Duration::from_secs(600)),
            outbound_timeout: Duration::from_secs(10),
            outbound_max_attempts: 3,
        }
    }

    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with_env_file(Path::new(".env"))
    }

    pub fn load_with_env_file(env_file: &Path) -> Result<Self> {
        load_dotenv_if_present(env_file);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = get("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .unwrap_or_default();
        let mut cfg = Self::with_token(token);

        cfg.proxy_url = get("PROXY_URL").and_then(non_empty);

        if let Some(secs) = parse_u64(&get, "POLLING_INTERVAL_SECS")? {
            cfg.polling_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&get, "LONG_POLL_TIMEOUT_SECS")? {
            cfg.long_poll_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&get, "BACKOFF_INITIAL_MS")? {
            cfg.backoff_initial = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = parse_u64(&get, "BACKOFF_MAX_SECS")? {
            cfg.backoff_max = Duration::from_secs(secs);
        }
        cfg.drain_timeout = match parse_u64(&get, "DRAIN_TIMEOUT_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => cfg.long_poll_timeout.saturating_add(DRAIN_HEADROOM),
        };

        if let Some(enabled) = get("PAGINATION_ENABLED").map(|s| parse_bool(&s)) {
            cfg.pagination_enabled = enabled;
        }
        if let Some(hours) = parse_u64(&get, "SESSION_TTL_HOURS")? {
            let secs = hours.checked_mul(3600).ok_or_else(|| {
                Error::Config(format!("SESSION_TTL_HOURS is out of range: {hours}"))
            })?;
            cfg.session_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = parse_u64(&get, "PAGINATION_MAX_PAGES")? {
            cfg.max_pages = narrow(n, "PAGINATION_MAX_PAGES")?;
        }
        if let Some(n) = parse_u64(&get, "PAGINATION_PAGE_CHARS")? {
            cfg.page_chars = narrow(n, "PAGINATION_PAGE_CHARS")?;
        }
        if let Some(dir) = get("PAGINATION_STATE_DIR").and_then(non_empty) {
            cfg.state_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_u64(&get, "SESSION_SWEEP_INTERVAL_SECS")? {
            cfg.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(secs) = parse_u64(&get, "OUTBOUND_TIMEOUT_SECS")? {
            cfg.outbound_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_u64(&get, "OUTBOUND_MAX_ATTEMPTS")? {
            cfg.outbound_max_attempts = narrow(n, "OUTBOUND_MAX_ATTEMPTS")?;
        }

        Ok(cfg)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable (or --token) is required".to_string(),
            ));
        }
        if self.max_pages == 0 {
            return Err(Error::Config("PAGINATION_MAX_PAGES must be >= 1".to_string()));
        }
        let max_page_chars = TELEGRAM_MAX_MESSAGE_LEN - FOOTER_RESERVE;
        if self.page_chars == 0 || self.page_chars > max_page_chars {
            return Err(Error::Config(format!(
                "PAGINATION_PAGE_CHARS must be within 1..={max_page_chars}"
            )));
        }
        if self.session_ttl.is_zero() {
            return Err(Error::Config("SESSION_TTL_HOURS must be >= 1".to_string()));
        }
        if self.session_ttl > Duration::from_secs(MAX_SESSION_TTL_HOURS * 3600) {
            return Err(Error::Config(format!(
                "SESSION_TTL_HOURS must be <= {MAX_SESSION_TTL_HOURS}"
            )));
        }
        for (key, value) in [
            ("POLLING_INTERVAL_SECS", self.polling_interval),
            ("LONG_POLL_TIMEOUT_SECS", self.long_poll_timeout),
            ("BACKOFF_INITIAL_MS", self.backoff_initial),
            ("BACKOFF_MAX_SECS", self.backoff_max),
            ("OUTBOUND_TIMEOUT_SECS", self.outbound_timeout),
        ] {
            if value > MAX_WAIT {
                return Err(Error::Config(format!(
                    "{key} must not exceed {}s",
                    MAX_WAIT.as_secs()
                )));
            }
        }
        if self.drain_timeout > MAX_WAIT + DRAIN_HEADROOM {
            return Err(Error::Config(format!(
                "DRAIN_TIMEOUT_SECS must not exceed {}s",
                (MAX_WAIT + DRAIN_HEADROOM).as_secs()
            )));
        }
        if self.outbound_max_attempts == 0 {
            return Err(Error::Config(
                "OUTBOUND_MAX_ATTEMPTS must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = get(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn narrow<T: TryFrom<u64>>(n: u64, key: &str) -> Result<T> {
    T::try_from(n).map_err(|_| Error::Config(format!("{key} is out of range: {n}")))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
