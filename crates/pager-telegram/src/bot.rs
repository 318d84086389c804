use std::time::Duration;

use teloxide::Bot;

use pager_core::{config::Config, errors::Error, Result};

/// Headroom above the long-poll window so the HTTP client never cuts a
/// healthy `getUpdates` short.
const LONG_POLL_HEADROOM: Duration = Duration::from_secs(10);

/// Bot with teloxide's HTTP defaults, the configured proxy and a request
/// timeout that outlives a long poll.
pub fn build_bot(cfg: &Config) -> Result<Bot> {
    let mut builder = teloxide::net::default_reqwest_settings()
        .timeout(cfg.long_poll_timeout.saturating_add(LONG_POLL_HEADROOM));

    if let Some(url) = cfg.proxy_url.as_deref() {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| Error::Config(format!("invalid PROXY_URL {url:?}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    let client = builder
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
    Ok(Bot::with_client(cfg.telegram_bot_token.clone(), client))
}
