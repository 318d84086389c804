use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use pager_core::{
    config::Config,
    daemon::DaemonController,
    domain::ChatId,
    messaging::{
        port::{MessagingPort, UpdateSource},
        retry::RetryingMessenger,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    publisher::{Paginator, Published},
    store::{FileBackend, SessionStore},
};
use pager_telegram::{bot::build_bot, TelegramMessenger};

#[derive(Parser, Debug)]
#[command(name = "pager", version, about = "Paginated Telegram messages with inline navigation")]
struct Args {
    /// Bot token; overrides TELEGRAM_BOT_TOKEN.
    #[arg(long)]
    token: Option<String>,

    /// HTTP(S) proxy for Bot API calls; overrides PROXY_URL.
    #[arg(long)]
    proxy: Option<String>,

    /// Env file read before the process environment.
    #[arg(long, value_name = "PATH", default_value = ".env")]
    env_file: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll for navigation presses until SIGINT/SIGTERM (default).
    Run,
    /// Send a text (from FILE or stdin) as a paginated message.
    Send {
        #[arg(long, allow_hyphen_values = true)]
        chat: i64,
        #[arg(long)]
        title: Option<String>,
        file: Option<PathBuf>,
    },
    /// Remove expired session records and exit.
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    pager_core::logging::init("pager", args.verbose)?;

    let mut cfg = Config::load_with_env_file(&args.env_file)?;
    if let Some(token) = args.token {
        cfg.telegram_bot_token = token;
    }
    if let Some(proxy) = args.proxy {
        cfg.proxy_url = Some(proxy);
    }

    let store = Arc::new(SessionStore::from_config(
        &cfg,
        Arc::new(FileBackend::new(cfg.state_dir.clone())),
    ));

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            check(&cfg)?;
            let telegram = Arc::new(TelegramMessenger::new(build_bot(&cfg)?));
            let source: Arc<dyn UpdateSource> = telegram.clone();
            let daemon = DaemonController::new(&cfg, source, outbound(&cfg, telegram), store);
            let report = daemon.run().await?;
            info!(%report, "bye");
        }
        Command::Send { chat, title, file } => {
            check(&cfg)?;
            let text = read_input(file).await?;
            let telegram = Arc::new(TelegramMessenger::new(build_bot(&cfg)?));
            let paginator = Paginator::new(&cfg, store, outbound(&cfg, telegram));
            match paginator
                .send_paginated(ChatId(chat), &text, title.as_deref())
                .await?
            {
                Published::Paginated { message, pages } => {
                    info!(message = %message, pages, "sent paginated message")
                }
                Published::Single(message) => info!(message = %message, "sent single message"),
                Published::Batch(sent) => info!(messages = sent.len(), "sent pages as separate messages"),
            }
        }
        Command::Sweep => {
            let removed = store.sweep_expired().await?;
            info!(removed, dir = %cfg.state_dir.display(), "sweep finished");
        }
    }

    Ok(())
}

fn check(cfg: &Config) -> anyhow::Result<()> {
    cfg.validate()?;
    if !cfg.pagination_enabled {
        warn!("PAGINATION_ENABLED is off: long texts go out as separate messages without navigation");
    }
    info!(
        state_dir = %cfg.state_dir.display(),
        ttl = ?cfg.session_ttl,
        max_pages = cfg.max_pages,
        proxy = cfg.proxy_url.is_some(),
        "configuration loaded"
    );
    Ok(())
}

/// Retries wrap the throttle so every attempt is rate-limited.
fn outbound(cfg: &Config, telegram: Arc<TelegramMessenger>) -> Arc<dyn MessagingPort> {
    let throttled: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(telegram, ThrottleConfig::default()));
    Arc::new(RetryingMessenger::new(
        throttled,
        cfg.outbound_timeout,
        cfg.outbound_max_attempts,
    ))
}

async fn read_input(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}
