mod logging;

use anyhow::{Context, Result};
use background_service::{Scheduler, ShutdownController};
use clap::{Parser, Subcommand};
use memerelay_core::config::{Config, Credentials, DEFAULT_CONFIG_PATH};
use memerelay_core::{CoreError, ErrorReporter};
use monitoring::{MonitoringManager, NotifyLevel};
use reddit_client::{RedditApiClient, RedditOAuth2Config};
use seen_store::SeenStore;
use std::path::PathBuf;
use std::sync::Arc;
use telegram_sender::{TelegramConfig, TelegramSender};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "memerelay", version, about = "Relay Reddit memes to a Telegram chat")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file (JSON, or TOML by extension)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Perform a single run and exit
    #[arg(long, global = true)]
    once: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the relay (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Config and credentials are read before the log directory is known.
    let (config, credentials) = tracing::subscriber::with_default(
        logging::console_subscriber(cli.debug),
        || load_settings(&cli),
    )?;

    let debug_mode = cli.debug || config.logging.debug;
    let _guard = logging::setup_logging(&config.logging, debug_mode)?;

    info!(
        "Starting memerelay v{} ({} subreddits)",
        env!("CARGO_PKG_VERSION"),
        config.reddit.subreddits.len()
    );

    let mut monitor = MonitoringManager::new(&config.monitoring, config.display.as_ref());

    match run(cli, config, credentials, &mut monitor).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            monitor
                .notify(&format!("💥 Fatal error: {:#}", e), NotifyLevel::Error)
                .await;
            Err(e)
        }
    }
}

fn load_settings(cli: &Cli) -> Result<(Config, Credentials)> {
    let reporter = ErrorReporter::new();

    let config = Config::load(&cli.config).map_err(|e| {
        let e = CoreError::from(e);
        reporter.report_error(&e);
        e
    });
    let config = config
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let credentials = Credentials::from_env().map_err(|e| {
        let e = CoreError::from(e);
        reporter.report_error(&e);
        e
    });
    let credentials = credentials.context("Missing credentials")?;

    Ok((config, credentials))
}

async fn run(
    cli: Cli,
    config: Config,
    credentials: Credentials,
    monitor: &mut MonitoringManager,
) -> Result<()> {
    let reddit = RedditApiClient::new(RedditOAuth2Config::new(
        credentials.reddit_client_id,
        credentials.reddit_client_secret,
        credentials.reddit_user_agent,
    ))
    .context("Failed to build Reddit client")?;
    reddit
        .validate_credentials()
        .await
        .context("Reddit rejected the client credentials")?;
    info!("Reddit credentials verified");

    let telegram = TelegramSender::new(TelegramConfig::new(
        credentials.telegram_bot_token,
        credentials.telegram_chat_id,
    ))
    .context("Failed to build Telegram client")?;
    telegram
        .get_me()
        .await
        .context("Telegram rejected the bot token")?;

    let seen = SeenStore::load(&config.storage.seen_posts_path).with_context(|| {
        format!(
            "Failed to load seen posts from {}",
            config.storage.seen_posts_path.display()
        )
    })?;
    info!("Loaded {} previously sent posts", seen.len());

    monitor.show_startup();
    monitor
        .notify("🚀 Meme scraper started successfully", NotifyLevel::Info)
        .await;

    let controller = Arc::new(ShutdownController::new());
    let shutdown = controller.signal();
    tokio::spawn(listen_for_signals(Arc::clone(&controller)));

    let monitor = std::mem::replace(monitor, MonitoringManager::detached());
    let mut scheduler = Scheduler::new(config, reddit, telegram, seen, monitor, shutdown);

    if cli.once {
        let outcome = scheduler.run_once().await;
        info!(
            "Single run finished: {} sent, {} failed",
            outcome.delivery.sent, outcome.delivery.failed
        );
        scheduler.finish().await;
    } else {
        scheduler.run().await;
    }

    info!("memerelay stopped");
    Ok(())
}

async fn listen_for_signals(controller: Arc<ShutdownController>) {
    wait_for_signal().await;
    info!("Shutdown requested, finishing current work");
    controller.trigger();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
