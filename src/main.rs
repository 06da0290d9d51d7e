use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feed_harvester::browser::ChromiumRenderer;
use feed_harvester::config::Config;
use feed_harvester::constants::Selectors;
use feed_harvester::db::Database;
use feed_harvester::harvest::Harvester;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting feed-harvester");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        keyword = %config.search_keyword,
        database = %config.database_path.display(),
        "Configuration loaded"
    );

    // Open (or resume) the results store
    let db = Database::open(&config.database_path)
        .await
        .context("Failed to open results store")?;

    let renderer = ChromiumRenderer::connect(&config.browser_debug_url)
        .await
        .context("Failed to attach to browser")?;

    // Cancel the crawl on shutdown signal
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing current step");
        signal_cancel.cancel();
    });

    let selectors = Selectors::default();
    let harvest_config = config.harvest_config();
    let harvester = Harvester::new(&renderer, &selectors, &harvest_config, &cancel);

    let result = harvester
        .search_and_crawl(&db, &config.search_base_url, &config.search_keyword)
        .await;
    signal_handle.abort();

    let outcome = match result {
        Ok(summary) => {
            info!(
                pages = summary.pages,
                cards = summary.cards_seen,
                stored = summary.cards_persisted,
                failed = summary.cards_failed,
                comments = summary.comments_captured,
                "Crawl finished"
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            warn!("Crawl cancelled before the first page");
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Crawl did not start")),
    };

    match db.close().await {
        Ok(counts) => info!(
            path = %db.path().display(),
            actors = counts.actors,
            posts = counts.posts,
            comments = counts.comments,
            "Results store closed"
        ),
        Err(e) => warn!("Failed to count stored rows: {e:#}"),
    }

    info!("Shutdown complete");

    outcome
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,feed_harvester=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
