//! Tollgate Server
//!
//! Reconciliation worker for a stablecoin payment gateway: scans payment
//! wallets for deposits, settles matching orders and delivers webhooks.

mod config;
mod shutdown;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use shutdown::shutdown_signal;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tollgate_core::notifier::{LogNotifier, Notifier, TelegramNotifier};
use tollgate_core::processors::{
    JobScheduler, MatchRules, Matcher, ScanJob, SettlementCoordinator, WebhookSender,
};
use tollgate_core::sources::build_source;
use tollgate_core::stores::postgres::PgStore;
use tollgate_core::utils::http_client::HttpClient;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tollgate - stablecoin deposit reconciliation worker
#[derive(Parser, Debug)]
#[command(name = "tollgate-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./tollgate-config.toml")]
    config: PathBuf,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "TOLLGATE_JSON_LOGS", default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.json_logs);

    tracing::info!("Starting tollgate-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ConfigLoader::new(&args.config).load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let http = HttpClient::new(config.http)?;

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => {
            tracing::info!("Telegram notifications enabled");
            Arc::new(TelegramNotifier::new(
                &telegram.bot_token,
                telegram.chat_id.clone(),
                http.clone(),
            )?)
        }
        None => Arc::new(LogNotifier),
    };

    let settlement = Arc::new(SettlementCoordinator::new(
        store.clone(),
        notifier,
        config.dispatch.max_retry,
    ));

    // Register one scan job per chain plus the webhook dispatcher
    let mut scheduler = JobScheduler::new();
    for chain in &config.chains {
        let source = build_source(chain, http.clone())?;
        let matcher = Matcher::new(store.clone(), MatchRules::from_config(chain));
        let job = ScanJob::new(
            chain.job_name(),
            store.clone(),
            source,
            matcher,
            settlement.clone(),
        );
        tracing::info!(
            chain = %chain.chain,
            interval_secs = chain.interval.as_secs(),
            asset = %chain.asset.asset_type,
            "Registered scan job"
        );
        scheduler.add(Arc::new(job), chain.interval);
    }
    let dispatch_interval = config.dispatch.interval;
    scheduler.add(
        Arc::new(WebhookSender::new(store.clone(), http.clone(), config.dispatch)),
        dispatch_interval,
    );

    // Run the scheduler until a shutdown signal arrives
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let signal_result = shutdown_signal().await;
    if let Err(e) = &signal_result {
        tracing::error!("Failed to install signal handlers: {}", e);
    }
    let _ = shutdown_tx.send(true);
    scheduler_handle.await?;

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    signal_result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}
