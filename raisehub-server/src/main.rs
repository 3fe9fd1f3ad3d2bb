//! RaiseHub indexer server
//!
//! Derives users, rounds, sell orders, trades and platform totals from the
//! RaiseHub contracts' event logs and serves them over a read-only HTTP API.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use raisehub_core::discovery::DiscoveryStrategy;
use raisehub_core::ledger::{LedgerClient, RpcLedgerClient};
use raisehub_core::processors::{IndexerError, IndexerRunner};
use raisehub_core::router::EventRouter;
use raisehub_core::store::{EntityStore, PgEntityStore};
use server::{build_router, run_server};
use shutdown::spawn_shutdown_listener;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// RaiseHub indexer - derives platform state from contract events
#[derive(Parser, Debug)]
#[command(name = "raisehub-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./raisehub-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Run the indexer without the HTTP API
    #[arg(long, default_value = "false")]
    no_api: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting raisehub-server v{}", env!("CARGO_PKG_VERSION"));

    let loaded_config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

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

    let indexer_config = loaded_config.indexer;
    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedgerClient::new(
        indexer_config.ledger.rpc_url.clone(),
        indexer_config.ledger.retry.clone(),
    ));
    let store: Arc<dyn EntityStore> = Arc::new(PgEntityStore::new(db_pool.clone()));

    // Resolve the initial round set once, before any event is routed.
    let strategy = DiscoveryStrategy::resolve(
        ledger.as_ref(),
        indexer_config.contracts.factory,
        &indexer_config.discovery,
    )
    .await;
    let monitored = strategy
        .monitored(indexer_config.contracts, store.as_ref())
        .await?;

    let (shutdown_tx, shutdown_rx) = spawn_shutdown_listener();

    let router = EventRouter::with_default_handlers(store)?;
    let runner = IndexerRunner::new(
        ledger,
        router,
        monitored,
        &indexer_config,
        shutdown_rx.clone(),
    );
    let mut indexer = tokio::spawn(runner.run());

    let result: anyhow::Result<()> = if args.no_api {
        let indexed = (&mut indexer).await;
        let _ = shutdown_tx.send(true);
        flatten(indexed)
    } else {
        let listen_addr = loaded_config.server.listen;
        let app = build_router(AppState::new(db_pool.clone()));
        tracing::info!("Starting HTTP server on {}", listen_addr);

        // A halted indexer takes the API down with it.
        tokio::select! {
            served = run_server(app, listen_addr, shutdown_rx.clone()) => {
                let _ = shutdown_tx.send(true);
                let indexed = flatten((&mut indexer).await);
                served.map_err(anyhow::Error::from).and(indexed)
            }
            indexed = &mut indexer => {
                let _ = shutdown_tx.send(true);
                flatten(indexed)
            }
        }
    };

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result
}

/// Collapse the indexer task's join result and its own result.
fn flatten(
    joined: Result<Result<(), IndexerError>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match joined {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(e.into()),
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
