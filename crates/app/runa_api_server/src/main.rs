//! Runa API server binary.
//!
//! Serves the HTTP API on `--bind`. Without `--database-url` all state lives
//! in memory and is lost on exit.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use runa_api::AppState;
use runa_api::config::ApiConfig;
use runa_core::store::Store;
use runa_core::store::memory::MemoryStore;
use runa_core::store::postgres::PgStore;
use runa_core::store::timeout::TimeoutStore;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// CLI arguments. Each falls back to its environment variable, then to the
/// defaults of [`ApiConfig::from_env`].
#[derive(Parser, Debug)]
#[command(name = "runa_api_server", about = "Runa API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL. In-memory store when unset.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Release mode: secure cookies and compact JSON.
    #[arg(long, default_value_t = false)]
    release: bool,

    /// Run the expired-session sweep every N seconds.
    #[arg(long, env = "SWEEP_INTERVAL_SECS")]
    sweep_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,runa_api=debug,runa_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }
    config.release |= args.release;
    if let Some(secs) = args.sweep_interval.filter(|s| *s > 0) {
        config.sweep_interval = Some(Duration::from_secs(secs));
    }

    if config.jwt_secret.is_none() {
        warn!("JWT_SECRET not set, access tokens will not survive a restart");
    }

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            info!(max_connections = args.max_connections, "connecting to database");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await?;
            info!("running database migrations");
            runa_core::migrate::migrate(&pool).await?;
            Arc::new(TimeoutStore::new(PgStore::new(pool), config.store_timeout))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(TimeoutStore::new(MemoryStore::new(), config.store_timeout))
        }
    };

    let state = AppState::new(store, config.clone())?;

    let shutdown = CancellationToken::new();
    let mut background = vec![tokio::spawn(housekeep(
        state.clone(),
        config.housekeeping_interval,
        shutdown.clone(),
    ))];
    if let Some(period) = config.sweep_interval {
        background.push(tokio::spawn(sweep(state.clone(), period, shutdown.clone())));
    }

    let app = runa_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, release = config.release, "REST API listening");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                _ = shutdown.cancelled() => {}
            }
        }
    })
    .await;

    shutdown.cancel();
    for handle in background {
        let _ = handle.await;
    }

    result?;
    Ok(())
}

/// Periodically delete expired refresh tokens from the store.
async fn sweep(state: AppState, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match state.tokens.sweep_expired().await {
            Ok(removed) if removed > 0 => info!(removed, "expired sessions removed"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "session sweep failed"),
        }
    }
}

/// Periodically drop expired cache entries and idle rate-limit buckets.
async fn housekeep(state: AppState, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let (purged, idle) = state.housekeep();
        debug!(purged, idle, "in-memory state swept");
    }
}
