//! Cinekami server entry point.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::Utc;
use cinekami_api::{AppState, app};
use cinekami_common::{Cache, Config, CursorCodec, InMemoryCache, RedisCache, TmdbClient};
use cinekami_core::{
    CacheInvalidator, CatalogSyncService, PageQueryEngine, Scheduler, SnapshotArchiver,
    VoteLedger,
};
use cinekami_db::{PgStorage, Storage};
use fred::interfaces::ClientLike;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Redis when configured, otherwise an in-process cache.
async fn connect_cache(config: &Config) -> Result<Arc<dyn Cache>, Box<dyn std::error::Error>> {
    let Some(url) = config.redis.url.as_deref().filter(|u| !u.is_empty()) else {
        info!("No Redis URL configured, using in-process cache");
        return Ok(Arc::new(InMemoryCache::new()));
    };

    info!("Connecting to Redis...");
    let redis_config = fred::types::config::Config::from_url(url)?;
    let client = fred::clients::Client::new(redis_config, None, None, None);
    client.connect();
    client.wait_for_connect().await?;
    info!("Connected to Redis cache");

    Ok(Arc::new(RedisCache::new(
        Arc::new(client),
        config.redis.prefix.clone(),
    )))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinekami=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting cinekami server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = cinekami_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    cinekami_db::migrate(&db).await?;
    info!("Migrations completed");

    let storage: Arc<dyn Storage> = Arc::new(PgStorage::new(Arc::new(db)));
    let cache = connect_cache(&config).await?;

    if !config.cursor.is_configured() {
        warn!("No cursor secret configured; cursors will not survive a restart");
    }
    let codec = CursorCodec::new(&config.cursor.secret_bytes());

    // Initialize services
    let invalidator = CacheInvalidator::new(cache.clone());
    let pages = PageQueryEngine::new(storage.clone(), cache, codec);
    let ledger = VoteLedger::new(storage.clone());
    let archiver = SnapshotArchiver::new(storage.clone(), invalidator.clone());

    let catalog = match TmdbClient::from_config(&config.catalog)? {
        Some(client) => Some(CatalogSyncService::new(
            Arc::new(client),
            storage.clone(),
            invalidator.clone(),
            &config.catalog,
        )),
        None => {
            warn!("No TMDb API key configured; catalog sync disabled");
            None
        }
    };

    // Background jobs
    let mut scheduler = Scheduler::new();
    if let Some(catalog) = &catalog {
        if config.jobs.seed_if_empty {
            match catalog.seed_if_empty(Utc::now(), &scheduler.token()).await {
                Ok(Some(count)) => info!(count, "Seeded catalog"),
                Ok(None) => {}
                Err(e) => error!(error = %e, "Catalog seed failed"),
            }
        }
        if config.jobs.catalog_sync_enabled {
            scheduler.spawn_weekly_sync(catalog.clone());
        }
    }
    if config.jobs.archive_enabled {
        scheduler.spawn_monthly_archive(archiver);
    }
    info!(jobs = scheduler.len(), "Background jobs started");

    let router = app(
        AppState::new(pages, ledger, invalidator),
        &config.server.cors_allowed_origins,
    );

    // Start server with graceful shutdown
    let host: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping background jobs...");
    scheduler.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}
