//! Process wiring: logging, store and cache construction, signal handling.

use crate::application::CacheOrchestrator;
use crate::config::{Config, StorageType};
use crate::domain::repositories::BackingStore;
use crate::infrastructure::cache::{CacheStore, MemoryCache, RedisCache};
use crate::infrastructure::persistence::{FileLinkRepository, PgLinkRepository};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level; `LOG_FORMAT=json` switches to
/// structured output.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // A subscriber set earlier (tests, embedding) is kept.
    let _ = if config.log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Opens the configured backing store.
///
/// For PostgreSQL, embedded migrations are applied before the store is returned.
///
/// # Errors
///
/// Returns an error if the flat file cannot be read or the database is unreachable.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn BackingStore>> {
    match config.storage_type {
        StorageType::File => {
            let store = FileLinkRepository::open(&config.storage_path)
                .await
                .with_context(|| {
                    format!("Failed to open storage file {}", config.storage_path.display())
                })?;
            info!(path = %config.storage_path.display(), "Using file storage");
            Ok(Arc::new(store))
        }
        StorageType::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for pg storage")?;

            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
                .connect(url)
                .await
                .context("Failed to connect to database")?;
            info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to migrate")?;

            Ok(Arc::new(PgLinkRepository::new(Arc::new(pool))))
        }
    }
}

/// Connects the configured cache, falling back to the in-process cache
/// when Redis is not configured or unreachable.
pub async fn connect_cache(config: &Config) -> Arc<dyn CacheStore> {
    let Some(redis_url) = &config.redis_url else {
        info!("Cache: in-process");
        return Arc::new(MemoryCache::new());
    };

    match RedisCache::connect(redis_url).await {
        Ok(redis) => {
            info!("Cache enabled (Redis)");
            Arc::new(redis)
        }
        Err(e) => {
            tracing::warn!("Failed to connect to Redis: {}. Using in-process cache.", e);
            Arc::new(MemoryCache::new())
        }
    }
}

/// Builds the orchestrator described by `config`.
///
/// Must be called from within a tokio runtime; write-back mode spawns workers.
pub async fn build_orchestrator(config: &Config) -> Result<CacheOrchestrator> {
    let store = connect_store(config).await?;
    let cache = connect_cache(config).await;
    Ok(CacheOrchestrator::new(
        store,
        cache,
        config.orchestrator_settings(),
    ))
}

/// Runs the service until Ctrl-C or SIGTERM, then drains the worker pool.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or signal handlers cannot
/// be installed.
pub async fn run(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    info!(
        mode = %orchestrator.mode(),
        store = %orchestrator.store_kind(),
        "weblink ready"
    );

    shutdown_signal().await?;

    let report = orchestrator.shutdown(config.shutdown_timeout()).await;
    info!(
        processed = report.processed,
        dropped = report.dropped,
        timed_out = report.timed_out,
        "Shutdown complete"
    );

    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        received = ctrl_c => {
            received?;
            info!("Received Ctrl+C");
        },
        received = terminate => {
            received?;
            info!("Received SIGTERM");
        },
    }

    Ok(())
}
