//! # gst-api: Binary Entry Point
//!
//! Starts the Axum HTTP server. Postgres is used when `DATABASE_URL` is set
//! and Redis when `REDIS_URL` is set; otherwise in-memory backends are used.

use std::sync::Arc;

use gst_api::cache::{Cache, MemoryCache, RedisCache};
use gst_api::db::{InvoiceStore, MemoryInvoiceStore, PgInvoiceStore};
use gst_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = AppConfig::from_env();
    tracing::info!(?config, "starting gst-api");

    let db_pool = gst_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let store: Arc<dyn InvoiceStore> = match &db_pool {
        Some(pool) => Arc::new(PgInvoiceStore::new(pool.clone())),
        None => {
            tracing::warn!("Invoices are held in memory and will be lost on restart");
            Arc::new(MemoryInvoiceStore::new())
        }
    };

    let cache: Arc<dyn Cache> = match &config.redis_url {
        Some(url) => {
            let redis = RedisCache::connect(url).await.map_err(|e| {
                tracing::error!("Redis connection failed: {e}");
                e
            })?;
            tracing::info!("Redis cache connected");
            Arc::new(redis)
        }
        None => {
            tracing::warn!("REDIS_URL not set; rate limits and invoice sequences are per-process");
            Arc::new(MemoryCache::new())
        }
    };

    let port = config.port;
    let state = AppState::with_backends(config, store, cache, db_pool).map_err(|e| {
        tracing::error!("GST client initialization failed: {e}");
        e
    })?;

    let app = gst_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("GST API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
