//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. Cloning is cheap: every backend sits behind an
//! `Arc`.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use gst_irp_client::{GstError, IrpClient};

use crate::cache::{Cache, MemoryCache};
use crate::db::{InvoiceStore, MemoryInvoiceStore};
use crate::invoices::InvoiceService;
use crate::orchestrator::GstService;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GST_HTTP_TIMEOUT_SECS: u64 = 30;

/// Process configuration read from the environment.
///
/// Custom `Debug` redacts the auth token and the Redis URL (which may carry
/// a password).
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub auth_token: Option<String>,
    pub redis_url: Option<String>,
    /// Client-wide HTTP timeout. Per-request timeouts come from GST settings.
    pub gst_http_timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("gst_http_timeout", &self.gst_http_timeout)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            auth_token: None,
            redis_url: None,
            gst_http_timeout: Duration::from_secs(DEFAULT_GST_HTTP_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Build configuration from `PORT`, `AUTH_TOKEN`, `REDIS_URL` and
    /// `GST_HTTP_TIMEOUT_SECS`. Unparseable numbers fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        Self {
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            auth_token: non_empty("AUTH_TOKEN"),
            redis_url: non_empty("REDIS_URL"),
            gst_http_timeout: Duration::from_secs(
                non_empty("GST_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_GST_HTTP_TIMEOUT_SECS),
            ),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn InvoiceStore>,
    pub cache: Arc<dyn Cache>,
    pub invoices: InvoiceService,
    pub gst: GstService,
    /// Present when running against Postgres; used by the readiness check.
    pub db_pool: Option<PgPool>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("db_pool", &self.db_pool.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire services over the given backends.
    pub fn with_backends(
        config: AppConfig,
        store: Arc<dyn InvoiceStore>,
        cache: Arc<dyn Cache>,
        db_pool: Option<PgPool>,
    ) -> Result<Self, GstError> {
        let client = Arc::new(IrpClient::new(config.gst_http_timeout)?);
        let gst = GstService::new(store.clone(), cache.clone(), client);
        let invoices = InvoiceService::new(store.clone(), cache.clone(), gst.settings().clone());
        Ok(Self {
            config,
            store,
            cache,
            invoices,
            gst,
            db_pool,
        })
    }

    /// In-process store and cache. State is lost on restart.
    pub fn in_memory(config: AppConfig) -> Result<Self, GstError> {
        Self::with_backends(
            config,
            Arc::new(MemoryInvoiceStore::new()),
            Arc::new(MemoryCache::new()),
            None,
        )
    }
}
