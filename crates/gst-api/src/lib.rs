//! # gst-api: GST E-Invoice Service
//!
//! Axum service that drafts tax invoices, submits them to the GST Invoice
//! Registration Portal (IRP) for an IRN, cancels IRNs, and keeps a
//! hash-chained audit log of every portal exchange.
//!
//! ## Layout
//!
//! - `invoices`: draft creation, invoice numbering.
//! - `orchestrator`: submission and cancellation workflows.
//! - `settings`: cached, database-backed integration settings.
//! - `rate_limit`: hourly portal call budget.
//! - `db`: `InvoiceStore` over Postgres or memory.
//! - `cache`: `Cache` over Redis or memory.
//! - `routes`: HTTP handlers.
//!
//! `/v1/*` routes sit behind bearer auth; `/health/*` checks do not.

pub mod auth;
pub mod cache;
pub mod db;
pub mod error;
pub mod extractors;
pub mod invoices;
pub mod orchestrator;
pub mod rate_limit;
pub mod routes;
pub mod settings;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::invoices::router())
        .merge(routes::gst::router())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

/// Readiness: database (when configured) and cache must answer.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    if let Err(e) = state.cache.ping().await {
        tracing::warn!("Cache health check failed: {e}");
        return (StatusCode::SERVICE_UNAVAILABLE, "cache unreachable").into_response();
    }

    (StatusCode::OK, "ready").into_response()
}
