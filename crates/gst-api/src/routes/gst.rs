//! # GST Integration API
//!
//! - **GET `/v1/gst/settings`**: effective settings, secrets redacted
//! - **PUT `/v1/gst/settings`**: upsert settings rows
//! - **POST `/v1/gst/auth/refresh`**: force a portal token refresh
//! - **GET `/v1/gst/transactions/verify`**: audit chain integrity report

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use gst_core::{verify_chain, ChainIntegrity, GstSettings};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::orchestrator::{SubmissionError, TokenStatus};
use crate::settings::{is_known_key, SettingsView};
use crate::state::AppState;

/// Body of `PUT /v1/gst/settings`: `setting_key → setting_value`.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct SettingsUpdate(pub HashMap<String, String>);

impl Validate for SettingsUpdate {
    fn validate(&self) -> Result<(), String> {
        if self.0.is_empty() {
            return Err("no settings provided".to_string());
        }
        let mut unknown: Vec<&str> = self
            .0
            .keys()
            .map(String::as_str)
            .filter(|k| !is_known_key(k))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(format!("unknown setting keys: {}", unknown.join(", ")));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ChainReport {
    #[serde(flatten)]
    pub integrity: ChainIntegrity,
    pub valid: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/gst/settings", get(get_settings).put(update_settings))
        .route("/v1/gst/auth/refresh", post(refresh_token))
        .route("/v1/gst/transactions/verify", get(verify_transactions))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsView>, AppError> {
    let settings = state
        .gst
        .settings()
        .load()
        .await
        .map_err(SubmissionError::from)?;
    Ok(Json(SettingsView::from(&settings)))
}

/// Rows are merged with the current ones and resolved before anything is
/// written, so an update that would leave the integration unresolvable is
/// rejected with 422.
async fn update_settings(
    State(state): State<AppState>,
    body: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<SettingsView>, AppError> {
    let SettingsUpdate(update) = extract_validated_json(body)?;
    let service = state.gst.settings();

    let mut merged = service.rows().await?;
    merged.extend(update.iter().map(|(k, v)| (k.clone(), v.clone())));
    let resolved =
        GstSettings::from_rows(&merged).map_err(|e| AppError::Validation(e.to_string()))?;

    service.update(&update).await?;
    Ok(Json(SettingsView::from(&resolved)))
}

async fn refresh_token(State(state): State<AppState>) -> Result<Json<TokenStatus>, AppError> {
    Ok(Json(state.gst.refresh_token().await?))
}

async fn verify_transactions(State(state): State<AppState>) -> Result<Json<ChainReport>, AppError> {
    let entries = state.store.all_transactions().await?;
    let integrity = verify_chain(&entries);
    if !integrity.is_valid() {
        tracing::error!(
            broken_links = integrity.broken_links,
            tampered_entries = integrity.tampered_entries,
            "GST transaction audit chain failed verification"
        );
    }
    Ok(Json(ChainReport {
        valid: integrity.is_valid(),
        integrity,
    }))
}
