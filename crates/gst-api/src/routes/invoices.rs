//! # Invoice API
//!
//! - **POST `/v1/invoices`**: create a draft (numbering + tax computation)
//! - **GET `/v1/invoices/{id}`**: invoice header, customer and line items
//! - **POST `/v1/invoices/{id}/submit`**: generate an IRN
//! - **POST `/v1/invoices/{id}/cancel`**: cancel the IRN
//! - **GET `/v1/invoices/{id}/transactions`**: audit entries for the invoice
//!
//! Portal rejections are `200 OK` with `accepted: false`; only failures to
//! obtain an answer map to error statuses.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use gst_core::{InvoiceDocument, InvoiceId, TransactionLogEntry};
use gst_irp_client::CancelReason;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::invoices::CreateInvoiceRequest;
use crate::orchestrator::SubmissionResponse;
use crate::state::AppState;

/// Body of `POST /v1/invoices/{id}/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelInvoiceRequest {
    /// Portal reason code: 1 duplicate, 2 data entry mistake,
    /// 3 order cancelled, 4 other.
    pub reason: u8,
    pub remark: String,
}

impl Validate for CancelInvoiceRequest {
    fn validate(&self) -> Result<(), String> {
        if CancelReason::from_code(self.reason).is_none() {
            return Err("reason must be 1, 2, 3 or 4".to_string());
        }
        if self.remark.trim().is_empty() {
            return Err("remark must not be empty".to_string());
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/invoices", post(create_invoice))
        .route("/v1/invoices/{id}", get(get_invoice))
        .route("/v1/invoices/{id}/submit", post(submit_invoice))
        .route("/v1/invoices/{id}/cancel", post(cancel_invoice))
        .route("/v1/invoices/{id}/transactions", get(list_transactions))
}

async fn create_invoice(
    State(state): State<AppState>,
    body: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InvoiceDocument>), AppError> {
    let req = extract_validated_json(body)?;
    let document = state.invoices.create_draft(req).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<InvoiceDocument>, AppError> {
    state
        .store
        .load_document(InvoiceId(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("invoice {id}")))
}

async fn submit_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionResponse>, AppError> {
    Ok(Json(state.gst.submit_invoice(InvoiceId(id)).await?))
}

async fn cancel_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<CancelInvoiceRequest>, JsonRejection>,
) -> Result<Json<SubmissionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let reason = CancelReason::from_code(req.reason)
        .ok_or_else(|| AppError::Validation("unknown cancellation reason".into()))?;
    Ok(Json(
        state
            .gst
            .cancel_invoice(InvoiceId(id), reason, &req.remark)
            .await?,
    ))
}

async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TransactionLogEntry>>, AppError> {
    Ok(Json(state.store.transactions_for(InvoiceId(id)).await?))
}
