//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps service errors to HTTP status codes and JSON error bodies with an
//! error code, message, and optional details. Internal and upstream
//! failure details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gst_irp_client::GstError;

use crate::db::StoreError;
use crate::invoices::DraftError;
use crate::orchestrator::SubmissionError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "RATE_LIMITED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid bearer token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Operation conflicts with the invoice's lifecycle state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Portal call budget exhausted (429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// The GST portal failed or refused authentication (502).
    #[error("upstream GST portal error: {0}")]
    UpstreamError(String),

    /// GST integration not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal/upstream error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::UpstreamError(_) => "The GST portal request failed".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::UpstreamError(_) => tracing::error!(error = %self, "upstream GST portal error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<GstError> for AppError {
    fn from(err: GstError) -> Self {
        if err.is_config() {
            Self::ServiceUnavailable(err.to_string())
        } else {
            Self::UpstreamError(err.to_string())
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CustomerNotFound(id) => Self::NotFound(format!("customer {id}")),
            StoreError::DuplicateNumber(_) => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SubmissionError> for AppError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::RateLimitExceeded { .. } => Self::RateLimited(err.to_string()),
            SubmissionError::InvoiceNotFound(id) => Self::NotFound(format!("invoice {id}")),
            SubmissionError::InvalidState(e) => Self::Conflict(e.to_string()),
            SubmissionError::Validation(e) => Self::Validation(e.to_string()),
            SubmissionError::Gst(e) => e.into(),
            SubmissionError::Settings(e) => Self::ServiceUnavailable(e.to_string()),
            SubmissionError::Store(e) => e.into(),
            SubmissionError::Cache(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<DraftError> for AppError {
    fn from(err: DraftError) -> Self {
        match err {
            DraftError::CustomerNotFound(id) => Self::NotFound(format!("customer {id}")),
            DraftError::Settings(e) => Self::ServiceUnavailable(e.to_string()),
            DraftError::Store(e) => e.into(),
            DraftError::Cache(e) => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gst_core::{InvoiceId, SettingsError, StateError, ValidationError};
    use http_body_util::BodyExt;

    #[test]
    fn rate_limit_maps_to_429() {
        let err: AppError = SubmissionError::RateLimitExceeded { limit: 50 }.into();
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(code, "RATE_LIMITED");
    }

    #[test]
    fn invalid_state_maps_to_conflict() {
        let err: AppError = SubmissionError::InvalidState(StateError::InvalidTransition {
            invoice_id: 1,
            status: "submitted".into(),
            operation: "submit",
        })
        .into();
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }

    #[test]
    fn unplaceable_tax_maps_to_422() {
        let err: AppError = SubmissionError::Validation(ValidationError::TaxJurisdictionMismatch {
            location: "invoice totals".into(),
            jurisdiction: "inter-state",
        })
        .into();
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "VALIDATION_ERROR");
    }

    #[test]
    fn missing_invoice_maps_to_404() {
        let err: AppError = SubmissionError::InvoiceNotFound(InvoiceId(9)).into();
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn configuration_errors_map_to_503() {
        let err: AppError = SubmissionError::Gst(GstError::Config(
            SettingsError::MissingCredential("username"),
        ))
        .into();
        assert_eq!(err.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);

        let err: AppError =
            SubmissionError::Settings(SettingsError::UnknownEnvironment("qa".into())).into();
        assert_eq!(err.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn transport_and_auth_errors_map_to_502() {
        let err: AppError = SubmissionError::Gst(GstError::Timeout {
            endpoint: "x".into(),
            elapsed_ms: 100,
        })
        .into();
        assert_eq!(err.status_and_code().0, StatusCode::BAD_GATEWAY);

        let err: AppError = SubmissionError::Gst(GstError::AuthRejected {
            details: "1005: Invalid Token".into(),
        })
        .into();
        assert_eq!(err.status_and_code().0, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn upstream_details_are_hidden() {
        let response = AppError::UpstreamError("secret-host:443 refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "UPSTREAM_ERROR");
        assert!(!body.error.message.contains("secret-host"));
    }
}
