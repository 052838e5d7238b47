//! # GST Submission Orchestrator
//!
//! Drives one portal operation end to end: rate limit, settings, invoice
//! load, lifecycle guard, payload, token, portal call, audit, persistence.
//!
//! ## Audit contract
//!
//! Every call that passes the rate limiter writes exactly one audit entry,
//! on every path:
//!
//! | Outcome                      | Audit status | Error code        | Invoice                |
//! |------------------------------|--------------|-------------------|------------------------|
//! | accepted                     | success      | -                 | submitted / cancelled  |
//! | rejected by the portal       | failed       | portal codes      | error fields set       |
//! | lifecycle guard refused      | failed       | `INVALID_STATE`   | untouched              |
//! | any other error              | failed       | `SYSTEM_ERROR`    | untouched              |
//!
//! The entry is written before the invoice is updated. If the update then
//! fails the error propagates without a second entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use gst_core::{
    Cancellation, InvoiceId, InvoiceStatus, NewTransaction, SettingsError, StateError,
    TransactionStatus, TransactionType, ValidationError, SYSTEM_ERROR_CODE,
};
use gst_irp_client::{
    build_payload, CancelPayload, CancelReason, GstError, IrpClient, PortalOutcome,
    PortalRejection, CANCEL_IRN_PATH, GENERATE_IRN_PATH, INVALID_TOKEN_CODE,
};

use crate::cache::{Cache, CacheError};
use crate::db::{InvoiceStore, StoreError};
use crate::rate_limit::{Admission, PortalRateLimiter};
use crate::settings::{LoadSettingsError, SettingsService};

/// Error code recorded when the lifecycle guard refuses an operation.
pub const INVALID_STATE_CODE: &str = "INVALID_STATE";

/// Error code recorded when a stored invoice cannot be turned into a payload.
pub const VALIDATION_ERROR_CODE: &str = "VALIDATION_ERROR";

/// Errors from portal operations. An authority rejection is not an error;
/// it is a [`SubmissionResponse`] with `accepted == false`.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("GST API rate limit exceeded ({limit} calls per hour)")]
    RateLimitExceeded { limit: u64 },

    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),

    #[error(transparent)]
    InvalidState(#[from] StateError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gst(#[from] GstError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl From<LoadSettingsError> for SubmissionError {
    fn from(err: LoadSettingsError) -> Self {
        match err {
            LoadSettingsError::Store(e) => Self::Store(e),
            LoadSettingsError::Invalid(e) => Self::Settings(e),
        }
    }
}

impl SubmissionError {
    /// Audit error code for a failure that produced no portal answer.
    fn audit_code(&self) -> &'static str {
        match self {
            Self::InvalidState(_) => INVALID_STATE_CODE,
            Self::Validation(_) => VALIDATION_ERROR_CODE,
            _ => SYSTEM_ERROR_CODE,
        }
    }
}

/// Result of a submit or cancel call that reached the portal.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResponse {
    pub invoice_id: InvoiceId,
    pub accepted: bool,
    /// Invoice status after the call.
    pub status: InvoiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Raw portal response body.
    pub response: Value,
}

impl SubmissionResponse {
    fn rejected(invoice_id: InvoiceId, status: InvoiceStatus, rejection: &PortalRejection, response: Value) -> Self {
        Self {
            invoice_id,
            accepted: false,
            status,
            irn: None,
            ack_no: None,
            ack_date: None,
            cancel_date: None,
            error_code: Some(rejection.error_code.clone()),
            error_message: Some(rejection.error_message.clone()),
            response,
        }
    }
}

/// Result of a forced token refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Bookkeeping for the single audit entry of one call.
struct Attempt {
    invoice_id: InvoiceId,
    transaction_type: TransactionType,
    endpoint: String,
    request: Value,
    logged: bool,
}

impl Attempt {
    fn new(invoice_id: InvoiceId, transaction_type: TransactionType, endpoint: String) -> Self {
        Self {
            invoice_id,
            transaction_type,
            endpoint,
            request: json!({}),
            logged: false,
        }
    }
}

/// Orchestrates portal operations against the store, cache and client.
#[derive(Clone)]
pub struct GstService {
    store: Arc<dyn InvoiceStore>,
    client: Arc<IrpClient>,
    settings: SettingsService,
    limiter: PortalRateLimiter,
}

impl std::fmt::Debug for GstService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GstService")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl GstService {
    pub fn new(store: Arc<dyn InvoiceStore>, cache: Arc<dyn Cache>, client: Arc<IrpClient>) -> Self {
        Self {
            settings: SettingsService::new(store.clone(), cache.clone()),
            limiter: PortalRateLimiter::new(cache),
            store,
            client,
        }
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn client(&self) -> &IrpClient {
        &self.client
    }

    /// Submit an invoice for IRN generation.
    ///
    /// # Errors
    ///
    /// [`SubmissionError::RateLimitExceeded`] before any network call and
    /// without an audit entry. Every other error is audited first.
    pub async fn submit_invoice(&self, id: InvoiceId) -> Result<SubmissionResponse, SubmissionError> {
        let mut attempt = Attempt::new(id, TransactionType::Generate, GENERATE_IRN_PATH.to_string());

        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(err) => return Err(self.fail(attempt, err.into()).await),
        };
        attempt.endpoint = settings.endpoint(GENERATE_IRN_PATH);
        self.admit(settings.rate_limit_per_hour).await?;

        match self.try_submit(id, &settings, &mut attempt).await {
            Ok(response) => Ok(response),
            Err(err) => Err(self.fail(attempt, err).await),
        }
    }

    async fn try_submit(
        &self,
        id: InvoiceId,
        settings: &gst_core::GstSettings,
        attempt: &mut Attempt,
    ) -> Result<SubmissionResponse, SubmissionError> {
        let document = self
            .store
            .load_document(id)
            .await?
            .ok_or(SubmissionError::InvoiceNotFound(id))?;

        if document.invoice.has_failed_attempt() {
            attempt.transaction_type = TransactionType::Retry;
        }
        document.invoice.ensure_submittable()?;

        let payload = build_payload(&document, settings)?;
        attempt.request = serde_json::to_value(&payload).unwrap_or_default();

        let token = self.client.token(settings, false).await?;
        let exchange = self.client.generate_irn(settings, &token, &payload).await?;
        attempt.request = exchange.request.clone();

        match exchange.outcome {
            PortalOutcome::Accepted(irn) => {
                self.log(attempt, exchange.response.clone(), TransactionStatus::Success, None)
                    .await?;
                if !self.store.mark_submitted(id, &irn).await? {
                    tracing::warn!(invoice_id = %id, "invoice left draft state during submission");
                }
                tracing::info!(invoice_id = %id, irn = %irn.irn, "IRN generated");
                Ok(SubmissionResponse {
                    invoice_id: id,
                    accepted: true,
                    status: InvoiceStatus::Submitted,
                    irn: Some(irn.irn),
                    ack_no: Some(irn.ack_no),
                    ack_date: irn.ack_date,
                    cancel_date: None,
                    error_code: None,
                    error_message: None,
                    response: exchange.response,
                })
            }
            PortalOutcome::Rejected(rejection) => {
                self.on_rejection(&rejection).await;
                self.log(
                    attempt,
                    exchange.response.clone(),
                    TransactionStatus::Failed,
                    Some(&rejection),
                )
                .await?;
                self.store
                    .mark_rejected(id, &rejection.error_code, &rejection.error_message)
                    .await?;
                tracing::warn!(
                    invoice_id = %id,
                    error_code = %rejection.error_code,
                    "IRN generation rejected"
                );
                Ok(SubmissionResponse::rejected(
                    id,
                    InvoiceStatus::Draft,
                    &rejection,
                    exchange.response,
                ))
            }
        }
    }

    /// Cancel the IRN of a submitted invoice.
    pub async fn cancel_invoice(
        &self,
        id: InvoiceId,
        reason: CancelReason,
        remark: &str,
    ) -> Result<SubmissionResponse, SubmissionError> {
        let mut attempt = Attempt::new(id, TransactionType::Cancel, CANCEL_IRN_PATH.to_string());

        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(err) => return Err(self.fail(attempt, err.into()).await),
        };
        attempt.endpoint = settings.endpoint(CANCEL_IRN_PATH);
        self.admit(settings.rate_limit_per_hour).await?;

        match self
            .try_cancel(id, reason, remark, &settings, &mut attempt)
            .await
        {
            Ok(response) => Ok(response),
            Err(err) => Err(self.fail(attempt, err).await),
        }
    }

    async fn try_cancel(
        &self,
        id: InvoiceId,
        reason: CancelReason,
        remark: &str,
        settings: &gst_core::GstSettings,
        attempt: &mut Attempt,
    ) -> Result<SubmissionResponse, SubmissionError> {
        let document = self
            .store
            .load_document(id)
            .await?
            .ok_or(SubmissionError::InvoiceNotFound(id))?;
        let irn = document.invoice.ensure_cancellable()?.irn.clone();

        let payload = CancelPayload::new(&irn, reason, remark);
        attempt.request = serde_json::to_value(&payload).unwrap_or_default();

        let token = self.client.token(settings, false).await?;
        let exchange = self.client.cancel_irn(settings, &token, &payload).await?;

        match exchange.outcome {
            PortalOutcome::Accepted(ack) => {
                self.log(attempt, exchange.response.clone(), TransactionStatus::Success, None)
                    .await?;
                let cancellation = Cancellation {
                    cancel_date: ack.cancel_date.clone(),
                    reason_code: reason.code(),
                    remark: payload.cnl_rem.clone(),
                };
                if !self.store.mark_cancelled(id, &cancellation).await? {
                    tracing::warn!(invoice_id = %id, "invoice left submitted state during cancellation");
                }
                tracing::info!(invoice_id = %id, irn = %ack.irn, "IRN cancelled");
                Ok(SubmissionResponse {
                    invoice_id: id,
                    accepted: true,
                    status: InvoiceStatus::Cancelled,
                    irn: Some(ack.irn),
                    ack_no: None,
                    ack_date: None,
                    cancel_date: ack.cancel_date,
                    error_code: None,
                    error_message: None,
                    response: exchange.response,
                })
            }
            PortalOutcome::Rejected(rejection) => {
                self.on_rejection(&rejection).await;
                self.log(
                    attempt,
                    exchange.response.clone(),
                    TransactionStatus::Failed,
                    Some(&rejection),
                )
                .await?;
                self.store
                    .record_error(id, &rejection.error_code, &rejection.error_message)
                    .await?;
                tracing::warn!(
                    invoice_id = %id,
                    error_code = %rejection.error_code,
                    "IRN cancellation rejected"
                );
                let mut response = SubmissionResponse::rejected(
                    id,
                    InvoiceStatus::Submitted,
                    &rejection,
                    exchange.response,
                );
                response.irn = Some(irn);
                Ok(response)
            }
        }
    }

    /// Force a new portal token, replacing any cached one.
    pub async fn refresh_token(&self) -> Result<TokenStatus, SubmissionError> {
        let settings = self.settings.load().await?;
        self.client.token(&settings, true).await?;
        Ok(TokenStatus {
            authenticated: true,
            expires_at: self.client.auth().expires_at().await,
        })
    }

    async fn admit(&self, limit: u64) -> Result<(), SubmissionError> {
        match self.limiter.admit(limit).await? {
            Admission::Allowed { .. } => Ok(()),
            Admission::Exceeded { limit, .. } => Err(SubmissionError::RateLimitExceeded { limit }),
        }
    }

    async fn on_rejection(&self, rejection: &PortalRejection) {
        if rejection.has_code(INVALID_TOKEN_CODE) {
            tracing::warn!("portal reported an invalid token; discarding cached token");
            self.client.auth().invalidate().await;
        }
    }

    async fn log(
        &self,
        attempt: &mut Attempt,
        response: Value,
        status: TransactionStatus,
        rejection: Option<&PortalRejection>,
    ) -> Result<(), StoreError> {
        let entry = self
            .store
            .append_transaction(NewTransaction {
                invoice_id: attempt.invoice_id,
                transaction_type: attempt.transaction_type,
                request_payload: attempt.request.clone(),
                response_payload: response,
                status,
                error_code: rejection.map(|r| r.error_code.clone()),
                error_message: rejection.map(|r| r.error_message.clone()),
                endpoint: attempt.endpoint.clone(),
            })
            .await?;
        attempt.logged = true;
        tracing::debug!(entry_id = %entry.id, entry_hash = %entry.entry_hash, "audit entry appended");
        Ok(())
    }

    /// Audit an error (unless already audited) and hand it back.
    async fn fail(&self, mut attempt: Attempt, err: SubmissionError) -> SubmissionError {
        let message = err.to_string();
        if !attempt.logged {
            let code = err.audit_code();
            let logged = self
                .store
                .append_transaction(NewTransaction {
                    invoice_id: attempt.invoice_id,
                    transaction_type: attempt.transaction_type,
                    request_payload: std::mem::take(&mut attempt.request),
                    response_payload: json!({ "error": message }),
                    status: TransactionStatus::Failed,
                    error_code: Some(code.to_string()),
                    error_message: Some(message.clone()),
                    endpoint: attempt.endpoint,
                })
                .await;
            if let Err(log_err) = logged {
                tracing::error!(
                    invoice_id = %attempt.invoice_id,
                    error = %log_err,
                    "failed to append audit entry"
                );
            }
        }

        match &err {
            SubmissionError::InvalidState(_)
            | SubmissionError::Validation(_)
            | SubmissionError::InvoiceNotFound(_) => {
                tracing::warn!(invoice_id = %attempt.invoice_id, error = %message, "GST operation refused");
            }
            _ => {
                tracing::error!(invoice_id = %attempt.invoice_id, error = %message, "GST operation failed");
            }
        }
        err
    }
}
