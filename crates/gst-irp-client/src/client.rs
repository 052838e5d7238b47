//! # IRP HTTP Client
//!
//! Wraps a `reqwest::Client` and an [`AuthManager`]. Settings are passed on
//! every call because they are loaded per request; the client itself holds
//! no credentials.
//!
//! ## Error Handling
//!
//! Timeouts, connect failures, non-2xx statuses, and non-JSON bodies map to
//! transport-class [`GstError`]s. A JSON envelope with `Status != 1` is an
//! authority decision and is returned as [`PortalOutcome::Rejected`] for
//! invoice calls, or as [`GstError::AuthRejected`] for authentication.
//!
//! Retries are not built in. A submission that reached the portal must not
//! be replayed blindly.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use gst_core::{GstSettings, IrnDetails};

use crate::auth::{AuthManager, TokenScope};
use crate::error::GstError;
use crate::payload::{CancelPayload, EInvoicePayload};
use crate::response::{data_text, Envelope, PortalExchange, PortalOutcome};

pub const AUTH_PATH: &str = "eivital/v1.04/auth";
pub const GENERATE_IRN_PATH: &str = "eicore/v1.03/Invoice";
pub const CANCEL_IRN_PATH: &str = "eicore/v1.03/Invoice/Cancel";

/// Longest response body excerpt kept in error values.
const BODY_EXCERPT_CHARS: usize = 2_000;

/// Acknowledgement of a cancelled IRN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelAck {
    pub irn: String,
    pub cancel_date: Option<String>,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    #[serde(rename = "UserName")]
    user_name: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
    #[serde(rename = "AppKey")]
    app_key: &'a str,
    #[serde(rename = "ForceRefreshAccessToken")]
    force_refresh_access_token: bool,
}

/// Client for the invoice registration portal.
#[derive(Debug)]
pub struct IrpClient {
    http: reqwest::Client,
    auth: AuthManager,
}

impl IrpClient {
    /// Build a client with a default request timeout. Per-call timeouts
    /// from [`GstSettings::timeout`] override it.
    pub fn new(timeout: Duration) -> Result<Self, GstError> {
        Self::with_auth(timeout, AuthManager::new())
    }

    pub fn with_auth(timeout: Duration, auth: AuthManager) -> Result<Self, GstError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .map_err(|e| GstError::Network {
                endpoint: "client_init".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, auth })
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Return a valid auth token, authenticating when none is cached.
    ///
    /// # Errors
    ///
    /// [`GstError::Config`] when credentials are blank (no request sent),
    /// transport errors, or [`GstError::AuthRejected`].
    pub async fn token(&self, settings: &GstSettings, force_refresh: bool) -> Result<String, GstError> {
        self.auth
            .token_with(TokenScope::of(settings), force_refresh, || {
                self.authenticate(settings, force_refresh)
            })
            .await
    }

    /// Call the auth endpoint. Does not touch the token cache.
    pub async fn authenticate(
        &self,
        settings: &GstSettings,
        force_refresh: bool,
    ) -> Result<String, GstError> {
        settings.validate_credentials()?;
        let endpoint = settings.endpoint(AUTH_PATH);
        let body = AuthRequest {
            user_name: &settings.username,
            password: settings.password.as_str(),
            app_key: &settings.client_id,
            force_refresh_access_token: force_refresh,
        };

        tracing::info!(endpoint = %endpoint, "authenticating with portal");
        let request = self
            .http
            .post(&endpoint)
            .timeout(settings.timeout)
            .header("client_id", &settings.client_id)
            .header("client_secret", settings.client_secret.as_str())
            .json(&body);
        let response = self.send_json(request, &endpoint, settings.timeout).await?;

        let envelope = Envelope::new(&response);
        if !envelope.is_success() {
            let rejection = envelope.rejection();
            tracing::warn!(error_code = %rejection.error_code, "portal authentication rejected");
            return Err(GstError::AuthRejected {
                details: rejection.pairs(),
            });
        }

        envelope
            .data()
            .and_then(|data| data_text(&data, "AuthToken"))
            .ok_or_else(|| GstError::InvalidResponse {
                endpoint,
                reason: "Status 1 without Data.AuthToken".into(),
            })
    }

    /// Submit an invoice for IRN generation.
    pub async fn generate_irn(
        &self,
        settings: &GstSettings,
        token: &str,
        payload: &EInvoicePayload,
    ) -> Result<PortalExchange<IrnDetails>, GstError> {
        let endpoint = settings.endpoint(GENERATE_IRN_PATH);
        let request_json = to_value(payload, &endpoint)?;

        let response = self
            .send_json(
                self.authorized(settings, token, &endpoint).json(&request_json),
                &endpoint,
                settings.timeout,
            )
            .await?;

        let outcome = interpret(&response, &endpoint, |data| {
            let irn = data_text(data, "Irn")?;
            Some(IrnDetails {
                irn,
                ack_no: data_text(data, "AckNo").unwrap_or_default(),
                ack_date: data_text(data, "AckDt"),
                qr_code: data_text(data, "QRCodeUrl"),
                signed_invoice: data_text(data, "SignedInvoice"),
                signed_qr_code: data_text(data, "SignedQRCode"),
            })
        })?;

        Ok(PortalExchange {
            endpoint,
            request: request_json,
            response,
            outcome,
        })
    }

    /// Cancel a previously issued IRN.
    pub async fn cancel_irn(
        &self,
        settings: &GstSettings,
        token: &str,
        payload: &CancelPayload,
    ) -> Result<PortalExchange<CancelAck>, GstError> {
        let endpoint = settings.endpoint(CANCEL_IRN_PATH);
        let request_json = to_value(payload, &endpoint)?;

        let response = self
            .send_json(
                self.authorized(settings, token, &endpoint).json(&request_json),
                &endpoint,
                settings.timeout,
            )
            .await?;

        let outcome = interpret(&response, &endpoint, |data| {
            Some(CancelAck {
                irn: data_text(data, "Irn").unwrap_or_else(|| payload.irn.clone()),
                cancel_date: data_text(data, "CancelDate"),
            })
        })?;

        Ok(PortalExchange {
            endpoint,
            request: request_json,
            response,
            outcome,
        })
    }

    fn authorized(&self, settings: &GstSettings, token: &str, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .post(endpoint)
            .timeout(settings.timeout)
            .header("user_name", &settings.username)
            .header("authtoken", token)
            .header("gstin", &settings.company.gstin)
            .header("client_id", &settings.client_id)
            .header("client_secret", settings.client_secret.as_str())
    }

    /// Send a request and require a 2xx JSON body.
    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Value, GstError> {
        let resp = request
            .send()
            .await
            .map_err(|e| transport_error(e, endpoint, timeout))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(e, endpoint, timeout))?;

        if !status.is_success() {
            tracing::warn!(endpoint = %endpoint, status = status.as_u16(), "portal returned error status");
            return Err(GstError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        serde_json::from_str(&body).map_err(|_| GstError::NonJson {
            endpoint: endpoint.to_string(),
            body: excerpt(&body),
        })
    }
}

/// Split an envelope into accepted data or an authority rejection.
fn interpret<T>(
    response: &Value,
    endpoint: &str,
    accept: impl FnOnce(&Value) -> Option<T>,
) -> Result<PortalOutcome<T>, GstError> {
    let envelope = Envelope::new(response);
    if !envelope.is_success() {
        return Ok(PortalOutcome::Rejected(envelope.rejection()));
    }
    envelope
        .data()
        .as_ref()
        .and_then(accept)
        .map(PortalOutcome::Accepted)
        .ok_or_else(|| GstError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: "Status 1 without the expected Data fields".into(),
        })
}

fn to_value<T: Serialize>(payload: &T, endpoint: &str) -> Result<Value, GstError> {
    serde_json::to_value(payload).map_err(|e| GstError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: format!("request payload not serializable: {e}"),
    })
}

fn transport_error(e: reqwest::Error, endpoint: &str, timeout: Duration) -> GstError {
    if e.is_timeout() {
        GstError::Timeout {
            endpoint: endpoint.to_string(),
            elapsed_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        GstError::Network {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
