//! IRP client error types.

use gst_core::SettingsError;

/// Errors from portal calls.
///
/// Transport-class errors ([`GstError::is_transport`]) mean no
/// authoritative answer was received. An authority rejection of an invoice
/// is not an error; it is returned as a [`crate::response::PortalOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum GstError {
    /// Settings are missing or invalid; no request was sent.
    #[error("GST configuration error: {0}")]
    Config(#[from] SettingsError),

    /// DNS, connect, or mid-body transport failure.
    #[error("network unreachable calling {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    /// Request exceeded the configured timeout.
    #[error("request to {endpoint} timed out after {elapsed_ms}ms")]
    Timeout { endpoint: String, elapsed_ms: u64 },

    /// Portal returned a non-2xx status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Portal returned a 2xx body that is not JSON.
    #[error("{endpoint} returned a non-JSON body: {body}")]
    NonJson { endpoint: String, body: String },

    /// Authentication was refused by the portal.
    #[error("authentication failed: {details}")]
    AuthRejected { details: String },

    /// JSON body missing fields required for the operation.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl GstError {
    /// Whether the failure happened before any authoritative response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::HttpStatus { .. } | Self::NonJson { .. }
        )
    }

    /// Whether the failure is a local configuration problem.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        let http = GstError::HttpStatus {
            endpoint: "auth".into(),
            status: 503,
            body: "down".into(),
        };
        assert!(http.is_transport());
        assert_eq!(http.status(), Some(503));
        assert!(http.to_string().contains("503"));

        let rejected = GstError::AuthRejected {
            details: "AUTH001: bad password".into(),
        };
        assert!(!rejected.is_transport());

        let config = GstError::from(SettingsError::MissingCredential("username"));
        assert!(config.is_config());
        assert!(!config.is_transport());
    }
}
