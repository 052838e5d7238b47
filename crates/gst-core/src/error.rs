//! # Error Types
//!
//! Errors raised by the pure domain layer. All use `thiserror`.

use thiserror::Error;

/// Input failed a domain validation rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// State code is not a one- or two-digit GST state code.
    #[error("invalid GST state code: {0:?}")]
    InvalidStateCode(String),

    /// Supply type is not one of the authority's enumerated values.
    #[error("unknown supply type: {0:?}")]
    UnknownSupplyType(String),

    /// Invoice status string is not recognised.
    #[error("unknown invoice status: {0:?}")]
    UnknownStatus(String),

    /// Transaction type or status string is not recognised.
    #[error("unknown transaction {kind}: {value:?}")]
    UnknownTransactionField {
        /// Which field failed ("type" or "status").
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    /// An invoice must carry at least one line item.
    #[error("invoice has no line items")]
    EmptyInvoice,

    /// Stored tax sits in the bucket of the other jurisdiction, e.g. CGST on
    /// a supply that now resolves as inter-state.
    #[error("{location} carries tax that does not match a {jurisdiction} supply")]
    TaxJurisdictionMismatch {
        /// `"invoice totals"` or `"line <n>"`.
        location: String,
        jurisdiction: &'static str,
    },
}

/// Invoice lifecycle transition rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The invoice is not in a state that permits the requested operation.
    #[error("invoice {invoice_id} is {status}; cannot {operation}")]
    InvalidTransition {
        /// Invoice identifier.
        invoice_id: i64,
        /// Current status name.
        status: String,
        /// Operation that was refused (e.g. "submit", "cancel").
        operation: &'static str,
    },
}

/// GST integration settings could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A credential required for authentication is blank.
    #[error("GST credentials incomplete: {0} is not configured")]
    MissingCredential(&'static str),

    /// Base URL is absent (production requires an explicit URL) or unparseable.
    #[error("invalid GST API base URL {url:?}: {reason}")]
    InvalidBaseUrl {
        /// The configured value.
        url: String,
        /// Parse failure or policy reason.
        reason: String,
    },

    /// A numeric tuning setting could not be parsed.
    #[error("invalid value for setting {key}: {value:?}")]
    InvalidNumber {
        /// Setting key.
        key: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Environment is neither sandbox nor production.
    #[error("unknown GST environment {0:?} (expected sandbox or production)")]
    UnknownEnvironment(String),
}
