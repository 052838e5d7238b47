//! # gst-irp-client: Invoice Registration Portal client
//!
//! Typed async access to the three portal operations this system uses:
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `eivital/v1.04/auth` | Obtain an auth token |
//! | POST   | `eicore/v1.03/Invoice` | Generate IRN |
//! | POST   | `eicore/v1.03/Invoice/Cancel` | Cancel IRN |
//!
//! Plus the pure [`payload::build_payload`] transformation into the
//! portal's invoice schema.
//!
//! ## Architecture
//!
//! This crate performs no persistence and no rate limiting. It turns
//! portal answers into [`PortalExchange`] values (request, response,
//! outcome) that the caller records in its audit log.

pub mod auth;
pub mod client;
pub mod error;
pub mod payload;
pub mod response;

pub use auth::{AuthManager, TokenScope, TOKEN_TTL_HOURS};
pub use client::{CancelAck, IrpClient, AUTH_PATH, CANCEL_IRN_PATH, GENERATE_IRN_PATH};
pub use error::GstError;
pub use payload::{build_payload, CancelPayload, CancelReason, EInvoicePayload};
pub use response::{
    PortalErrorDetail, PortalExchange, PortalOutcome, PortalRejection, DUPLICATE_IRN_CODE,
    INVALID_TOKEN_CODE,
};
