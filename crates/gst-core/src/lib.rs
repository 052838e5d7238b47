//! # gst-core: Domain Types for GST e-Invoicing
//!
//! Leaf crate of the workspace. Defines the invoice model, the tax
//! bifurcation rule shared by invoice creation and payload construction,
//! fiscal-year numbering, GST integration settings, and the immutable
//! transaction audit chain.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `gst-*` crates.
//! - No I/O. Everything here is a pure function of its inputs, which keeps
//!   payload construction and tax computation deterministic.
//! - No `.unwrap()` outside tests.
//!
//! ## Numeric Coercion
//!
//! The tax authority rejects malformed numerics outright. Amounts flowing
//! toward the authority go through [`numeric::coerce_number`], which maps
//! anything missing, unparseable, or non-finite to `0.0`.

pub mod audit;
pub mod error;
pub mod fiscal;
pub mod identity;
pub mod invoice;
pub mod numeric;
pub mod settings;
pub mod tax;

pub use audit::{
    verify_chain, ChainIntegrity, NewTransaction, TransactionLogEntry, TransactionStatus,
    TransactionType, GENESIS_HASH, SYSTEM_ERROR_CODE,
};
pub use error::{SettingsError, StateError, ValidationError};
pub use fiscal::{format_invoice_number, sequence_bucket, FiscalYear};
pub use identity::{CustomerId, InvoiceId, StateCode};
pub use invoice::{
    Cancellation, Customer, Invoice, InvoiceDocument, InvoiceStatus, InvoiceTotals, IrnDetails,
    LineItem, SupplyType,
};
pub use numeric::{coerce_number, round2, CoerceNumber};
pub use settings::{CompanyProfile, GstEnvironment, GstSettings};
pub use tax::{aggregate, compute_line, LineInput, SupplyJurisdiction, TaxSplit};
