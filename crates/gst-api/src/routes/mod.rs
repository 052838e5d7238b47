//! # API Route Modules
//!
//! - `invoices`: draft creation, lookup, IRN submission and cancellation,
//!   per-invoice audit trail.
//! - `gst`: integration settings, token refresh, audit chain verification.

pub mod gst;
pub mod invoices;
