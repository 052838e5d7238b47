//! # Invoice Model
//!
//! Invoice header, line items, customer snapshot, and the legal artifacts
//! returned by the invoice registration portal.
//!
//! ## Lifecycle
//!
//! ```text
//! draft ──submit ok──▶ submitted ──cancel ok──▶ cancelled
//!   ▲        │
//!   └─reject─┘   (error_code / error_message populated)
//! ```
//!
//! `generated` is accepted from the store for rows written by older
//! tooling and is treated like `draft` for submission purposes.
//!
//! IRN and signed artifacts exist only on `submitted` and `cancelled`
//! invoices; [`Invoice::artifacts_consistent`] checks this.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, ValidationError};
use crate::identity::{CustomerId, InvoiceId};

/// Supply type as enumerated by the e-invoice schema (`TranDtls.SupTyp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupplyType {
    /// Business to business.
    #[serde(rename = "B2B")]
    B2b,
    /// Supply to SEZ with payment of tax.
    #[serde(rename = "SEZWP")]
    SezWithPayment,
    /// Supply to SEZ without payment of tax.
    #[serde(rename = "SEZWOP")]
    SezWithoutPayment,
    /// Export with payment of tax.
    #[serde(rename = "EXPWP")]
    ExportWithPayment,
    /// Export without payment of tax.
    #[serde(rename = "EXPWOP")]
    ExportWithoutPayment,
}

impl SupplyType {
    /// Schema code for this supply type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::B2b => "B2B",
            Self::SezWithPayment => "SEZWP",
            Self::SezWithoutPayment => "SEZWOP",
            Self::ExportWithPayment => "EXPWP",
            Self::ExportWithoutPayment => "EXPWOP",
        }
    }
}

impl std::str::FromStr for SupplyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "B2B" => Ok(Self::B2b),
            "SEZWP" => Ok(Self::SezWithPayment),
            "SEZWOP" => Ok(Self::SezWithoutPayment),
            "EXPWP" => Ok(Self::ExportWithPayment),
            "EXPWOP" => Ok(Self::ExportWithoutPayment),
            _ => Err(ValidationError::UnknownSupplyType(s.to_string())),
        }
    }
}

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Generated,
    Submitted,
    Cancelled,
}

impl InvoiceStatus {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Generated => "generated",
            Self::Submitted => "submitted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether an invoice in this status may be sent for IRN generation.
    pub fn can_submit(self) -> bool {
        matches!(self, Self::Draft | Self::Generated)
    }

    /// Whether an invoice in this status may have its IRN cancelled.
    pub fn can_cancel(self) -> bool {
        matches!(self, Self::Submitted)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "generated" => Ok(Self::Generated),
            "submitted" => Ok(Self::Submitted),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Aggregated invoice totals. Each bucket is the sum of the line items'
/// corresponding bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub total_quantity: f64,
    pub taxable_amount: f64,
    pub cgst_amount: f64,
    pub sgst_amount: f64,
    pub igst_amount: f64,
    pub grand_total: f64,
}

impl InvoiceTotals {
    /// Total GST across all buckets.
    pub fn total_tax(&self) -> f64 {
        self.cgst_amount + self.sgst_amount + self.igst_amount
    }
}

/// Legal artifacts issued by the portal on successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrnDetails {
    /// 64-character invoice reference number.
    pub irn: String,
    pub ack_no: String,
    pub ack_date: Option<String>,
    pub qr_code: Option<String>,
    pub signed_invoice: Option<String>,
    pub signed_qr_code: Option<String>,
}

/// Details recorded when an IRN is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancel_date: Option<String>,
    pub reason_code: u8,
    pub remark: String,
}

/// Customer snapshot joined onto the invoice header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub gstin: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Invoice header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub supply_type: SupplyType,
    pub customer_id: CustomerId,
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
    pub irn: Option<IrnDetails>,
    pub cancellation: Option<Cancellation>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Check the artifacts invariant: an IRN is present exactly when the
    /// invoice has been registered (`submitted`, or `cancelled` which keeps
    /// the IRN for audit).
    pub fn artifacts_consistent(&self) -> bool {
        let registered = matches!(
            self.status,
            InvoiceStatus::Submitted | InvoiceStatus::Cancelled
        );
        registered == self.irn.is_some()
    }

    /// Refuse submission unless the invoice is still a draft.
    pub fn ensure_submittable(&self) -> Result<(), StateError> {
        if self.status.can_submit() {
            Ok(())
        } else {
            Err(StateError::InvalidTransition {
                invoice_id: self.id.get(),
                status: self.status.to_string(),
                operation: "submit",
            })
        }
    }

    /// Refuse cancellation unless the invoice holds a live IRN.
    pub fn ensure_cancellable(&self) -> Result<&IrnDetails, StateError> {
        match (&self.irn, self.status.can_cancel()) {
            (Some(irn), true) => Ok(irn),
            _ => Err(StateError::InvalidTransition {
                invoice_id: self.id.get(),
                status: self.status.to_string(),
                operation: "cancel",
            }),
        }
    }

    /// Whether a previous submission attempt left an error on the invoice.
    pub fn has_failed_attempt(&self) -> bool {
        self.error_code.is_some()
    }
}

/// One product or service line of an invoice.
///
/// Exactly one of {CGST+SGST, IGST} carries tax, per the invoice's
/// inter-state determination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_no: u32,
    pub product_id: Option<i64>,
    pub description: String,
    pub hsn_code: String,
    pub is_service: bool,
    pub quantity: f64,
    pub unit: String,
    pub unit_rate: f64,
    pub discount: f64,
    pub taxable_amount: f64,
    pub gst_rate: f64,
    pub cgst_rate: f64,
    pub cgst_amount: f64,
    pub sgst_rate: f64,
    pub sgst_amount: f64,
    pub igst_rate: f64,
    pub igst_amount: f64,
    pub line_total: f64,
}

/// Invoice header joined with its customer and line items: the complete
/// input to payload construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub invoice: Invoice,
    pub customer: Customer,
    pub items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(status: InvoiceStatus, irn: Option<IrnDetails>) -> Invoice {
        Invoice {
            id: InvoiceId(1),
            invoice_number: "INV/2024-25/001".into(),
            invoice_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            supply_type: SupplyType::B2b,
            customer_id: CustomerId(1),
            totals: InvoiceTotals::default(),
            status,
            irn,
            cancellation: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn irn() -> IrnDetails {
        IrnDetails {
            irn: "a".repeat(64),
            ack_no: "112010000000001".into(),
            ack_date: None,
            qr_code: None,
            signed_invoice: None,
            signed_qr_code: None,
        }
    }

    #[test]
    fn supply_type_round_trips_schema_code() {
        for code in ["B2B", "SEZWP", "SEZWOP", "EXPWP", "EXPWOP"] {
            let parsed: SupplyType = code.parse().unwrap();
            assert_eq!(parsed.as_str(), code);
        }
        assert!("B2C".parse::<SupplyType>().is_err());
    }

    #[test]
    fn supply_type_serializes_as_schema_code() {
        let json = serde_json::to_string(&SupplyType::SezWithoutPayment).unwrap();
        assert_eq!(json, "\"SEZWOP\"");
    }

    #[test]
    fn artifacts_invariant() {
        assert!(invoice(InvoiceStatus::Draft, None).artifacts_consistent());
        assert!(invoice(InvoiceStatus::Submitted, Some(irn())).artifacts_consistent());
        assert!(invoice(InvoiceStatus::Cancelled, Some(irn())).artifacts_consistent());
        assert!(!invoice(InvoiceStatus::Submitted, None).artifacts_consistent());
        assert!(!invoice(InvoiceStatus::Draft, Some(irn())).artifacts_consistent());
    }

    #[test]
    fn submitted_invoice_cannot_be_resubmitted() {
        assert!(invoice(InvoiceStatus::Draft, None).ensure_submittable().is_ok());
        assert!(invoice(InvoiceStatus::Generated, None).ensure_submittable().is_ok());
        let err = invoice(InvoiceStatus::Submitted, Some(irn()))
            .ensure_submittable()
            .unwrap_err();
        assert!(err.to_string().contains("cannot submit"));
    }

    #[test]
    fn only_submitted_invoice_with_irn_is_cancellable() {
        assert!(invoice(InvoiceStatus::Submitted, Some(irn()))
            .ensure_cancellable()
            .is_ok());
        assert!(invoice(InvoiceStatus::Draft, None).ensure_cancellable().is_err());
        assert!(invoice(InvoiceStatus::Cancelled, Some(irn()))
            .ensure_cancellable()
            .is_err());
    }
}
