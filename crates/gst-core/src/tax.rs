//! # Tax Bifurcation
//!
//! GST on a supply is levied either as IGST (inter-state) or as an equal
//! CGST + SGST split (intra-state). The branch is chosen by comparing the
//! customer's state code with the issuing company's registered state code.
//!
//! [`SupplyJurisdiction::determine`] is the single predicate for this
//! decision. Invoice creation uses it to compute stored amounts and the
//! payload builder uses it to place amounts in the authority schema, so the
//! two can never disagree on which bucket is populated.

use serde::{Deserialize, Serialize};

use crate::identity::StateCode;
use crate::invoice::{InvoiceTotals, LineItem};
use crate::numeric::{coerce_number, round2};

/// Whether a supply crosses a state boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyJurisdiction {
    /// Same state: CGST + SGST.
    IntraState,
    /// Different states: IGST.
    InterState,
}

impl SupplyJurisdiction {
    /// Decide the jurisdiction of a supply.
    ///
    /// The customer's state comes from `customer_state_code`, falling back
    /// to the leading digits of `customer_gstin`. If either side's state
    /// cannot be established the supply is treated as intra-state.
    pub fn determine(
        customer_state_code: Option<&str>,
        customer_gstin: Option<&str>,
        company_state_code: &str,
    ) -> Self {
        let customer = customer_state_code
            .and_then(|raw| StateCode::parse(raw).ok())
            .or_else(|| customer_gstin.and_then(StateCode::from_gstin));
        let company = StateCode::parse(company_state_code).ok();

        match (customer, company) {
            (Some(customer), Some(company)) if customer != company => Self::InterState,
            _ => Self::IntraState,
        }
    }

    /// Whether IGST applies.
    pub fn is_inter_state(self) -> bool {
        matches!(self, Self::InterState)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IntraState => "intra-state",
            Self::InterState => "inter-state",
        }
    }

    /// Whether the amounts leave the other jurisdiction's buckets empty.
    /// All-zero amounts (nil-rated supplies) fit either jurisdiction.
    pub fn admits(self, cgst: f64, sgst: f64, igst: f64) -> bool {
        let nonzero = |v: f64| round2(coerce_number(&v)) != 0.0;
        match self {
            Self::IntraState => !nonzero(igst),
            Self::InterState => !nonzero(cgst) && !nonzero(sgst),
        }
    }
}

/// Rates after bifurcating a combined GST rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxSplit {
    pub cgst_rate: f64,
    pub sgst_rate: f64,
    pub igst_rate: f64,
}

impl TaxSplit {
    /// Split a combined GST rate for the given jurisdiction.
    pub fn of(gst_rate: f64, jurisdiction: SupplyJurisdiction) -> Self {
        let rate = coerce_number(&gst_rate).max(0.0);
        match jurisdiction {
            SupplyJurisdiction::InterState => Self {
                cgst_rate: 0.0,
                sgst_rate: 0.0,
                igst_rate: rate,
            },
            SupplyJurisdiction::IntraState => Self {
                cgst_rate: rate / 2.0,
                sgst_rate: rate / 2.0,
                igst_rate: 0.0,
            },
        }
    }
}

/// Line item as entered, before tax computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    #[serde(default)]
    pub product_id: Option<i64>,
    pub description: String,
    pub hsn_code: String,
    #[serde(default)]
    pub is_service: bool,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub unit_rate: f64,
    #[serde(default)]
    pub discount: f64,
    /// Combined GST rate in percent (e.g. `18.0`).
    pub gst_rate: f64,
}

/// Compute a line's taxable value and tax amounts.
///
/// Taxable value is `quantity × unit_rate − discount`, floored at zero.
/// Amounts are rounded to two decimals.
pub fn compute_line(line_no: u32, input: &LineInput, jurisdiction: SupplyJurisdiction) -> LineItem {
    let quantity = coerce_number(&input.quantity);
    let unit_rate = coerce_number(&input.unit_rate);
    let discount = coerce_number(&input.discount);
    let taxable = round2((quantity * unit_rate - discount).max(0.0));

    let split = TaxSplit::of(input.gst_rate, jurisdiction);
    let cgst_amount = round2(taxable * split.cgst_rate / 100.0);
    let sgst_amount = round2(taxable * split.sgst_rate / 100.0);
    let igst_amount = round2(taxable * split.igst_rate / 100.0);

    LineItem {
        line_no,
        product_id: input.product_id,
        description: input.description.clone(),
        hsn_code: input.hsn_code.trim().to_string(),
        is_service: input.is_service,
        quantity,
        unit: input
            .unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or("NOS")
            .to_string(),
        unit_rate,
        discount,
        taxable_amount: taxable,
        gst_rate: split.cgst_rate + split.sgst_rate + split.igst_rate,
        cgst_rate: split.cgst_rate,
        cgst_amount,
        sgst_rate: split.sgst_rate,
        sgst_amount,
        igst_rate: split.igst_rate,
        igst_amount,
        line_total: round2(taxable + cgst_amount + sgst_amount + igst_amount),
    }
}

/// Sum line items into invoice totals.
pub fn aggregate(items: &[LineItem]) -> InvoiceTotals {
    let sum = items.iter().fold(InvoiceTotals::default(), |acc, item| InvoiceTotals {
        total_quantity: acc.total_quantity + item.quantity,
        taxable_amount: acc.taxable_amount + item.taxable_amount,
        cgst_amount: acc.cgst_amount + item.cgst_amount,
        sgst_amount: acc.sgst_amount + item.sgst_amount,
        igst_amount: acc.igst_amount + item.igst_amount,
        grand_total: acc.grand_total + item.line_total,
    });

    InvoiceTotals {
        total_quantity: round2(sum.total_quantity),
        taxable_amount: round2(sum.taxable_amount),
        cgst_amount: round2(sum.cgst_amount),
        sgst_amount: round2(sum.sgst_amount),
        igst_amount: round2(sum.igst_amount),
        grand_total: round2(sum.grand_total),
    }
}
