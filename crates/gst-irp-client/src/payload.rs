//! # E-Invoice Payload (schema 1.1)
//!
//! Pure transformation from an [`InvoiceDocument`] and the issuing
//! company's settings into the portal's invoice schema. No clock, no
//! randomness: the same inputs always serialize to the same bytes.
//!
//! Tax placement follows [`SupplyJurisdiction::determine`], the same
//! predicate used when the invoice was drafted. Inter-state payloads carry
//! IGST only; intra-state payloads carry CGST + SGST only, at both the item
//! and the `ValDtls` level. If the company or customer state changed after
//! drafting, the stored amounts no longer fit the jurisdiction and the
//! payload is refused rather than sent with the tax zeroed.

use serde::{Deserialize, Serialize};

use gst_core::numeric::{coerce_number, round2};
use gst_core::{
    GstSettings, InvoiceDocument, LineItem, StateCode, SupplyJurisdiction, ValidationError,
};

/// Schema version sent in every payload.
pub const SCHEMA_VERSION: &str = "1.1";

const MAX_DESCRIPTION_CHARS: usize = 300;
const MAX_UNIT_CHARS: usize = 3;
const MAX_CANCEL_REMARK_CHARS: usize = 100;
const DEFAULT_UNIT: &str = "NOS";
/// Buyer GSTIN placeholder for unregistered recipients.
const UNREGISTERED_BUYER: &str = "URP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EInvoicePayload {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "TranDtls")]
    pub tran_dtls: TranDtls,
    #[serde(rename = "DocDtls")]
    pub doc_dtls: DocDtls,
    #[serde(rename = "SellerDtls")]
    pub seller_dtls: PartyDtls,
    #[serde(rename = "BuyerDtls")]
    pub buyer_dtls: PartyDtls,
    #[serde(rename = "ItemList")]
    pub item_list: Vec<ItemDtls>,
    #[serde(rename = "ValDtls")]
    pub val_dtls: ValDtls,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranDtls {
    #[serde(rename = "TaxSch")]
    pub tax_sch: String,
    #[serde(rename = "SupTyp")]
    pub sup_typ: String,
    #[serde(rename = "RegRev")]
    pub reg_rev: String,
    #[serde(rename = "IgstOnIntra")]
    pub igst_on_intra: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocDtls {
    #[serde(rename = "Typ")]
    pub typ: String,
    #[serde(rename = "No")]
    pub no: String,
    /// `DD/MM/YYYY`.
    #[serde(rename = "Dt")]
    pub dt: String,
}

/// Seller or buyer block. `Pos` is set on the buyer only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDtls {
    #[serde(rename = "Gstin")]
    pub gstin: String,
    #[serde(rename = "LglNm")]
    pub lgl_nm: String,
    #[serde(rename = "TrdNm", skip_serializing_if = "Option::is_none")]
    pub trd_nm: Option<String>,
    #[serde(rename = "Pos", skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(rename = "Addr1")]
    pub addr1: String,
    #[serde(rename = "Addr2", skip_serializing_if = "Option::is_none")]
    pub addr2: Option<String>,
    #[serde(rename = "Loc")]
    pub loc: String,
    #[serde(rename = "Pin")]
    pub pin: u32,
    #[serde(rename = "Stcd")]
    pub stcd: String,
    #[serde(rename = "Ph", skip_serializing_if = "Option::is_none")]
    pub ph: Option<String>,
    #[serde(rename = "Em", skip_serializing_if = "Option::is_none")]
    pub em: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDtls {
    #[serde(rename = "SlNo")]
    pub sl_no: String,
    #[serde(rename = "PrdDesc")]
    pub prd_desc: String,
    #[serde(rename = "IsServc")]
    pub is_servc: String,
    #[serde(rename = "HsnCd")]
    pub hsn_cd: String,
    #[serde(rename = "Qty")]
    pub qty: f64,
    #[serde(rename = "Unit")]
    pub unit: String,
    #[serde(rename = "UnitPrice")]
    pub unit_price: f64,
    #[serde(rename = "TotAmt")]
    pub tot_amt: f64,
    #[serde(rename = "Discount")]
    pub discount: f64,
    #[serde(rename = "AssAmt")]
    pub ass_amt: f64,
    #[serde(rename = "GstRt")]
    pub gst_rt: f64,
    #[serde(rename = "IgstAmt")]
    pub igst_amt: f64,
    #[serde(rename = "CgstAmt")]
    pub cgst_amt: f64,
    #[serde(rename = "SgstAmt")]
    pub sgst_amt: f64,
    #[serde(rename = "TotItemVal")]
    pub tot_item_val: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValDtls {
    #[serde(rename = "AssVal")]
    pub ass_val: f64,
    #[serde(rename = "CgstVal")]
    pub cgst_val: f64,
    #[serde(rename = "SgstVal")]
    pub sgst_val: f64,
    #[serde(rename = "IgstVal")]
    pub igst_val: f64,
    #[serde(rename = "TotInvVal")]
    pub tot_inv_val: f64,
}

/// Build the portal payload for an invoice.
///
/// # Errors
///
/// [`ValidationError::TaxJurisdictionMismatch`] when the stored totals or
/// any line carry tax in the other jurisdiction's buckets.
pub fn build_payload(
    document: &InvoiceDocument,
    settings: &GstSettings,
) -> Result<EInvoicePayload, ValidationError> {
    let invoice = &document.invoice;
    let customer = &document.customer;
    let company = &settings.company;
    let company_state = settings.company_state_code();

    let jurisdiction = SupplyJurisdiction::determine(
        customer.state_code.as_deref(),
        customer.gstin.as_deref(),
        &company_state,
    );

    let totals = &invoice.totals;
    ensure_placement(
        jurisdiction,
        (totals.cgst_amount, totals.sgst_amount, totals.igst_amount),
        || "invoice totals".to_string(),
    )?;
    for (idx, item) in document.items.iter().enumerate() {
        ensure_placement(
            jurisdiction,
            (item.cgst_amount, item.sgst_amount, item.igst_amount),
            || format!("line {}", idx + 1),
        )?;
    }

    let buyer_state = customer
        .state_code
        .as_deref()
        .and_then(|raw| StateCode::parse(raw).ok())
        .or_else(|| customer.gstin.as_deref().and_then(StateCode::from_gstin))
        .map(|code| code.as_str().to_string())
        .unwrap_or_else(|| company_state.clone());

    let item_list = document
        .items
        .iter()
        .enumerate()
        .map(|(idx, item)| item_dtls(idx + 1, item, jurisdiction))
        .collect();

    let (cgst_val, sgst_val, igst_val) = place(
        jurisdiction,
        totals.cgst_amount,
        totals.sgst_amount,
        totals.igst_amount,
    );

    Ok(EInvoicePayload {
        version: SCHEMA_VERSION.to_string(),
        tran_dtls: TranDtls {
            tax_sch: "GST".into(),
            sup_typ: invoice.supply_type.as_str().into(),
            reg_rev: "N".into(),
            igst_on_intra: "N".into(),
        },
        doc_dtls: DocDtls {
            typ: "INV".into(),
            no: invoice.invoice_number.clone(),
            dt: invoice.invoice_date.format("%d/%m/%Y").to_string(),
        },
        seller_dtls: PartyDtls {
            gstin: company.gstin.clone(),
            lgl_nm: company.legal_name.clone(),
            trd_nm: non_blank(&company.trade_name),
            pos: None,
            addr1: company.address1.clone(),
            addr2: non_blank(&company.address2),
            loc: company.location.clone(),
            pin: pin(&company.pincode),
            stcd: company_state.clone(),
            ph: non_blank(&company.phone),
            em: non_blank(&company.email),
        },
        buyer_dtls: PartyDtls {
            gstin: customer
                .gstin
                .as_deref()
                .and_then(non_blank)
                .map(|g| g.to_ascii_uppercase())
                .unwrap_or_else(|| UNREGISTERED_BUYER.to_string()),
            lgl_nm: customer.name.clone(),
            trd_nm: customer.trade_name.as_deref().and_then(non_blank),
            pos: Some(buyer_state.clone()),
            addr1: customer.address1.clone().unwrap_or_default(),
            addr2: customer.address2.as_deref().and_then(non_blank),
            loc: customer.city.clone().unwrap_or_default(),
            pin: pin(customer.pincode.as_deref().unwrap_or_default()),
            stcd: buyer_state,
            ph: customer.phone.as_deref().and_then(non_blank),
            em: customer.email.as_deref().and_then(non_blank),
        },
        item_list,
        val_dtls: ValDtls {
            ass_val: money(totals.taxable_amount),
            cgst_val,
            sgst_val,
            igst_val,
            tot_inv_val: money(totals.grand_total),
        },
    })
}

fn ensure_placement(
    jurisdiction: SupplyJurisdiction,
    (cgst, sgst, igst): (f64, f64, f64),
    location: impl FnOnce() -> String,
) -> Result<(), ValidationError> {
    if jurisdiction.admits(cgst, sgst, igst) {
        return Ok(());
    }
    Err(ValidationError::TaxJurisdictionMismatch {
        location: location(),
        jurisdiction: jurisdiction.as_str(),
    })
}

fn item_dtls(sl_no: usize, item: &LineItem, jurisdiction: SupplyJurisdiction) -> ItemDtls {
    let qty = coerce_number(&item.quantity);
    let unit_price = coerce_number(&item.unit_rate);
    let (cgst_amt, sgst_amt, igst_amt) = place(
        jurisdiction,
        item.cgst_amount,
        item.sgst_amount,
        item.igst_amount,
    );
    let gst_rt = if jurisdiction.is_inter_state() {
        coerce_number(&item.igst_rate)
    } else {
        coerce_number(&item.cgst_rate) + coerce_number(&item.sgst_rate)
    };

    ItemDtls {
        sl_no: sl_no.to_string(),
        prd_desc: truncate_chars(&item.description, MAX_DESCRIPTION_CHARS),
        is_servc: if item.is_service { "Y" } else { "N" }.into(),
        hsn_cd: item.hsn_code.trim().to_string(),
        qty,
        unit: unit_code(&item.unit),
        unit_price,
        tot_amt: money(qty * unit_price),
        discount: money(item.discount),
        ass_amt: money(item.taxable_amount),
        gst_rt,
        igst_amt,
        cgst_amt,
        sgst_amt,
        tot_item_val: money(item.line_total),
    }
}

/// Place (cgst, sgst, igst) according to jurisdiction, zeroing the other
/// bucket.
fn place(jurisdiction: SupplyJurisdiction, cgst: f64, sgst: f64, igst: f64) -> (f64, f64, f64) {
    match jurisdiction {
        SupplyJurisdiction::InterState => (0.0, 0.0, money(igst)),
        SupplyJurisdiction::IntraState => (money(cgst), money(sgst), 0.0),
    }
}

fn money(value: f64) -> f64 {
    round2(coerce_number(&value))
}

fn unit_code(raw: &str) -> String {
    let unit = raw.trim();
    if unit.is_empty() {
        return DEFAULT_UNIT.to_string();
    }
    truncate_chars(&unit.to_uppercase(), MAX_UNIT_CHARS)
}

fn pin(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn truncate_chars(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}

/// IRN cancellation reasons accepted by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    Duplicate,
    DataEntryMistake,
    OrderCancelled,
    Other,
}

impl CancelReason {
    pub fn code(self) -> u8 {
        match self {
            Self::Duplicate => 1,
            Self::DataEntryMistake => 2,
            Self::OrderCancelled => 3,
            Self::Other => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Duplicate),
            2 => Some(Self::DataEntryMistake),
            3 => Some(Self::OrderCancelled),
            4 => Some(Self::Other),
            _ => None,
        }
    }
}

/// Body of `POST eicore/v1.03/Invoice/Cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPayload {
    #[serde(rename = "Irn")]
    pub irn: String,
    #[serde(rename = "CnlRsn")]
    pub cnl_rsn: String,
    #[serde(rename = "CnlRem")]
    pub cnl_rem: String,
}

impl CancelPayload {
    pub fn new(irn: &str, reason: CancelReason, remark: &str) -> Self {
        Self {
            irn: irn.to_string(),
            cnl_rsn: reason.code().to_string(),
            cnl_rem: truncate_chars(remark.trim(), MAX_CANCEL_REMARK_CHARS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use gst_core::{
        aggregate, compute_line, Customer, CustomerId, Invoice, InvoiceId, InvoiceStatus,
        LineInput, SupplyType,
    };
    use std::collections::HashMap;

    fn settings() -> GstSettings {
        settings_in_state("27")
    }

    fn settings_in_state(state_code: &str) -> GstSettings {
        let rows: HashMap<String, String> = [
            ("company_gstin", "27AAPFU0939F1ZV"),
            ("company_legal_name", "Ledgerline Steel Pvt Ltd"),
            ("company_address1", "Plot 4, MIDC"),
            ("company_location", "Pune"),
            ("company_pincode", "411019"),
            ("company_state_code", state_code),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        GstSettings::resolve(&rows, |_| None).unwrap()
    }

    fn document(customer_state: &str) -> InvoiceDocument {
        let jurisdiction = SupplyJurisdiction::determine(Some(customer_state), None, "27");
        let items: Vec<LineItem> = [
            ("TMT bar 12mm", 10.0, 520.0, 18.0),
            ("Binding wire", 2.0, 95.5, 12.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, (desc, qty, rate, gst))| {
            compute_line(
                i as u32 + 1,
                &LineInput {
                    product_id: None,
                    description: desc.to_string(),
                    hsn_code: "7214".into(),
                    is_service: false,
                    quantity: *qty,
                    unit: Some("kgs".into()),
                    unit_rate: *rate,
                    discount: 0.0,
                    gst_rate: *gst,
                },
                jurisdiction,
            )
        })
        .collect();
        let ts = Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap();
        InvoiceDocument {
            invoice: Invoice {
                id: InvoiceId(11),
                invoice_number: "INV/2024-25/011".into(),
                invoice_date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                supply_type: SupplyType::B2b,
                customer_id: CustomerId(3),
                totals: aggregate(&items),
                status: InvoiceStatus::Draft,
                irn: None,
                cancellation: None,
                error_code: None,
                error_message: None,
                created_at: ts,
                updated_at: ts,
            },
            customer: Customer {
                id: CustomerId(3),
                name: "Shree Builders".into(),
                trade_name: None,
                gstin: Some(format!("{customer_state}AABCS1429B1Z1")),
                address1: Some("12 MG Road".into()),
                address2: None,
                city: Some("Lucknow".into()),
                pincode: Some("226001".into()),
                state_code: Some(customer_state.into()),
                phone: None,
                email: None,
            },
            items,
        }
    }

    #[test]
    fn intra_state_populates_cgst_and_sgst_only() {
        let payload = build_payload(&document("27"), &settings()).unwrap();
        for item in &payload.item_list {
            assert_eq!(item.igst_amt, 0.0);
            assert!(item.cgst_amt > 0.0);
            assert_eq!(item.cgst_amt, item.sgst_amt);
        }
        assert_eq!(payload.item_list[0].gst_rt, 18.0);
        assert_eq!(payload.item_list[1].gst_rt, 12.0);
        assert_eq!(payload.val_dtls.igst_val, 0.0);
        assert_eq!(payload.val_dtls.cgst_val, 479.46);
    }

    #[test]
    fn inter_state_populates_igst_only() {
        let payload = build_payload(&document("09"), &settings()).unwrap();
        for item in &payload.item_list {
            assert_eq!(item.cgst_amt, 0.0);
            assert_eq!(item.sgst_amt, 0.0);
            assert!(item.igst_amt > 0.0);
        }
        assert_eq!(payload.item_list[0].gst_rt, 18.0);
        assert_eq!(payload.val_dtls.cgst_val, 0.0);
        assert_eq!(payload.val_dtls.sgst_val, 0.0);
        assert_eq!(payload.buyer_dtls.pos.as_deref(), Some("09"));
    }

    #[test]
    fn val_dtls_mirrors_stored_totals() {
        let doc = document("27");
        let payload = build_payload(&doc, &settings()).unwrap();
        assert_eq!(payload.val_dtls.ass_val, doc.invoice.totals.taxable_amount);
        assert_eq!(payload.val_dtls.tot_inv_val, doc.invoice.totals.grand_total);
    }

    #[test]
    fn document_fields_are_formatted() {
        let payload = build_payload(&document("27"), &settings()).unwrap();
        assert_eq!(payload.version, "1.1");
        assert_eq!(payload.doc_dtls.dt, "03/05/2024");
        assert_eq!(payload.tran_dtls.sup_typ, "B2B");
        assert_eq!(payload.seller_dtls.pin, 411019);
        assert_eq!(payload.item_list[0].unit, "KGS");
        assert_eq!(payload.item_list[0].sl_no, "1");
    }

    #[test]
    fn long_description_and_unit_are_truncated() {
        let mut doc = document("27");
        doc.items[0].description = "x".repeat(450);
        doc.items[0].unit = "boxes".into();
        doc.items[1].unit = "".into();
        let payload = build_payload(&doc, &settings()).unwrap();
        assert_eq!(payload.item_list[0].prd_desc.chars().count(), 300);
        assert_eq!(payload.item_list[0].unit, "BOX");
        assert_eq!(payload.item_list[1].unit, "NOS");
    }

    #[test]
    fn non_finite_numbers_become_zero() {
        let mut doc = document("27");
        doc.items[0].quantity = f64::NAN;
        doc.items[0].discount = f64::INFINITY;
        let payload = build_payload(&doc, &settings()).unwrap();
        assert_eq!(payload.item_list[0].qty, 0.0);
        assert_eq!(payload.item_list[0].tot_amt, 0.0);
        assert_eq!(payload.item_list[0].discount, 0.0);
        assert!(serde_json::to_string(&payload).is_ok());
    }

    #[test]
    fn payload_is_deterministic() {
        let doc = document("09");
        let s = settings();
        let a = serde_json::to_vec(&build_payload(&doc, &s).unwrap()).unwrap();
        let b = serde_json::to_vec(&build_payload(&doc, &s).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unregistered_buyer_uses_placeholder_gstin() {
        let mut doc = document("27");
        doc.customer.gstin = None;
        let payload = build_payload(&doc, &settings()).unwrap();
        assert_eq!(payload.buyer_dtls.gstin, "URP");
    }

    #[test]
    fn stale_jurisdiction_is_refused_instead_of_zeroing_tax() {
        // Drafted with company and customer both in 27, then the company
        // state setting changed to 29.
        let doc = document("27");
        let err = build_payload(&doc, &settings_in_state("29")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TaxJurisdictionMismatch {
                location: "invoice totals".into(),
                jurisdiction: "inter-state",
            }
        );
    }

    #[test]
    fn mismatched_line_is_named() {
        let mut doc = document("09");
        doc.items[1].cgst_amount = 5.0;
        let err = build_payload(&doc, &settings()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn cancel_payload_truncates_remark() {
        let body = CancelPayload::new(&"f".repeat(64), CancelReason::DataEntryMistake, &"r".repeat(140));
        assert_eq!(body.cnl_rsn, "2");
        assert_eq!(body.cnl_rem.len(), 100);
        assert_eq!(CancelReason::from_code(4), Some(CancelReason::Other));
        assert_eq!(CancelReason::from_code(5), None);
    }
}
