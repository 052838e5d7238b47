//! # Invoice Drafting
//!
//! Number allocation and draft creation. Tax amounts are computed here,
//! once, with the same jurisdiction rule the payload builder applies at
//! submission time.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use gst_core::{
    aggregate, compute_line, format_invoice_number, sequence_bucket, CustomerId, FiscalYear,
    InvoiceDocument, LineInput, SettingsError, SupplyJurisdiction, SupplyType,
};

use crate::cache::{Cache, CacheError};
use crate::db::{InvoiceStore, NewInvoice, StoreError};
use crate::extractors::Validate;
use crate::settings::{LoadSettingsError, SettingsService};

/// Lifetime of a sequence counter key.
pub const SEQUENCE_TTL_SECS: u64 = 31_536_000;

/// Errors from draft creation.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invoice number allocation failed: {0}")]
    Cache(#[from] CacheError),
}

impl From<LoadSettingsError> for DraftError {
    fn from(err: LoadSettingsError) -> Self {
        match err {
            LoadSettingsError::Store(e) => Self::Store(e),
            LoadSettingsError::Invalid(e) => Self::Settings(e),
        }
    }
}

/// Allocate the next invoice number for `date`.
///
/// One counter per fiscal year, expiring a year after first use. The
/// earliest first use is April 1, so the key outlives its fiscal year. Increments are atomic, so concurrent callers never share a number.
pub async fn allocate_invoice_number(cache: &dyn Cache, date: NaiveDate) -> Result<String, CacheError> {
    let key = sequence_bucket(date);
    let raw = cache.increment(&key).await?;
    if raw == 1 {
        cache.expire(&key, SEQUENCE_TTL_SECS).await?;
    }
    let sequence = u64::try_from(raw).map_err(|_| CacheError::NotAnInteger { key: key.clone() })?;
    Ok(format_invoice_number(FiscalYear::containing(date), sequence))
}

fn default_supply_type() -> SupplyType {
    SupplyType::B2b
}

/// Body of `POST /v1/invoices`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: CustomerId,
    /// Defaults to today (UTC).
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default = "default_supply_type")]
    pub supply_type: SupplyType,
    pub items: Vec<LineInput>,
}

impl Validate for CreateInvoiceRequest {
    fn validate(&self) -> Result<(), String> {
        if self.items.is_empty() {
            return Err(gst_core::ValidationError::EmptyInvoice.to_string());
        }
        for (idx, item) in self.items.iter().enumerate() {
            let line = idx + 1;
            if item.description.trim().is_empty() {
                return Err(format!("line {line}: description is required"));
            }
            if item.hsn_code.trim().is_empty() {
                return Err(format!("line {line}: hsn_code is required"));
            }
            if !(item.quantity.is_finite() && item.quantity > 0.0) {
                return Err(format!("line {line}: quantity must be positive"));
            }
            if !(item.unit_rate.is_finite() && item.unit_rate >= 0.0) {
                return Err(format!("line {line}: unit_rate must not be negative"));
            }
            if !(item.discount.is_finite() && item.discount >= 0.0) {
                return Err(format!("line {line}: discount must not be negative"));
            }
            if !(item.gst_rate.is_finite() && (0.0..=100.0).contains(&item.gst_rate)) {
                return Err(format!("line {line}: gst_rate must be between 0 and 100"));
            }
        }
        Ok(())
    }
}

/// Drafting service: numbering, tax computation, persistence.
#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn InvoiceStore>,
    cache: Arc<dyn Cache>,
    settings: SettingsService,
}

impl std::fmt::Debug for InvoiceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceService").finish_non_exhaustive()
    }
}

impl InvoiceService {
    pub fn new(store: Arc<dyn InvoiceStore>, cache: Arc<dyn Cache>, settings: SettingsService) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    /// Create a draft invoice with computed line and header totals.
    pub async fn create_draft(&self, req: CreateInvoiceRequest) -> Result<InvoiceDocument, DraftError> {
        let customer = self
            .store
            .get_customer(req.customer_id)
            .await?
            .ok_or(DraftError::CustomerNotFound(req.customer_id))?;

        let settings = self.settings.load().await?;
        let jurisdiction = SupplyJurisdiction::determine(
            customer.state_code.as_deref(),
            customer.gstin.as_deref(),
            &settings.company_state_code(),
        );

        let items: Vec<_> = req
            .items
            .iter()
            .zip(1u32..)
            .map(|(input, line_no)| compute_line(line_no, input, jurisdiction))
            .collect();
        let totals = aggregate(&items);

        let invoice_date = req.invoice_date.unwrap_or_else(|| Utc::now().date_naive());
        let invoice_number = allocate_invoice_number(self.cache.as_ref(), invoice_date).await?;

        let document = self
            .store
            .create_invoice(NewInvoice {
                invoice_number,
                invoice_date,
                supply_type: req.supply_type,
                customer_id: customer.id,
                totals,
                items,
            })
            .await?;

        tracing::info!(
            invoice_id = %document.invoice.id,
            invoice_number = %document.invoice.invoice_number,
            inter_state = jurisdiction.is_inter_state(),
            grand_total = document.invoice.totals.grand_total,
            "draft invoice created"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::MemoryInvoiceStore;
    use gst_core::settings::keys;
    use gst_core::{Customer, InvoiceStatus};
    use std::collections::{HashMap, HashSet};

    fn customer(id: i64, state: &str) -> Customer {
        Customer {
            id: CustomerId(id),
            name: format!("Customer {id}"),
            trade_name: None,
            gstin: None,
            address1: None,
            address2: None,
            city: None,
            pincode: None,
            state_code: Some(state.into()),
            phone: None,
            email: None,
        }
    }

    fn line(rate: f64, qty: f64, gst: f64) -> LineInput {
        LineInput {
            product_id: None,
            description: "Widget".into(),
            hsn_code: "8471".into(),
            is_service: false,
            quantity: qty,
            unit: None,
            unit_rate: rate,
            discount: 0.0,
            gst_rate: gst,
        }
    }

    async fn service() -> (InvoiceService, MemoryInvoiceStore, MemoryCache) {
        let store = MemoryInvoiceStore::new();
        let cache = MemoryCache::new();
        store.insert_customer(customer(1, "27"));
        store.insert_customer(customer(2, "29"));
        let mut rows = HashMap::new();
        rows.insert(keys::COMPANY_STATE_CODE.to_string(), "27".to_string());
        rows.insert(
            keys::BASE_URL.to_string(),
            "https://portal.example".to_string(),
        );
        store.upsert_settings(&rows).await.unwrap();

        let store_arc: Arc<dyn InvoiceStore> = Arc::new(store.clone());
        let cache_arc: Arc<dyn Cache> = Arc::new(cache.clone());
        let settings = SettingsService::new(store_arc.clone(), cache_arc.clone());
        (
            InvoiceService::new(store_arc, cache_arc, settings),
            store,
            cache,
        )
    }

    fn request(customer: i64, date: &str) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            customer_id: CustomerId(customer),
            invoice_date: Some(date.parse().unwrap()),
            supply_type: SupplyType::B2b,
            items: vec![line(1000.0, 2.0, 18.0)],
        }
    }

    #[tokio::test]
    async fn intra_state_draft_splits_tax() {
        let (svc, _, _) = service().await;
        let doc = svc.create_draft(request(1, "2024-05-10")).await.unwrap();
        let totals = doc.invoice.totals;
        assert_eq!(doc.invoice.status, InvoiceStatus::Draft);
        assert_eq!(doc.invoice.invoice_number, "INV/2024-25/001");
        assert_eq!(totals.taxable_amount, 2000.0);
        assert_eq!(totals.cgst_amount, 180.0);
        assert_eq!(totals.sgst_amount, 180.0);
        assert_eq!(totals.igst_amount, 0.0);
        assert_eq!(totals.grand_total, 2360.0);
    }

    #[tokio::test]
    async fn inter_state_draft_uses_igst() {
        let (svc, _, _) = service().await;
        let doc = svc.create_draft(request(2, "2024-05-10")).await.unwrap();
        let totals = doc.invoice.totals;
        assert_eq!(totals.igst_amount, 360.0);
        assert_eq!(totals.cgst_amount + totals.sgst_amount, 0.0);
        assert_eq!(doc.items[0].igst_rate, 18.0);
    }

    #[tokio::test]
    async fn numbering_continues_across_months_of_a_fiscal_year() {
        let (svc, _, _) = service().await;
        let april = svc.create_draft(request(1, "2024-04-10")).await.unwrap();
        let may = svc.create_draft(request(1, "2024-05-10")).await.unwrap();
        let march = svc.create_draft(request(2, "2025-03-31")).await.unwrap();
        let next_year = svc.create_draft(request(1, "2025-04-01")).await.unwrap();
        assert_eq!(april.invoice.invoice_number, "INV/2024-25/001");
        assert_eq!(may.invoice.invoice_number, "INV/2024-25/002");
        assert_eq!(march.invoice.invoice_number, "INV/2024-25/003");
        assert_eq!(next_year.invoice.invoice_number, "INV/2025-26/001");
    }

    #[tokio::test]
    async fn unknown_customer_is_rejected() {
        let (svc, _, _) = service().await;
        let err = svc.create_draft(request(99, "2024-05-10")).await.unwrap_err();
        assert!(matches!(err, DraftError::CustomerNotFound(CustomerId(99))));
    }

    #[tokio::test]
    async fn sequence_counter_expires_after_a_year() {
        let cache = MemoryCache::new();
        let date: NaiveDate = "2025-01-15".parse().unwrap();
        let number = allocate_invoice_number(&cache, date).await.unwrap();
        assert_eq!(number, "INV/2024-25/001");
        let ttl = cache.ttl("invoice_seq:2024-25").unwrap();
        assert!(ttl.as_secs() > SEQUENCE_TTL_SECS - 60);
    }

    #[tokio::test]
    async fn concurrent_allocation_yields_distinct_numbers() {
        let cache = Arc::new(MemoryCache::new());
        let date: NaiveDate = "2024-07-01".parse().unwrap();

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { allocate_invoice_number(cache.as_ref(), date).await })
            })
            .collect();

        let mut numbers = HashSet::new();
        for handle in handles {
            numbers.insert(handle.await.unwrap().unwrap());
        }
        assert_eq!(numbers.len(), 40);
        for seq in 1..=40 {
            assert!(numbers.contains(&format!("INV/2024-25/{seq:03}")));
        }
    }

    #[test]
    fn validation_rejects_bad_lines() {
        let mut req = request(1, "2024-05-10");
        assert!(req.validate().is_ok());

        req.items[0].quantity = 0.0;
        assert!(req.validate().unwrap_err().contains("quantity"));

        req.items.clear();
        assert!(req.validate().is_err());
    }
}
