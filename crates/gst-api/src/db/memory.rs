//! In-memory [`InvoiceStore`].
//!
//! All tables sit behind one `parking_lot::Mutex` so that multi-step
//! operations (header + items, chain head + append) are atomic. The lock
//! is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use gst_core::{
    Cancellation, Customer, CustomerId, Invoice, InvoiceDocument, InvoiceId, InvoiceStatus,
    IrnDetails, LineItem, NewTransaction, TransactionLogEntry, GENESIS_HASH,
};

use super::{InvoiceStore, NewInvoice, StoreError};

#[derive(Debug, Default)]
struct Tables {
    customers: HashMap<CustomerId, Customer>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    items: HashMap<InvoiceId, Vec<LineItem>>,
    settings: HashMap<String, String>,
    transactions: Vec<TransactionLogEntry>,
    next_invoice_id: i64,
}

/// Cloneable in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryInvoiceStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a customer. Customers are otherwise managed outside this service.
    pub fn insert_customer(&self, customer: Customer) {
        self.tables.lock().customers.insert(customer.id, customer);
    }

    fn update<F>(&self, id: InvoiceId, apply: F) -> bool
    where
        F: FnOnce(&mut Invoice) -> bool,
    {
        let mut tables = self.tables.lock();
        match tables.invoices.get_mut(&id) {
            Some(invoice) => {
                let changed = apply(invoice);
                if changed {
                    invoice.updated_at = Utc::now();
                }
                changed
            }
            None => false,
        }
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.tables.lock().customers.get(&id).cloned())
    }

    async fn create_invoice(&self, draft: NewInvoice) -> Result<InvoiceDocument, StoreError> {
        let mut tables = self.tables.lock();
        let customer = tables
            .customers
            .get(&draft.customer_id)
            .cloned()
            .ok_or(StoreError::CustomerNotFound(draft.customer_id))?;
        if tables
            .invoices
            .values()
            .any(|inv| inv.invoice_number == draft.invoice_number)
        {
            return Err(StoreError::DuplicateNumber(draft.invoice_number));
        }

        tables.next_invoice_id += 1;
        let id = InvoiceId(tables.next_invoice_id);
        let now = Utc::now();
        let invoice = Invoice {
            id,
            invoice_number: draft.invoice_number,
            invoice_date: draft.invoice_date,
            supply_type: draft.supply_type,
            customer_id: draft.customer_id,
            totals: draft.totals,
            status: InvoiceStatus::Draft,
            irn: None,
            cancellation: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        tables.invoices.insert(id, invoice.clone());
        tables.items.insert(id, draft.items.clone());

        Ok(InvoiceDocument {
            invoice,
            customer,
            items: draft.items,
        })
    }

    async fn load_document(&self, id: InvoiceId) -> Result<Option<InvoiceDocument>, StoreError> {
        let tables = self.tables.lock();
        let Some(invoice) = tables.invoices.get(&id).cloned() else {
            return Ok(None);
        };
        let customer = tables
            .customers
            .get(&invoice.customer_id)
            .cloned()
            .ok_or_else(|| StoreError::Corrupt {
                table: "invoices",
                reason: format!("invoice {id} references missing customer {}", invoice.customer_id),
            })?;
        let mut items = tables.items.get(&id).cloned().unwrap_or_default();
        items.sort_by_key(|item| item.line_no);
        Ok(Some(InvoiceDocument {
            invoice,
            customer,
            items,
        }))
    }

    async fn mark_submitted(&self, id: InvoiceId, irn: &IrnDetails) -> Result<bool, StoreError> {
        Ok(self.update(id, |invoice| {
            if !invoice.status.can_submit() {
                return false;
            }
            invoice.status = InvoiceStatus::Submitted;
            invoice.irn = Some(irn.clone());
            invoice.error_code = None;
            invoice.error_message = None;
            true
        }))
    }

    async fn mark_rejected(
        &self,
        id: InvoiceId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), StoreError> {
        self.update(id, |invoice| {
            if !invoice.status.can_submit() {
                return false;
            }
            invoice.status = InvoiceStatus::Draft;
            invoice.error_code = Some(error_code.to_string());
            invoice.error_message = Some(error_message.to_string());
            true
        });
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        id: InvoiceId,
        cancellation: &Cancellation,
    ) -> Result<bool, StoreError> {
        Ok(self.update(id, |invoice| {
            if !invoice.status.can_cancel() {
                return false;
            }
            invoice.status = InvoiceStatus::Cancelled;
            invoice.cancellation = Some(cancellation.clone());
            invoice.error_code = None;
            invoice.error_message = None;
            true
        }))
    }

    async fn record_error(
        &self,
        id: InvoiceId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), StoreError> {
        self.update(id, |invoice| {
            invoice.error_code = Some(error_code.to_string());
            invoice.error_message = Some(error_message.to_string());
            true
        });
        Ok(())
    }

    async fn load_settings(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.tables.lock().settings.clone())
    }

    async fn upsert_settings(&self, rows: &HashMap<String, String>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        for (key, value) in rows {
            tables.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn append_transaction(&self, tx: NewTransaction) -> Result<TransactionLogEntry, StoreError> {
        let mut tables = self.tables.lock();
        let previous = tables
            .transactions
            .last()
            .map(|entry| entry.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let entry = tx.seal(&previous, Utc::now());
        tables.transactions.push(entry.clone());
        Ok(entry)
    }

    async fn transactions_for(&self, id: InvoiceId) -> Result<Vec<TransactionLogEntry>, StoreError> {
        Ok(self
            .tables
            .lock()
            .transactions
            .iter()
            .filter(|entry| entry.invoice_id == id)
            .cloned()
            .collect())
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionLogEntry>, StoreError> {
        Ok(self.tables.lock().transactions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gst_core::{
        verify_chain, InvoiceTotals, SupplyType, TransactionStatus, TransactionType,
    };
    use serde_json::json;

    fn customer() -> Customer {
        Customer {
            id: CustomerId(7),
            name: "Acme Traders".into(),
            trade_name: None,
            gstin: Some("29AABCA1234A1Z5".into()),
            address1: Some("1 MG Road".into()),
            address2: None,
            city: Some("Bengaluru".into()),
            pincode: Some("560001".into()),
            state_code: Some("29".into()),
            phone: None,
            email: None,
        }
    }

    fn draft(number: &str) -> NewInvoice {
        NewInvoice {
            invoice_number: number.into(),
            invoice_date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            supply_type: SupplyType::B2b,
            customer_id: CustomerId(7),
            totals: InvoiceTotals::default(),
            items: Vec::new(),
        }
    }

    fn irn() -> IrnDetails {
        IrnDetails {
            irn: "f".repeat(64),
            ack_no: "1".into(),
            ack_date: None,
            qr_code: None,
            signed_invoice: None,
            signed_qr_code: None,
        }
    }

    fn tx(id: InvoiceId) -> NewTransaction {
        NewTransaction {
            invoice_id: id,
            transaction_type: TransactionType::Generate,
            request_payload: json!({"a": 1}),
            response_payload: json!({"Status": 1}),
            status: TransactionStatus::Success,
            error_code: None,
            error_message: None,
            endpoint: "https://portal/eicore/v1.03/Invoice".into(),
        }
    }

    #[tokio::test]
    async fn create_requires_known_customer() {
        let store = MemoryInvoiceStore::new();
        let err = store.create_invoice(draft("INV/2024-25/001")).await.unwrap_err();
        assert!(matches!(err, StoreError::CustomerNotFound(CustomerId(7))));
    }

    #[tokio::test]
    async fn duplicate_invoice_number_rejected() {
        let store = MemoryInvoiceStore::new();
        store.insert_customer(customer());
        store.create_invoice(draft("INV/2024-25/001")).await.unwrap();
        let err = store.create_invoice(draft("INV/2024-25/001")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateNumber(_)));
    }

    #[tokio::test]
    async fn submitted_transition_applies_once() {
        let store = MemoryInvoiceStore::new();
        store.insert_customer(customer());
        let doc = store.create_invoice(draft("INV/2024-25/001")).await.unwrap();
        let id = doc.invoice.id;

        store.record_error(id, "2150", "Duplicate IRN").await.unwrap();
        assert!(store.mark_submitted(id, &irn()).await.unwrap());
        assert!(!store.mark_submitted(id, &irn()).await.unwrap());

        let loaded = store.load_document(id).await.unwrap().unwrap();
        assert_eq!(loaded.invoice.status, InvoiceStatus::Submitted);
        assert!(loaded.invoice.error_code.is_none());
        assert!(loaded.invoice.artifacts_consistent());
    }

    #[tokio::test]
    async fn cancellation_keeps_irn() {
        let store = MemoryInvoiceStore::new();
        store.insert_customer(customer());
        let id = store
            .create_invoice(draft("INV/2024-25/001"))
            .await
            .unwrap()
            .invoice
            .id;
        let cancellation = Cancellation {
            cancel_date: Some("2024-05-11 10:00:00".into()),
            reason_code: 2,
            remark: "typo".into(),
        };
        assert!(!store.mark_cancelled(id, &cancellation).await.unwrap());
        store.mark_submitted(id, &irn()).await.unwrap();
        assert!(store.mark_cancelled(id, &cancellation).await.unwrap());

        let loaded = store.load_document(id).await.unwrap().unwrap();
        assert_eq!(loaded.invoice.status, InvoiceStatus::Cancelled);
        assert_eq!(loaded.invoice.irn, Some(irn()));
        assert!(loaded.invoice.artifacts_consistent());
    }

    #[tokio::test]
    async fn appended_transactions_form_valid_chain() {
        let store = MemoryInvoiceStore::new();
        let first = store.append_transaction(tx(InvoiceId(1))).await.unwrap();
        let second = store.append_transaction(tx(InvoiceId(2))).await.unwrap();
        assert_eq!(first.previous_hash, GENESIS_HASH);
        assert_eq!(second.previous_hash, first.entry_hash);

        let all = store.all_transactions().await.unwrap();
        assert!(verify_chain(&all).is_valid());
        assert_eq!(store.transactions_for(InvoiceId(2)).await.unwrap().len(), 1);
    }
}
