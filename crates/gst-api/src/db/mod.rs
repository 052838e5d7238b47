//! # Persistence Layer
//!
//! [`InvoiceStore`] is the port the service talks to. Two implementations:
//!
//! - [`MemoryInvoiceStore`] when `DATABASE_URL` is absent (development and
//!   tests). State does not survive restarts.
//! - [`PgInvoiceStore`] backed by Postgres via SQLx. Table-level operations
//!   live in [`invoices`], [`settings`], and [`transactions`] as free
//!   functions over `&PgPool`.
//!
//! Customers, products and other master data are owned by CRUD services
//! outside this crate; the store only reads customers.

pub mod invoices;
pub mod memory;
pub mod settings;
pub mod transactions;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};

use gst_core::{
    Cancellation, Customer, CustomerId, InvoiceDocument, InvoiceId, InvoiceTotals, IrnDetails,
    LineItem, NewTransaction, SupplyType, TransactionLogEntry,
};

pub use memory::MemoryInvoiceStore;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to the domain model.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("invoice number {0} already exists")]
    DuplicateNumber(String),
}

/// A fully computed draft ready to be inserted with its line items.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub supply_type: SupplyType,
    pub customer_id: CustomerId,
    pub totals: InvoiceTotals,
    pub items: Vec<LineItem>,
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    /// Insert header and line items atomically. The new invoice is `draft`.
    async fn create_invoice(&self, draft: NewInvoice) -> Result<InvoiceDocument, StoreError>;

    /// Header joined with customer, plus line items in line order.
    async fn load_document(&self, id: InvoiceId) -> Result<Option<InvoiceDocument>, StoreError>;

    /// Record a registered IRN: status `submitted`, artifacts set, error
    /// fields cleared. Only applies while the invoice is still submittable;
    /// returns `false` if the row was not in that state.
    async fn mark_submitted(&self, id: InvoiceId, irn: &IrnDetails) -> Result<bool, StoreError>;

    /// Record a rejected submission: status back to `draft`, error fields set.
    async fn mark_rejected(
        &self,
        id: InvoiceId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), StoreError>;

    /// Record a cancelled IRN. The IRN is kept. Only applies while the
    /// invoice is `submitted`.
    async fn mark_cancelled(
        &self,
        id: InvoiceId,
        cancellation: &Cancellation,
    ) -> Result<bool, StoreError>;

    /// Set error fields without changing status.
    async fn record_error(
        &self,
        id: InvoiceId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), StoreError>;

    /// Active settings rows as `setting_key → setting_value`.
    async fn load_settings(&self) -> Result<HashMap<String, String>, StoreError>;

    async fn upsert_settings(&self, rows: &HashMap<String, String>) -> Result<(), StoreError>;

    /// Seal and append an audit entry after the current chain head.
    async fn append_transaction(&self, tx: NewTransaction) -> Result<TransactionLogEntry, StoreError>;

    /// Audit entries for one invoice, oldest first.
    async fn transactions_for(&self, id: InvoiceId) -> Result<Vec<TransactionLogEntry>, StoreError>;

    /// The whole audit chain in append order.
    async fn all_transactions(&self) -> Result<Vec<TransactionLogEntry>, StoreError>;
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        invoices::get_customer(&self.pool, id).await
    }

    async fn create_invoice(&self, draft: NewInvoice) -> Result<InvoiceDocument, StoreError> {
        invoices::create(&self.pool, draft).await
    }

    async fn load_document(&self, id: InvoiceId) -> Result<Option<InvoiceDocument>, StoreError> {
        invoices::load_document(&self.pool, id).await
    }

    async fn mark_submitted(&self, id: InvoiceId, irn: &IrnDetails) -> Result<bool, StoreError> {
        invoices::mark_submitted(&self.pool, id, irn).await
    }

    async fn mark_rejected(
        &self,
        id: InvoiceId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), StoreError> {
        invoices::mark_rejected(&self.pool, id, error_code, error_message).await
    }

    async fn mark_cancelled(
        &self,
        id: InvoiceId,
        cancellation: &Cancellation,
    ) -> Result<bool, StoreError> {
        invoices::mark_cancelled(&self.pool, id, cancellation).await
    }

    async fn record_error(
        &self,
        id: InvoiceId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), StoreError> {
        invoices::record_error(&self.pool, id, error_code, error_message).await
    }

    async fn load_settings(&self) -> Result<HashMap<String, String>, StoreError> {
        settings::load_active(&self.pool).await
    }

    async fn upsert_settings(&self, rows: &HashMap<String, String>) -> Result<(), StoreError> {
        settings::upsert(&self.pool, rows).await
    }

    async fn append_transaction(&self, tx: NewTransaction) -> Result<TransactionLogEntry, StoreError> {
        transactions::append(&self.pool, tx).await
    }

    async fn transactions_for(&self, id: InvoiceId) -> Result<Vec<TransactionLogEntry>, StoreError> {
        transactions::for_invoice(&self.pool, id).await
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionLogEntry>, StoreError> {
        transactions::all(&self.pool).await
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set; running in-memory only mode. \
                 Invoices and the audit log will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
