//! Audit log persistence: append-only hash chain in `gst_transactions`.
//!
//! Appends serialize on a transaction-scoped advisory lock so two writers
//! cannot both chain onto the same head. Order is the `seq` column, not
//! `created_at`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use gst_core::{InvoiceId, NewTransaction, TransactionLogEntry, GENESIS_HASH};

use super::StoreError;

/// Advisory lock key guarding the chain head.
const CHAIN_LOCK_KEY: i64 = 0x6773_745f_6c6f_67;

const COLUMNS: &str = "id, invoice_id, transaction_type, request_payload, response_payload,
     status, error_code, error_message, endpoint, previous_hash, entry_hash, created_at";

/// Seal `tx` after the current chain head and insert it.
pub async fn append(pool: &PgPool, tx: NewTransaction) -> Result<TransactionLogEntry, StoreError> {
    let mut db = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(CHAIN_LOCK_KEY)
        .execute(&mut *db)
        .await?;

    let previous_hash: Option<String> =
        sqlx::query_scalar("SELECT entry_hash FROM gst_transactions ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *db)
            .await?;
    let previous = previous_hash.as_deref().unwrap_or(GENESIS_HASH);

    let entry = tx.seal(previous, Utc::now());

    sqlx::query(&format!(
        "INSERT INTO gst_transactions ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(entry.id)
    .bind(entry.invoice_id.get())
    .bind(entry.transaction_type.as_str())
    .bind(&entry.request_payload)
    .bind(&entry.response_payload)
    .bind(entry.status.as_str())
    .bind(&entry.error_code)
    .bind(&entry.error_message)
    .bind(&entry.endpoint)
    .bind(&entry.previous_hash)
    .bind(&entry.entry_hash)
    .bind(entry.created_at)
    .execute(&mut *db)
    .await?;

    db.commit().await?;
    Ok(entry)
}

/// Entries for one invoice in append order.
pub async fn for_invoice(
    pool: &PgPool,
    id: InvoiceId,
) -> Result<Vec<TransactionLogEntry>, StoreError> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {COLUMNS} FROM gst_transactions WHERE invoice_id = $1 ORDER BY seq ASC"
    ))
    .bind(id.get())
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(TransactionRow::into_entry)
    .collect()
}

/// The full chain in append order.
pub async fn all(pool: &PgPool) -> Result<Vec<TransactionLogEntry>, StoreError> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {COLUMNS} FROM gst_transactions ORDER BY seq ASC"
    ))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(TransactionRow::into_entry)
    .collect()
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    invoice_id: i64,
    transaction_type: String,
    request_payload: serde_json::Value,
    response_payload: serde_json::Value,
    status: String,
    error_code: Option<String>,
    error_message: Option<String>,
    endpoint: String,
    previous_hash: String,
    entry_hash: String,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_entry(self) -> Result<TransactionLogEntry, StoreError> {
        let corrupt = |e: gst_core::ValidationError| StoreError::Corrupt {
            table: "gst_transactions",
            reason: e.to_string(),
        };
        Ok(TransactionLogEntry {
            id: self.id,
            invoice_id: InvoiceId(self.invoice_id),
            transaction_type: self.transaction_type.parse().map_err(corrupt)?,
            request_payload: self.request_payload,
            response_payload: self.response_payload,
            status: self.status.parse().map_err(corrupt)?,
            error_code: self.error_code,
            error_message: self.error_message,
            endpoint: self.endpoint,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
            created_at: self.created_at,
        })
    }
}
