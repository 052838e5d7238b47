//! Invoice and customer persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `invoices`,
//! `invoice_items`, and `customers` tables. Status transitions are
//! conditional updates so a concurrent caller cannot move an invoice out of
//! a state it has already left.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use gst_core::{
    Cancellation, Customer, CustomerId, Invoice, InvoiceDocument, InvoiceId, InvoiceStatus,
    InvoiceTotals, IrnDetails, LineItem, SupplyType,
};

use super::{NewInvoice, StoreError};

const INVOICE_COLUMNS: &str = "id, invoice_number, invoice_date, supply_type, customer_id,
     total_quantity, taxable_amount, cgst_amount, sgst_amount, igst_amount, grand_total,
     status, irn, ack_no, ack_date, qr_code, signed_invoice, signed_qr_code,
     cancel_date, cancel_reason, cancel_remark, error_code, error_message,
     created_at, updated_at";

const ITEM_COLUMNS: &str = "line_no, product_id, description, hsn_code, is_service,
     quantity, unit, unit_rate, discount, taxable_amount, gst_rate,
     cgst_rate, cgst_amount, sgst_rate, sgst_amount, igst_rate, igst_amount, line_total";

/// Fetch a customer by ID.
pub async fn get_customer(pool: &PgPool, id: CustomerId) -> Result<Option<Customer>, StoreError> {
    let row = sqlx::query_as::<_, CustomerRow>(
        "SELECT id, name, trade_name, gstin, address1, address2, city, pincode,
         state_code, phone, email
         FROM customers WHERE id = $1",
    )
    .bind(id.get())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(CustomerRow::into_customer))
}

/// Insert an invoice header and its line items in one transaction.
pub async fn create(pool: &PgPool, draft: NewInvoice) -> Result<InvoiceDocument, StoreError> {
    let customer = get_customer(pool, draft.customer_id)
        .await?
        .ok_or(StoreError::CustomerNotFound(draft.customer_id))?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_as::<_, InvoiceRow>(&format!(
        "INSERT INTO invoices (invoice_number, invoice_date, supply_type, customer_id,
         total_quantity, taxable_amount, cgst_amount, sgst_amount, igst_amount, grand_total,
         status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'draft')
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(&draft.invoice_number)
    .bind(draft.invoice_date)
    .bind(draft.supply_type.as_str())
    .bind(draft.customer_id.get())
    .bind(draft.totals.total_quantity)
    .bind(draft.totals.taxable_amount)
    .bind(draft.totals.cgst_amount)
    .bind(draft.totals.sgst_amount)
    .bind(draft.totals.igst_amount)
    .bind(draft.totals.grand_total)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            StoreError::DuplicateNumber(draft.invoice_number.clone())
        }
        _ => StoreError::Database(e),
    })?;

    for item in &draft.items {
        sqlx::query(&format!(
            "INSERT INTO invoice_items (invoice_id, {ITEM_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                     $13, $14, $15, $16, $17, $18, $19)"
        ))
        .bind(inserted.id)
        .bind(i32::try_from(item.line_no).unwrap_or(i32::MAX))
        .bind(item.product_id)
        .bind(&item.description)
        .bind(&item.hsn_code)
        .bind(item.is_service)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(item.unit_rate)
        .bind(item.discount)
        .bind(item.taxable_amount)
        .bind(item.gst_rate)
        .bind(item.cgst_rate)
        .bind(item.cgst_amount)
        .bind(item.sgst_rate)
        .bind(item.sgst_amount)
        .bind(item.igst_rate)
        .bind(item.igst_amount)
        .bind(item.line_total)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(InvoiceDocument {
        invoice: inserted.into_invoice()?,
        customer,
        items: draft.items,
    })
}

/// Load an invoice with its customer and line items.
pub async fn load_document(
    pool: &PgPool,
    id: InvoiceId,
) -> Result<Option<InvoiceDocument>, StoreError> {
    let Some(row) = sqlx::query_as::<_, InvoiceRow>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
    ))
    .bind(id.get())
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let invoice = row.into_invoice()?;
    let customer = get_customer(pool, invoice.customer_id)
        .await?
        .ok_or_else(|| StoreError::Corrupt {
            table: "invoices",
            reason: format!(
                "invoice {id} references missing customer {}",
                invoice.customer_id
            ),
        })?;

    let items = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = $1 ORDER BY line_no"
    ))
    .bind(id.get())
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(ItemRow::into_item)
    .collect();

    Ok(Some(InvoiceDocument {
        invoice,
        customer,
        items,
    }))
}

/// Record a registered IRN. Applies only to `draft`/`generated` rows.
pub async fn mark_submitted(
    pool: &PgPool,
    id: InvoiceId,
    irn: &IrnDetails,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = 'submitted', irn = $2, ack_no = $3, ack_date = $4,
         qr_code = $5, signed_invoice = $6, signed_qr_code = $7,
         error_code = NULL, error_message = NULL, updated_at = NOW()
         WHERE id = $1 AND status IN ('draft', 'generated')",
    )
    .bind(id.get())
    .bind(&irn.irn)
    .bind(&irn.ack_no)
    .bind(&irn.ack_date)
    .bind(&irn.qr_code)
    .bind(&irn.signed_invoice)
    .bind(&irn.signed_qr_code)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Return a rejected invoice to `draft` with the authority's error.
pub async fn mark_rejected(
    pool: &PgPool,
    id: InvoiceId,
    error_code: &str,
    error_message: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE invoices SET status = 'draft', error_code = $2, error_message = $3,
         updated_at = NOW()
         WHERE id = $1 AND status IN ('draft', 'generated')",
    )
    .bind(id.get())
    .bind(error_code)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a cancelled IRN. Applies only to `submitted` rows.
pub async fn mark_cancelled(
    pool: &PgPool,
    id: InvoiceId,
    cancellation: &Cancellation,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = 'cancelled', cancel_date = $2, cancel_reason = $3,
         cancel_remark = $4, error_code = NULL, error_message = NULL, updated_at = NOW()
         WHERE id = $1 AND status = 'submitted'",
    )
    .bind(id.get())
    .bind(&cancellation.cancel_date)
    .bind(i16::from(cancellation.reason_code))
    .bind(&cancellation.remark)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Set error fields without touching status.
pub async fn record_error(
    pool: &PgPool,
    id: InvoiceId,
    error_code: &str,
    error_message: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE invoices SET error_code = $2, error_message = $3, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(id.get())
    .bind(error_code)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    name: String,
    trade_name: Option<String>,
    gstin: Option<String>,
    address1: Option<String>,
    address2: Option<String>,
    city: Option<String>,
    pincode: Option<String>,
    state_code: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

impl CustomerRow {
    fn into_customer(self) -> Customer {
        Customer {
            id: CustomerId(self.id),
            name: self.name,
            trade_name: self.trade_name,
            gstin: self.gstin,
            address1: self.address1,
            address2: self.address2,
            city: self.city,
            pincode: self.pincode,
            state_code: self.state_code,
            phone: self.phone,
            email: self.email,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    invoice_number: String,
    invoice_date: NaiveDate,
    supply_type: String,
    customer_id: i64,
    total_quantity: f64,
    taxable_amount: f64,
    cgst_amount: f64,
    sgst_amount: f64,
    igst_amount: f64,
    grand_total: f64,
    status: String,
    irn: Option<String>,
    ack_no: Option<String>,
    ack_date: Option<String>,
    qr_code: Option<String>,
    signed_invoice: Option<String>,
    signed_qr_code: Option<String>,
    cancel_date: Option<String>,
    cancel_reason: Option<i16>,
    cancel_remark: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self) -> Result<Invoice, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: "invoices",
            reason,
        };
        let status: InvoiceStatus = self.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let supply_type: SupplyType = self
            .supply_type
            .parse()
            .map_err(|e| corrupt(format!("{e}")))?;

        let irn = self.irn.map(|irn| IrnDetails {
            irn,
            ack_no: self.ack_no.unwrap_or_default(),
            ack_date: self.ack_date,
            qr_code: self.qr_code,
            signed_invoice: self.signed_invoice,
            signed_qr_code: self.signed_qr_code,
        });

        let cancellation = match (status, self.cancel_reason) {
            (InvoiceStatus::Cancelled, reason) => Some(Cancellation {
                cancel_date: self.cancel_date,
                reason_code: reason.and_then(|r| u8::try_from(r).ok()).unwrap_or(0),
                remark: self.cancel_remark.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Invoice {
            id: InvoiceId(self.id),
            invoice_number: self.invoice_number,
            invoice_date: self.invoice_date,
            supply_type,
            customer_id: CustomerId(self.customer_id),
            totals: InvoiceTotals {
                total_quantity: self.total_quantity,
                taxable_amount: self.taxable_amount,
                cgst_amount: self.cgst_amount,
                sgst_amount: self.sgst_amount,
                igst_amount: self.igst_amount,
                grand_total: self.grand_total,
            },
            status,
            irn,
            cancellation,
            error_code: self.error_code,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    line_no: i32,
    product_id: Option<i64>,
    description: String,
    hsn_code: String,
    is_service: bool,
    quantity: f64,
    unit: String,
    unit_rate: f64,
    discount: f64,
    taxable_amount: f64,
    gst_rate: f64,
    cgst_rate: f64,
    cgst_amount: f64,
    sgst_rate: f64,
    sgst_amount: f64,
    igst_rate: f64,
    igst_amount: f64,
    line_total: f64,
}

impl ItemRow {
    fn into_item(self) -> LineItem {
        LineItem {
            line_no: u32::try_from(self.line_no).unwrap_or(0),
            product_id: self.product_id,
            description: self.description,
            hsn_code: self.hsn_code,
            is_service: self.is_service,
            quantity: self.quantity,
            unit: self.unit,
            unit_rate: self.unit_rate,
            discount: self.discount,
            taxable_amount: self.taxable_amount,
            gst_rate: self.gst_rate,
            cgst_rate: self.cgst_rate,
            cgst_amount: self.cgst_amount,
            sgst_rate: self.sgst_rate,
            sgst_amount: self.sgst_amount,
            igst_rate: self.igst_rate,
            igst_amount: self.igst_amount,
            line_total: self.line_total,
        }
    }
}
