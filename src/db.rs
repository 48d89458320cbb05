// src/db.rs

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, Row, Transaction};

use crate::models::{Invoice, Status, Subscription};

const SUBSCRIPTION_COLUMNS: &str = r#"id, customer_id, contract_start_date, duration, duration_units,
    billing_frequency, billing_frequency_units, price, tax, currency,
    product_code, billing_frequency_remains, next_invoice_date,
    invoicing_started_at, status"#;

const INVOICE_COLUMNS: &str = r#"id, subscription_id, customer_id, product_code, email_to, invoice_date,
    name, address, contact, tax, unit, description, price_per_unit, price,
    sub_total, tax_amount, grand_total, currency, currency_symbol,
    invoicing_started_at, status"#;

fn map_subscription(row: &MySqlRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        customer_id: row.get("customer_id"),
        contract_start_date: row.get("contract_start_date"),
        duration: row.get("duration"),
        duration_units: row.get("duration_units"),
        billing_frequency: row.get("billing_frequency"),
        billing_frequency_units: row.get("billing_frequency_units"),
        price: row.get("price"),
        tax: row.get("tax"),
        currency: row.get("currency"),
        product_code: row.get("product_code"),
        billing_frequency_remains: row.get("billing_frequency_remains"),
        next_invoice_date: row.get("next_invoice_date"),
        invoicing_started_at: row.get("invoicing_started_at"),
        status: Status::from_i8(row.get("status")),
    }
}

fn map_invoice(row: &MySqlRow) -> Invoice {
    Invoice {
        id: row.get("id"),
        subscription_id: row.get("subscription_id"),
        customer_id: row.get("customer_id"),
        product_code: row.get("product_code"),
        email_to: row.get("email_to"),
        invoice_date: row.get("invoice_date"),
        name: row.get("name"),
        address: row.get("address"),
        contact: row.get("contact"),
        tax: row.get("tax"),
        unit: row.get("unit"),
        description: row.get("description"),
        price_per_unit: row.get("price_per_unit"),
        price: row.get("price"),
        sub_total: row.get("sub_total"),
        tax_amount: row.get("tax_amount"),
        grand_total: row.get("grand_total"),
        currency: row.get("currency"),
        currency_symbol: row.get("currency_symbol"),
        invoicing_started_at: row.get("invoicing_started_at"),
        status: Status::from_i8(row.get("status")),
    }
}

/// Subscriptions due for invoicing: cycles remain, the next invoice date has
/// passed and the row is neither in flight nor failed. The batch is bounded
/// to ten rows per tick, oldest subscription first.
pub async fn due_subscriptions(
    pool: &MySqlPool,
    now: NaiveDateTime,
) -> Result<Vec<Subscription>, sqlx::Error> {
    let query = format!(
        r#"SELECT {SUBSCRIPTION_COLUMNS}
           FROM subscriptions
           WHERE billing_frequency_remains > 0
             AND next_invoice_date <= ?
             AND (status != ? AND status != ?)
           ORDER BY id ASC
           LIMIT 10"#
    );

    let rows = sqlx::query(&query)
        .bind(now.date())
        .bind(Status::Processing.as_i8())
        .bind(Status::Failed.as_i8())
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(map_subscription).collect())
}

/// Invoices still PROCESSING whose work started at or before the cutoff.
pub async fn stalled_invoices(
    pool: &MySqlPool,
    cutoff: NaiveDateTime,
) -> Result<Vec<Invoice>, sqlx::Error> {
    let query = format!(
        r#"SELECT {INVOICE_COLUMNS}
           FROM invoices
           WHERE invoicing_started_at <= ? AND status = ?
           LIMIT 100"#
    );

    let rows = sqlx::query(&query)
        .bind(cutoff)
        .bind(Status::Processing.as_i8())
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(map_invoice).collect())
}

pub async fn insert_invoice(
    tx: &mut Transaction<'_, MySql>,
    invoice: &mut Invoice,
) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO invoices (subscription_id, customer_id, product_code, email_to,
               invoice_date, name, address, contact, tax, unit, description, price_per_unit,
               price, sub_total, tax_amount, grand_total, currency, currency_symbol,
               invoicing_started_at, status)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(invoice.subscription_id)
    .bind(&invoice.customer_id)
    .bind(&invoice.product_code)
    .bind(&invoice.email_to)
    .bind(invoice.invoice_date)
    .bind(&invoice.name)
    .bind(&invoice.address)
    .bind(&invoice.contact)
    .bind(invoice.tax)
    .bind(invoice.unit)
    .bind(&invoice.description)
    .bind(invoice.price_per_unit)
    .bind(invoice.price)
    .bind(invoice.sub_total)
    .bind(invoice.tax_amount)
    .bind(invoice.grand_total)
    .bind(&invoice.currency)
    .bind(&invoice.currency_symbol)
    .bind(invoice.invoicing_started_at)
    .bind(invoice.status.as_i8())
    .execute(&mut **tx)
    .await?;

    invoice.id = result.last_insert_id() as i32;
    Ok(())
}

/// Claims a subscription for the current billing attempt.
pub async fn mark_subscription_processing(
    tx: &mut Transaction<'_, MySql>,
    invoicing_started_at: NaiveDateTime,
    id: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE subscriptions
           SET invoicing_started_at = ?, status = ?
           WHERE id = ?"#,
    )
    .bind(invoicing_started_at)
    .bind(Status::Processing.as_i8())
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Releases a subscription with the outcome of a billing attempt. The
/// in-flight marker is always cleared.
pub async fn complete_subscription(
    tx: &mut Transaction<'_, MySql>,
    id: i32,
    billing_frequency_remains: i32,
    status: Status,
    next_invoice_date: NaiveDate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE subscriptions
           SET billing_frequency_remains = ?,
               next_invoice_date = ?,
               invoicing_started_at = NULL,
               status = ?
           WHERE id = ?"#,
    )
    .bind(billing_frequency_remains)
    .bind(next_invoice_date)
    .bind(status.as_i8())
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn set_invoice_status(
    tx: &mut Transaction<'_, MySql>,
    id: i32,
    status: Status,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invoices SET status = ? WHERE id = ?")
        .bind(status.as_i8())
        .bind(id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Loads a non-failed invoice by the numeric keys carried in the composite
/// reference. Failed invoices are invisible to callbacks.
pub async fn invoice_by_ref(
    pool: &MySqlPool,
    invoice_id: i32,
    subscription_id: i32,
) -> Result<Option<Invoice>, sqlx::Error> {
    let query = format!(
        r#"SELECT {INVOICE_COLUMNS}
           FROM invoices
           WHERE id = ? AND subscription_id = ? AND status != ?"#
    );

    let row = sqlx::query(&query)
        .bind(invoice_id)
        .bind(subscription_id)
        .bind(Status::Failed.as_i8())
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(map_invoice))
}

/// Loads the non-failed subscription owning an invoice.
pub async fn subscription_for_invoice(
    pool: &MySqlPool,
    invoice: &Invoice,
) -> Result<Option<Subscription>, sqlx::Error> {
    let query = format!(
        r#"SELECT {SUBSCRIPTION_COLUMNS}
           FROM subscriptions
           WHERE id = ? AND customer_id = ? AND product_code = ? AND status != ?"#
    );

    let row = sqlx::query(&query)
        .bind(invoice.subscription_id)
        .bind(&invoice.customer_id)
        .bind(&invoice.product_code)
        .bind(Status::Failed.as_i8())
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(map_subscription))
}
