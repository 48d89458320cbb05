use chrono::{NaiveDate, NaiveDateTime};
use httpmock::prelude::*;
use serde_json::json;
use sqlx::{MySqlPool, Row};

use invoice_pipeline::cron::{dispatch_due_subscriptions, sweep_stalled_invoices};
use invoice_pipeline::models::Status;

mod support;

const CUSTOMER: &str = "CUSTOMER-0001";
const PRODUCT: &str = "PRD-160";

fn tick() -> NaiveDateTime {
    "2024-01-15T08:00:00".parse().unwrap()
}

async fn seed_subscription(
    pool: &MySqlPool,
    remains: i32,
    next_invoice_date: &str,
    status: Status,
    started: Option<NaiveDateTime>,
) -> i32 {
    sqlx::query(
        r#"INSERT INTO subscriptions
               (customer_id, contract_start_date, duration, duration_units, billing_frequency,
                billing_frequency_units, price, tax, currency, product_code,
                billing_frequency_remains, next_invoice_date, invoicing_started_at, status)
           VALUES (?, '2024-01-01', 1, 'MONTHS', 1, 'MONTHS', 103.00, 10, 'EUR', ?, ?, ?, ?, ?)"#,
    )
    .bind(CUSTOMER)
    .bind(PRODUCT)
    .bind(remains)
    .bind(next_invoice_date.parse::<NaiveDate>().unwrap())
    .bind(started)
    .bind(status.as_i8())
    .execute(pool)
    .await
    .expect("insert subscription")
    .last_insert_id() as i32
}

async fn seed_invoice(pool: &MySqlPool, subscription_id: i32, started: NaiveDateTime) -> i32 {
    sqlx::query(
        r#"INSERT INTO invoices
               (subscription_id, customer_id, product_code, email_to, invoice_date, name, address,
                contact, tax, unit, description, price_per_unit, price, sub_total, tax_amount,
                grand_total, currency, currency_symbol, invoicing_started_at, status)
           VALUES (?, ?, ?, 'samantha.johnson@example.com', '2024-01-15', 'Samantha Johnson',
                   '123 Main Street, Anytown, USA', '+1 (555) 123-4567', 10, 1, 'Product 1',
                   103.00, 103.00, 103.00, 10.30, 113.30, 'EUR', '€', ?, ?)"#,
    )
    .bind(subscription_id)
    .bind(CUSTOMER)
    .bind(PRODUCT)
    .bind(started)
    .bind(Status::Processing.as_i8())
    .execute(pool)
    .await
    .expect("insert invoice")
    .last_insert_id() as i32
}

fn mock_lookups(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/api/accounts/{CUSTOMER}/{PRODUCT}"));
        then.status(200).json_body(json!({
            "productDescription": "Product 1",
            "quantity": 1,
            "unitPrice": "103.00",
            "price": "103.00",
            "subTotal": "103.00",
            "tax": 10,
            "taxAmount": "10.30",
            "grandTotal": "113.30",
            "currency": "EUR",
            "currencySymbol": "€"
        }));
    });

    server.mock(|when, then| {
        when.method(GET).path(format!("/api/customers/{CUSTOMER}"));
        then.status(200).json_body(json!({
            "name": "Samantha Johnson",
            "email": "samantha.johnson@example.com",
            "address": "123 Main Street, Anytown, USA",
            "contact": "+1 (555) 123-4567"
        }));
    });
}

async fn invoice_count(pool: &MySqlPool) -> i64 {
    sqlx::query("SELECT COUNT(*) AS n FROM invoices")
        .fetch_one(pool)
        .await
        .expect("count invoices")
        .get("n")
}

async fn subscription_row(pool: &MySqlPool, id: i32) -> (i8, i32, NaiveDate, Option<NaiveDateTime>) {
    let row = sqlx::query(
        r#"SELECT status, billing_frequency_remains, next_invoice_date, invoicing_started_at
           FROM subscriptions WHERE id = ?"#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .expect("select subscription");

    (
        row.get("status"),
        row.get("billing_frequency_remains"),
        row.get("next_invoice_date"),
        row.get("invoicing_started_at"),
    )
}

#[actix_web::test]
async fn daily_tick_claims_due_subscription_and_dispatches_render() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let subscription_id = seed_subscription(pool, 3, "2024-01-15", Status::NotStarted, None).await;

    let server = MockServer::start_async().await;
    mock_lookups(&server);
    let pdf_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate-invoice-pdf")
                .body_contains("http://invoice.local/api/cb/INV-");
            then.status(200);
        })
        .await;

    let state = support::invoice_state(
        pool.clone(),
        "http://invoice.local",
        &server.url("/api/generate-invoice-pdf"),
        &server.base_url(),
        &server.base_url(),
    );

    dispatch_due_subscriptions(&state, tick()).await;

    assert_eq!(pdf_mock.hits_async().await, 1);
    assert_eq!(invoice_count(pool).await, 1);

    let row = sqlx::query(
        r#"SELECT subscription_id, customer_id, product_code, email_to, invoice_date,
                  invoicing_started_at, status
           FROM invoices"#,
    )
    .fetch_one(pool)
    .await
    .expect("select invoice");
    assert_eq!(row.get::<i32, _>("subscription_id"), subscription_id);
    assert_eq!(row.get::<String, _>("customer_id"), CUSTOMER);
    assert_eq!(row.get::<String, _>("product_code"), PRODUCT);
    assert_eq!(
        row.get::<String, _>("email_to"),
        "samantha.johnson@example.com"
    );
    assert_eq!(
        row.get::<NaiveDate, _>("invoice_date"),
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    );
    assert_eq!(row.get::<NaiveDateTime, _>("invoicing_started_at"), tick());
    assert_eq!(row.get::<i8, _>("status"), Status::Processing.as_i8());

    let (status, remains, _, started) = subscription_row(pool, subscription_id).await;
    assert_eq!(status, Status::Processing.as_i8());
    assert_eq!(remains, 3);
    assert_eq!(started, Some(tick()));
}

#[actix_web::test]
async fn failed_render_dispatch_rolls_the_claim_back() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let subscription_id = seed_subscription(pool, 3, "2024-01-15", Status::NotStarted, None).await;

    let server = MockServer::start_async().await;
    mock_lookups(&server);
    let pdf_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate-invoice-pdf");
            then.status(500);
        })
        .await;

    let state = support::invoice_state(
        pool.clone(),
        "http://invoice.local",
        &server.url("/api/generate-invoice-pdf"),
        &server.base_url(),
        &server.base_url(),
    );

    dispatch_due_subscriptions(&state, tick()).await;

    assert_eq!(pdf_mock.hits_async().await, 1);
    // The transaction rolled back: no invoice, subscription still eligible.
    assert_eq!(invoice_count(pool).await, 0);
    let (status, remains, _, started) = subscription_row(pool, subscription_id).await;
    assert_eq!(status, Status::NotStarted.as_i8());
    assert_eq!(remains, 3);
    assert!(started.is_none());
}

#[actix_web::test]
async fn lookup_failure_skips_the_subscription() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let subscription_id = seed_subscription(pool, 3, "2024-01-15", Status::NotStarted, None).await;

    // No lookup mocks: the accounts call answers 404 and the loop moves on.
    let server = MockServer::start_async().await;
    let pdf_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate-invoice-pdf");
            then.status(200);
        })
        .await;

    let state = support::invoice_state(
        pool.clone(),
        "http://invoice.local",
        &server.url("/api/generate-invoice-pdf"),
        &server.base_url(),
        &server.base_url(),
    );

    dispatch_due_subscriptions(&state, tick()).await;

    assert_eq!(pdf_mock.hits_async().await, 0);
    assert_eq!(invoice_count(pool).await, 0);
    let (status, _, _, started) = subscription_row(pool, subscription_id).await;
    assert_eq!(status, Status::NotStarted.as_i8());
    assert!(started.is_none());
}

#[actix_web::test]
async fn tick_ignores_subscriptions_that_are_not_eligible() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    // Not yet due, no cycles left, and terminally failed.
    seed_subscription(pool, 3, "2099-01-01", Status::NotStarted, None).await;
    seed_subscription(pool, 0, "2024-01-15", Status::NotStarted, None).await;
    seed_subscription(pool, 3, "2024-01-15", Status::Failed, None).await;

    let server = MockServer::start_async().await;
    mock_lookups(&server);
    let pdf_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate-invoice-pdf");
            then.status(200);
        })
        .await;

    let state = support::invoice_state(
        pool.clone(),
        "http://invoice.local",
        &server.url("/api/generate-invoice-pdf"),
        &server.base_url(),
        &server.base_url(),
    );

    dispatch_due_subscriptions(&state, tick()).await;

    assert_eq!(pdf_mock.hits_async().await, 0);
    assert_eq!(invoice_count(pool).await, 0);
}

#[actix_web::test]
async fn sweep_fails_stalled_invoices_and_releases_subscriptions() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let started: NaiveDateTime = "2024-01-15T08:00:00".parse().unwrap();
    let sweep_at: NaiveDateTime = "2024-01-15T08:20:00".parse().unwrap();

    let subscription_id =
        seed_subscription(pool, 3, "2024-01-15", Status::Processing, Some(started)).await;
    let invoice_id = seed_invoice(pool, subscription_id, started).await;

    sweep_stalled_invoices(pool, sweep_at).await;

    let invoice_status: i8 = sqlx::query("SELECT status FROM invoices WHERE id = ?")
        .bind(invoice_id)
        .fetch_one(pool)
        .await
        .expect("select invoice")
        .get("status");
    assert_eq!(invoice_status, Status::Failed.as_i8());

    let (status, remains, next_date, started_after) = subscription_row(pool, subscription_id).await;
    assert_eq!(status, Status::Failed.as_i8());
    assert_eq!(remains, 3);
    assert_eq!(next_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    assert!(started_after.is_none());

    // A failed subscription never comes back into the daily batch.
    let server = MockServer::start_async().await;
    mock_lookups(&server);
    let pdf_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate-invoice-pdf");
            then.status(200);
        })
        .await;
    let state = support::invoice_state(
        pool.clone(),
        "http://invoice.local",
        &server.url("/api/generate-invoice-pdf"),
        &server.base_url(),
        &server.base_url(),
    );
    dispatch_due_subscriptions(&state, sweep_at).await;
    assert_eq!(pdf_mock.hits_async().await, 0);
}

#[actix_web::test]
async fn sweep_is_idempotent_and_spares_fresh_invoices() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let stalled_start: NaiveDateTime = "2024-01-15T08:00:00".parse().unwrap();
    let fresh_start: NaiveDateTime = "2024-01-15T08:15:00".parse().unwrap();
    let sweep_at: NaiveDateTime = "2024-01-15T08:20:00".parse().unwrap();

    let stalled_sub =
        seed_subscription(pool, 3, "2024-01-15", Status::Processing, Some(stalled_start)).await;
    let stalled_invoice = seed_invoice(pool, stalled_sub, stalled_start).await;
    let fresh_sub =
        seed_subscription(pool, 3, "2024-01-15", Status::Processing, Some(fresh_start)).await;
    let fresh_invoice = seed_invoice(pool, fresh_sub, fresh_start).await;

    sweep_stalled_invoices(pool, sweep_at).await;
    let after_first = (
        subscription_row(pool, stalled_sub).await,
        subscription_row(pool, fresh_sub).await,
    );

    sweep_stalled_invoices(pool, sweep_at).await;
    let after_second = (
        subscription_row(pool, stalled_sub).await,
        subscription_row(pool, fresh_sub).await,
    );

    assert_eq!(after_first, after_second);

    let stalled_status: i8 = sqlx::query("SELECT status FROM invoices WHERE id = ?")
        .bind(stalled_invoice)
        .fetch_one(pool)
        .await
        .expect("select stalled invoice")
        .get("status");
    assert_eq!(stalled_status, Status::Failed.as_i8());

    // Ten minutes have not elapsed for the fresh attempt.
    let fresh_status: i8 = sqlx::query("SELECT status FROM invoices WHERE id = ?")
        .bind(fresh_invoice)
        .fetch_one(pool)
        .await
        .expect("select fresh invoice")
        .get("status");
    assert_eq!(fresh_status, Status::Processing.as_i8());
    let (fresh_sub_status, _, _, fresh_started) = subscription_row(pool, fresh_sub).await;
    assert_eq!(fresh_sub_status, Status::Processing.as_i8());
    assert_eq!(fresh_started, Some(fresh_start));
}
