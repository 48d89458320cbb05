// src/api/pdf.rs
//
// PDF renderer service: accepts a render request, renders asynchronously and
// hands the document to the email dispatcher; records the email service
// outcome and relays it to the coordinator.

use actix_web::{get, post, web, HttpResponse};
use chrono::NaiveDateTime;
use sha1::{Digest, Sha1};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use crate::models::{EmailCallback, InvoiceCallback, PdfInvoice, PdfRenderRequest, DATETIME_FORMAT};
use crate::{clients, pdf_render, PdfState};

pub const CB_PATH: &str = "/api/cb-invoice-pdf";

#[utoipa::path(
    post,
    path = "/api/generate-invoice-pdf",
    tag = "pdf",
    request_body = PdfRenderRequest,
    responses(
        (status = 200, description = "Render scheduled"),
        (status = 400, description = "Invalid payload")
    )
)]
#[post("/api/generate-invoice-pdf")]
pub async fn generate_invoice_pdf(
    payload: web::Json<PdfRenderRequest>,
    state: web::Data<PdfState>,
) -> HttpResponse {
    let request = payload.into_inner();

    if let Err(e) = request.validate() {
        return HttpResponse::BadRequest().body(e);
    }

    let state = state.into_inner();
    tokio::spawn(async move {
        let _guard = state.render_lock.lock().await;
        if let Err(e) = process_render_request(&state, request).await {
            log::error!("error processing invoice render: {e}");
        }
    });

    HttpResponse::Ok().finish()
}

/// Stores or refreshes the snapshot row for the composite reference, then
/// renders and submits. Runs under the render lock.
async fn process_render_request(state: &PdfState, request: PdfRenderRequest) -> Result<(), String> {
    let existing = pdf_invoice_by_invoice_id(&state.pool, &request.invoice_id)
        .await
        .map_err(|e| format!("error checking existing record: {e}"))?;

    let invoice = match existing {
        Some(existing) => {
            let invoice = snapshot_from_request(existing.id, &request);
            update_pdf_invoice(&state.pool, &invoice)
                .await
                .map_err(|e| format!("failed to update invoice in the database: {e}"))?;
            invoice
        }
        None => {
            let mut invoice = snapshot_from_request(0, &request);
            insert_pdf_invoice(&state.pool, &mut invoice)
                .await
                .map_err(|e| format!("failed to save invoice to database: {e}"))?;
            invoice
        }
    };

    render_and_submit(state, &invoice).await
}

async fn render_and_submit(state: &PdfState, invoice: &PdfInvoice) -> Result<(), String> {
    let bytes = pdf_render::render_invoice_pdf(invoice, &state.company)
        .map_err(|e| format!("failed to generate PDF: {e}"))?;
    submit_to_email_service(state, invoice, bytes).await
}

/// Fingerprints the document and posts the multipart form to the email
/// dispatcher, with a done URL pointing back at this service.
async fn submit_to_email_service(
    state: &PdfState,
    invoice: &PdfInvoice,
    bytes: Vec<u8>,
) -> Result<(), String> {
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    let file_hash = hex::encode(hasher.finalize());

    let done_url = format!("{}{}/{}", state.base_url, CB_PATH, invoice.id);

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name("invoice.pdf")
        .mime_str("application/pdf")
        .map_err(|e| format!("error building multipart file: {e}"))?;
    let form = reqwest::multipart::Form::new()
        .part("invoiceFile", part)
        .text("productCode", invoice.product_code.clone())
        .text("customerID", invoice.customer_id.clone())
        .text("invoiceID", invoice.invoice_id.clone())
        .text("emailTo", invoice.email_to.clone())
        .text("doneURL", done_url)
        .text("fileHash", file_hash);

    let response = state
        .http
        .post(&state.email_svc_url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| format!("failed to call email service: {e}"))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(format!(
            "email service request failed with status code {}",
            response.status()
        ));
    }

    Ok(())
}

/// Manual reinjection: reload, re-render and re-submit a stored snapshot.
#[get("/api/invoice-pdf/{id}")]
pub async fn invoice_pdf_by_id(path: web::Path<i32>, state: web::Data<PdfState>) -> HttpResponse {
    let id = path.into_inner();

    let invoice = match pdf_invoice_by_id(&state.pool, id).await {
        Ok(Some(i)) => i,
        Ok(None) => return HttpResponse::NotFound().body("Invoice not found"),
        Err(e) => {
            log::error!("error loading pdf invoice id={id} error={e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let _guard = state.render_lock.lock().await;
    if let Err(e) = render_and_submit(&state, &invoice).await {
        log::error!("failed to generate and send PDF id={id} error={e}");
        return HttpResponse::InternalServerError().body("Failed to generate and send PDF");
    }

    HttpResponse::Ok().finish()
}

#[utoipa::path(
    post,
    path = "/api/cb-invoice-pdf/{id}",
    tag = "pdf",
    params(("id" = i32, Path, description = "PDF invoice row id")),
    request_body = EmailCallback,
    responses(
        (status = 200, description = "Outcome recorded and relayed"),
        (status = 404, description = "Unknown invoice"),
        (status = 500, description = "Record or relay failed")
    )
)]
#[post("/api/cb-invoice-pdf/{id}")]
pub async fn invoice_pdf_callback(
    path: web::Path<i32>,
    payload: web::Json<EmailCallback>,
    state: web::Data<PdfState>,
) -> HttpResponse {
    let id = path.into_inner();
    let payload = payload.into_inner();

    let invoice = match pdf_invoice_by_id(&state.pool, id).await {
        Ok(Some(i)) => i,
        Ok(None) => return HttpResponse::NotFound().body("Invoice not found"),
        Err(e) => {
            log::error!("error loading pdf invoice id={id} error={e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let (message, triggered_at) = if payload.status == 200 {
        (
            payload.success_message.clone().unwrap_or_default(),
            payload.invoice_sent_at.clone().unwrap_or_default(),
        )
    } else {
        (
            payload.failed_message.clone().unwrap_or_default(),
            payload.failed_at.clone().unwrap_or_default(),
        )
    };

    if let Err(e) = update_email_service_fields(
        &state.pool,
        invoice.id,
        payload.id,
        &message,
        payload.status,
        &triggered_at,
    )
    .await
    {
        log::error!("failed to update invoice in the database id={id} error={e}");
        return HttpResponse::InternalServerError().body("Failed to update invoice in the database");
    }

    let callback = InvoiceCallback {
        id: invoice.id,
        email_service_id: payload.id,
        email_service_message: message,
        email_service_status: payload.status,
        email_service_triggered_at: triggered_at,
    };

    match clients::post_json(&state.http, &invoice.done_url, &callback).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => {
            log::error!("failed to relay outcome to done url {} error={e}", invoice.done_url);
            HttpResponse::InternalServerError().finish()
        }
    }
}

fn snapshot_from_request(id: i32, request: &PdfRenderRequest) -> PdfInvoice {
    PdfInvoice {
        id,
        product_code: request.product_code.clone(),
        customer_id: request.customer_id.clone(),
        invoice_id: request.invoice_id.clone(),
        email_to: request.email_to.clone(),
        invoice_date: request.invoice_date.clone(),
        name: request.name.clone(),
        address: request.address.clone(),
        contact: request.contact.clone(),
        tax: request.tax,
        unit: request.unit,
        description: request.description.clone(),
        price_per_unit: request.price_per_unit,
        price: request.price,
        sub_total: request.sub_total,
        tax_amount: request.tax_amount,
        grand_total: request.grand_total,
        currency: request.currency.clone(),
        currency_symbol: request.currency_symbol.clone(),
        done_url: request.done_url.clone(),
        email_service_id: None,
        email_service_message: None,
        email_service_status: None,
        email_service_triggered_at: None,
    }
}

const PDF_INVOICE_COLUMNS: &str = r#"id, product_code, customer_id, invoice_id, email_to, invoice_date,
    name, address, contact, tax, unit, description, price_per_unit, price,
    sub_total, tax_amount, grand_total, currency, currency_symbol, done_url,
    email_service_id, email_service_message, email_service_status,
    email_service_triggered_at"#;

fn map_pdf_invoice(row: &MySqlRow) -> PdfInvoice {
    PdfInvoice {
        id: row.get("id"),
        product_code: row.get("product_code"),
        customer_id: row.get("customer_id"),
        invoice_id: row.get("invoice_id"),
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
        done_url: row.get("done_url"),
        email_service_id: row.get("email_service_id"),
        email_service_message: row.get("email_service_message"),
        email_service_status: row.get("email_service_status"),
        email_service_triggered_at: row.get("email_service_triggered_at"),
    }
}

async fn pdf_invoice_by_invoice_id(
    pool: &MySqlPool,
    invoice_id: &str,
) -> Result<Option<PdfInvoice>, sqlx::Error> {
    let query = format!("SELECT {PDF_INVOICE_COLUMNS} FROM pdf_invoices WHERE invoice_id = ?");
    let row = sqlx::query(&query).bind(invoice_id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(map_pdf_invoice))
}

async fn pdf_invoice_by_id(pool: &MySqlPool, id: i32) -> Result<Option<PdfInvoice>, sqlx::Error> {
    let query = format!("SELECT {PDF_INVOICE_COLUMNS} FROM pdf_invoices WHERE id = ?");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(map_pdf_invoice))
}

async fn insert_pdf_invoice(pool: &MySqlPool, invoice: &mut PdfInvoice) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO pdf_invoices
               (product_code, customer_id, invoice_id, email_to, invoice_date, name, address,
                contact, tax, unit, description, price_per_unit, done_url, price, sub_total,
                tax_amount, grand_total, currency, currency_symbol)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&invoice.product_code)
    .bind(&invoice.customer_id)
    .bind(&invoice.invoice_id)
    .bind(&invoice.email_to)
    .bind(&invoice.invoice_date)
    .bind(&invoice.name)
    .bind(&invoice.address)
    .bind(&invoice.contact)
    .bind(invoice.tax)
    .bind(invoice.unit)
    .bind(&invoice.description)
    .bind(invoice.price_per_unit)
    .bind(&invoice.done_url)
    .bind(invoice.price)
    .bind(invoice.sub_total)
    .bind(invoice.tax_amount)
    .bind(invoice.grand_total)
    .bind(&invoice.currency)
    .bind(&invoice.currency_symbol)
    .execute(pool)
    .await?;

    invoice.id = result.last_insert_id() as i32;
    Ok(())
}

async fn update_pdf_invoice(pool: &MySqlPool, invoice: &PdfInvoice) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE pdf_invoices SET
               product_code = ?, customer_id = ?, email_to = ?, invoice_date = ?, name = ?,
               address = ?, contact = ?, tax = ?, unit = ?, description = ?, price_per_unit = ?,
               price = ?, sub_total = ?, tax_amount = ?, grand_total = ?, currency = ?,
               currency_symbol = ?, done_url = ?
           WHERE id = ?"#,
    )
    .bind(&invoice.product_code)
    .bind(&invoice.customer_id)
    .bind(&invoice.email_to)
    .bind(&invoice.invoice_date)
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
    .bind(&invoice.done_url)
    .bind(invoice.id)
    .execute(pool)
    .await?;

    Ok(())
}

async fn update_email_service_fields(
    pool: &MySqlPool,
    id: i32,
    email_service_id: Option<i32>,
    message: &str,
    status: i16,
    triggered_at: &str,
) -> Result<(), sqlx::Error> {
    // An absent or unparseable timestamp is stored as NULL rather than
    // rejecting the whole callback.
    let triggered_at = NaiveDateTime::parse_from_str(triggered_at, DATETIME_FORMAT).ok();

    sqlx::query(
        r#"UPDATE pdf_invoices
           SET email_service_id = ?, email_service_message = ?, email_service_status = ?,
               email_service_triggered_at = ?
           WHERE id = ?"#,
    )
    .bind(email_service_id)
    .bind(message)
    .bind(status)
    .bind(triggered_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}
