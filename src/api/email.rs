// src/api/email.rs
//
// Email dispatcher: stores uploaded invoice PDFs keyed by content hash,
// sends them out and reports the outcome to the caller-supplied done URL.
// For a fixed (invoice reference, file hash) pair at most one email is ever
// dispatched; the hash-equality branch below is what enforces it durably.

use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use futures_util::StreamExt;
use serde_json::json;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::path::Path;
use utoipa::ToSchema;

use crate::models::{EmailCallback, EmailJob, DATETIME_FORMAT};
use crate::{clients, EmailState};

/// Multipart form accepted by `/api/email-invoice`.
#[derive(Debug, Default, ToSchema)]
pub struct EmailInvoiceForm {
    #[schema(value_type = String, format = Binary)]
    pub invoice_file: Vec<u8>,
    pub product_code: String,
    pub customer_id: String,
    pub invoice_id: String,
    pub email_to: String,
    pub file_hash: String,
    pub done_url: String,
}

async fn read_multipart(payload: &mut Multipart) -> EmailInvoiceForm {
    let mut form = EmailInvoiceForm::default();

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(f) => f,
            Err(_) => continue,
        };

        let name = field.name().to_string();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = field.next().await {
            if let Ok(data) = chunk {
                buf.extend_from_slice(&data);
            }
        }

        match name.as_str() {
            "invoiceFile" => form.invoice_file = buf,
            "productCode" => form.product_code = String::from_utf8(buf).unwrap_or_default(),
            "customerID" => form.customer_id = String::from_utf8(buf).unwrap_or_default(),
            "invoiceID" => form.invoice_id = String::from_utf8(buf).unwrap_or_default(),
            "emailTo" => form.email_to = String::from_utf8(buf).unwrap_or_default(),
            "fileHash" => form.file_hash = String::from_utf8(buf).unwrap_or_default(),
            "doneURL" => form.done_url = String::from_utf8(buf).unwrap_or_default(),
            _ => {}
        }
    }

    form
}

#[utoipa::path(
    post,
    path = "/api/email-invoice",
    tag = "email",
    request_body(content = EmailInvoiceForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Request accepted; send runs in the background"),
        (status = 400, description = "Unparseable form"),
        (status = 500, description = "Filesystem or database error")
    )
)]
#[post("/api/email-invoice")]
pub async fn email_invoice(mut payload: Multipart, state: web::Data<EmailState>) -> HttpResponse {
    let form = read_multipart(&mut payload).await;

    if form.invoice_file.is_empty() {
        return HttpResponse::BadRequest().body("Error retrieving file from form");
    }
    if form.invoice_id.is_empty()
        || form.email_to.is_empty()
        || form.file_hash.is_empty()
        || form.done_url.is_empty()
    {
        return HttpResponse::BadRequest().body("Unable to parse form");
    }

    // Lookup-or-create runs under the process-wide lock so two uploads for
    // the same invoice reference serialize.
    let (job_id, dispatch) = {
        let _guard = state.send_lock.lock().await;

        let existing = match sqlx::query("SELECT id, file_hash FROM emails WHERE invoice_id = ?")
            .bind(&form.invoice_id)
            .fetch_optional(&state.pool)
            .await
        {
            Ok(row) => row.map(|r| (r.get::<i32, _>("id"), r.get::<String, _>("file_hash"))),
            Err(e) => {
                log::error!("error checking existing record invoice_id={} error={e}", form.invoice_id);
                return HttpResponse::InternalServerError().body("Error checking existing record");
            }
        };

        match existing {
            // Same reference, same bytes: nothing to store, nothing to send.
            Some((id, existing_hash)) if existing_hash == form.file_hash => (id, false),

            // Same reference, new bytes: replace the document and reset the
            // send state.
            Some((id, existing_hash)) => {
                let old_dir = state.pdf_path.join(&existing_hash);
                if let Err(e) = tokio::fs::remove_dir_all(&old_dir).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::error!("error deleting previous file dir={} error={e}", old_dir.display());
                        return HttpResponse::InternalServerError().body("Error deleting previous file");
                    }
                }

                if let Err(e) =
                    write_invoice_file(&state.pdf_path, &form.file_hash, &form.invoice_file).await
                {
                    log::error!("error writing file to disk hash={} error={e}", form.file_hash);
                    return HttpResponse::InternalServerError().body("Error writing file to disk");
                }

                if let Err(e) =
                    sqlx::query("UPDATE emails SET file_hash = ?, invoice_sent_at = NULL WHERE invoice_id = ?")
                        .bind(&form.file_hash)
                        .bind(&form.invoice_id)
                        .execute(&state.pool)
                        .await
                {
                    log::error!("error while database operation invoice_id={} error={e}", form.invoice_id);
                    return HttpResponse::InternalServerError().body("Error while database operation");
                }

                (id, true)
            }

            None => {
                if let Err(e) =
                    write_invoice_file(&state.pdf_path, &form.file_hash, &form.invoice_file).await
                {
                    log::error!("error writing file to disk hash={} error={e}", form.file_hash);
                    return HttpResponse::InternalServerError().body("Error writing file to disk");
                }

                let result = sqlx::query(
                    r#"INSERT INTO emails (product_code, customer_id, invoice_id, email_to, file_hash, done_url)
                       VALUES (?, ?, ?, ?, ?, ?)"#,
                )
                .bind(&form.product_code)
                .bind(&form.customer_id)
                .bind(&form.invoice_id)
                .bind(&form.email_to)
                .bind(&form.file_hash)
                .bind(&form.done_url)
                .execute(&state.pool)
                .await;

                match result {
                    Ok(r) => (r.last_insert_id() as i32, true),
                    Err(e) => {
                        log::error!("error while database operation invoice_id={} error={e}", form.invoice_id);
                        return HttpResponse::InternalServerError().body("Error while database operation");
                    }
                }
            }
        }
    };

    log::info!(
        "invoice email request invoice_id={} email_to={} hash={} dispatch={dispatch}",
        form.invoice_id,
        form.email_to,
        form.file_hash
    );

    if dispatch {
        let state = state.into_inner();
        tokio::spawn(async move {
            let _guard = state.send_lock.lock().await;

            let job = match email_job_by_id(&state.pool, job_id).await {
                Ok(Some(j)) => j,
                Ok(None) => {
                    log::warn!("no record found for id {job_id}");
                    return;
                }
                Err(e) => {
                    log::error!("error retrieving record for id {job_id}: {e}");
                    return;
                }
            };

            if let Err(e) = send_and_report(&state, &job).await {
                log::error!("email send job error id={} error={e}", job.id);
            }
        });
    }

    HttpResponse::Ok().json(json!({
        "message": "Invoice email request received and processing"
    }))
}

/// Sends the stored invoice, records the terminal timestamp and reports the
/// outcome to the job's done URL.
async fn send_and_report(state: &EmailState, job: &EmailJob) -> Result<(), String> {
    let attachment = state.pdf_path.join(&job.file_hash).join("invoice.pdf");

    match state.mailer.send_invoice(&job.email_to, &attachment).await {
        Ok(()) => {
            let invoice_sent_at = Utc::now().naive_utc();
            if let Err(e) =
                sqlx::query("UPDATE emails SET invoice_sent_at = ?, failed_at = NULL WHERE id = ?")
                    .bind(invoice_sent_at)
                    .bind(job.id)
                    .execute(&state.pool)
                    .await
            {
                log::error!("error updating invoice_sent_at id={} error={e}", job.id);
            }

            let callback = EmailCallback {
                status: 200,
                success_message: Some("Successfully processed the request".to_string()),
                invoice_sent_at: Some(invoice_sent_at.format(DATETIME_FORMAT).to_string()),
                id: Some(job.id),
                failed_message: None,
                failed_at: None,
            };
            clients::post_json(&state.http, &job.done_url, &callback)
                .await
                .map_err(|e| format!("error calling done url {}: {e}", job.done_url))
        }
        Err(send_err) => {
            let failed_at = Utc::now().naive_utc();
            if let Err(e) =
                sqlx::query("UPDATE emails SET failed_at = ?, invoice_sent_at = NULL WHERE id = ?")
                    .bind(failed_at)
                    .bind(job.id)
                    .execute(&state.pool)
                    .await
            {
                log::error!("error updating failed_at id={} error={e}", job.id);
            }

            let callback = EmailCallback {
                status: 500,
                failed_message: Some("Failed to process the request".to_string()),
                failed_at: Some(failed_at.format(DATETIME_FORMAT).to_string()),
                success_message: None,
                invoice_sent_at: None,
                id: None,
            };
            if let Err(e) = clients::post_json(&state.http, &job.done_url, &callback).await {
                log::error!("error calling done url {} error={e}", job.done_url);
            }

            Err(format!("failed to send invoice email: {send_err}"))
        }
    }
}

/// Manual reinjection: runs the send-and-report path synchronously and
/// returns the refreshed row.
#[get("/api/email-invoice/{id}")]
pub async fn email_invoice_by_id(path: web::Path<i32>, state: web::Data<EmailState>) -> HttpResponse {
    let id = path.into_inner();

    let job = match email_job_by_id(&state.pool, id).await {
        Ok(Some(j)) => j,
        Ok(None) => return HttpResponse::NotFound().body("Record not found"),
        Err(e) => {
            log::error!("error retrieving record id={id} error={e}");
            return HttpResponse::InternalServerError().body("Error retrieving record");
        }
    };

    let _guard = state.send_lock.lock().await;
    if let Err(e) = send_and_report(&state, &job).await {
        log::error!("email reinjection error id={id} error={e}");
        return HttpResponse::InternalServerError().finish();
    }

    match email_job_by_id(&state.pool, id).await {
        Ok(Some(job)) => HttpResponse::Ok().json(job),
        Ok(None) => HttpResponse::NotFound().body("Record not found"),
        Err(e) => {
            log::error!("error retrieving record id={id} error={e}");
            HttpResponse::InternalServerError().body("Error retrieving record")
        }
    }
}

async fn write_invoice_file(pdf_path: &Path, file_hash: &str, bytes: &[u8]) -> std::io::Result<()> {
    let dir = pdf_path.join(file_hash);
    log::info!("directory path for the PDF: {}", dir.display());
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join("invoice.pdf"), bytes).await
}

fn map_email_job(row: &MySqlRow) -> EmailJob {
    EmailJob {
        id: row.get("id"),
        product_code: row.get("product_code"),
        customer_id: row.get("customer_id"),
        invoice_id: row.get("invoice_id"),
        email_to: row.get("email_to"),
        file_hash: row.get("file_hash"),
        done_url: row.get("done_url"),
        invoice_sent_at: row.get("invoice_sent_at"),
        failed_at: row.get("failed_at"),
    }
}

async fn email_job_by_id(pool: &MySqlPool, id: i32) -> Result<Option<EmailJob>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, product_code, customer_id, invoice_id, email_to, file_hash, done_url,
                  invoice_sent_at, failed_at
           FROM emails
           WHERE id = ?"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(map_email_job))
}
