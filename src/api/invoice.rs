// src/api/invoice.rs
//
// Invoice coordinator HTTP surface: the health probe and the terminal
// callback that commits a billing outcome and advances the schedule.

use actix_web::{get, post, web, HttpResponse, Responder};

use crate::models::{self, InvoiceCallback, InvoiceRef, Status};
use crate::{db, InvoiceState};

pub const CB_PATH: &str = "/api/cb";

#[get("/api/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

#[utoipa::path(
    post,
    path = "/api/cb/{invoiceID}",
    tag = "invoice",
    params(
        ("invoiceID" = String, Path, description = "Composite invoice reference INV-{subscription}-{customer}-{product}-{invoice}")
    ),
    request_body = InvoiceCallback,
    responses(
        (status = 200, description = "Outcome committed"),
        (status = 404, description = "Malformed reference or unknown invoice"),
        (status = 500, description = "Transaction failed")
    )
)]
#[post("/api/cb/{invoice_id}")]
pub async fn invoice_callback(
    path: web::Path<String>,
    payload: web::Json<InvoiceCallback>,
    state: web::Data<InvoiceState>,
) -> HttpResponse {
    let raw = path.into_inner();
    let payload = payload.into_inner();

    let parsed = match InvoiceRef::parse(&raw) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("invoice callback parse error reference={raw} error={e}");
            return HttpResponse::NotFound().finish();
        }
    };

    let invoice = match db::invoice_by_ref(&state.pool, parsed.invoice_id, parsed.subscription_id).await
    {
        Ok(Some(i)) => i,
        Ok(None) => {
            log::warn!("invoice callback for unknown invoice reference={raw}");
            return HttpResponse::NotFound().finish();
        }
        Err(e) => {
            log::error!("error loading invoice reference={raw} error={e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // The numeric keys located a row; the full reference must match it too.
    if invoice.invoice_ref() != raw {
        log::warn!(
            "invoice callback reference mismatch presented={raw} stored={}",
            invoice.invoice_ref()
        );
        return HttpResponse::NotFound().finish();
    }

    let subscription = match db::subscription_for_invoice(&state.pool, &invoice).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            log::warn!("no live subscription for invoice reference={raw}");
            return HttpResponse::NotFound().finish();
        }
        Err(e) => {
            log::error!("error loading subscription reference={raw} error={e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let mut status = Status::Failed;
    let mut next_invoice_date = subscription.next_invoice_date;
    let mut billing_frequency_remains = subscription.billing_frequency_remains;
    if payload.email_service_status == 200 {
        next_invoice_date = match models::next_invoice_date(&subscription) {
            Ok(d) => d,
            Err(e) => {
                log::error!("error computing next invoice date subscription_id={} error={e}", subscription.id);
                return HttpResponse::InternalServerError().finish();
            }
        };
        status = Status::Done;
        billing_frequency_remains -= 1;
    }

    let mut tx = match state.pool.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            log::error!("error beginning transaction reference={raw} error={e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = db::set_invoice_status(&mut tx, invoice.id, status).await {
        log::error!("error setting invoice status id={} error={e}", invoice.id);
        let _ = tx.rollback().await;
        return HttpResponse::InternalServerError().finish();
    }

    if let Err(e) = db::complete_subscription(
        &mut tx,
        subscription.id,
        billing_frequency_remains,
        status,
        next_invoice_date,
    )
    .await
    {
        log::error!("error updating subscription id={} error={e}", subscription.id);
        let _ = tx.rollback().await;
        return HttpResponse::InternalServerError().finish();
    }

    if let Err(e) = tx.commit().await {
        log::error!("error committing callback transaction reference={raw} error={e}");
        return HttpResponse::InternalServerError().finish();
    }

    log::info!(
        "invoice callback committed reference={raw} status={status} email_service_status={} remains={billing_frequency_remains}",
        payload.email_service_status
    );

    HttpResponse::Ok().finish()
}
