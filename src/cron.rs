// src/cron.rs
//
// Bodies of the two scheduled ticks owned by the invoice coordinator: the
// daily invoicing dispatch and the hourly stall sweep. Both take the tick
// instant as a parameter so they stay drivable from tests.

use chrono::{Duration, NaiveDateTime};
use sqlx::MySqlPool;

use crate::models::{Invoice, PdfRenderRequest, Status};
use crate::{api, clients, db, InvoiceState};

/// How long an invoice may stay PROCESSING before the sweep declares it dead.
pub const STALL_THRESHOLD_MINUTES: i64 = 10;

/// Daily tick: claims up to ten due subscriptions, snapshots pricing and
/// customer data, writes the invoice and hands the render off to the PDF
/// service. The downstream POST happens inside the transaction so a failed
/// hand-off rolls the claim back and the subscription stays eligible.
pub async fn dispatch_due_subscriptions(state: &InvoiceState, now: NaiveDateTime) {
    let subscriptions = match db::due_subscriptions(&state.pool, now).await {
        Ok(s) => s,
        Err(e) => {
            log::error!("error loading due subscriptions: {e}");
            return;
        }
    };

    for subscription in subscriptions {
        log::info!(
            "processing subscription id={} customer={} product={}",
            subscription.id,
            subscription.customer_id,
            subscription.product_code
        );

        let account = match clients::fetch_account(
            &state.http,
            &state.accounts_base_url,
            &subscription.customer_id,
            &subscription.product_code,
        )
        .await
        {
            Ok(a) => a,
            Err(e) => {
                log::error!("accounts lookup error subscription_id={} error={e}", subscription.id);
                continue;
            }
        };

        let customer = match clients::fetch_customer(
            &state.http,
            &state.customer_base_url,
            &subscription.customer_id,
        )
        .await
        {
            Ok(c) => c,
            Err(e) => {
                log::error!("customer lookup error subscription_id={} error={e}", subscription.id);
                continue;
            }
        };

        let invoicing_started_at = now;
        let mut invoice = Invoice {
            id: 0,
            subscription_id: subscription.id,
            customer_id: subscription.customer_id.clone(),
            product_code: subscription.product_code.clone(),
            email_to: customer.email,
            invoice_date: subscription.next_invoice_date,
            name: customer.name,
            address: customer.address,
            contact: customer.contact,
            tax: account.tax,
            unit: account.quantity,
            description: account.product_description,
            price_per_unit: account.unit_price,
            price: account.price,
            sub_total: account.sub_total,
            tax_amount: account.tax_amount,
            grand_total: account.grand_total,
            currency: account.currency,
            currency_symbol: account.currency_symbol,
            invoicing_started_at,
            status: Status::Processing,
        };

        let mut tx = match state.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                log::error!("error beginning transaction subscription_id={} error={e}", subscription.id);
                continue;
            }
        };

        if let Err(e) = db::insert_invoice(&mut tx, &mut invoice).await {
            log::error!("error inserting invoice subscription_id={} error={e}", subscription.id);
            let _ = tx.rollback().await;
            continue;
        }

        if let Err(e) =
            db::mark_subscription_processing(&mut tx, invoicing_started_at, subscription.id).await
        {
            log::error!("error updating subscription status id={} error={e}", subscription.id);
            let _ = tx.rollback().await;
            continue;
        }

        // The hand-off gates the commit: no live render job, no PROCESSING claim.
        let request = render_request_for(&invoice, &state.base_url);
        if let Err(e) = clients::post_json(&state.http, &state.pdf_svc_url, &request).await {
            log::error!(
                "pdf service call failed subscription_id={} invoice={} error={e}",
                subscription.id,
                invoice.invoice_ref()
            );
            let _ = tx.rollback().await;
            continue;
        }

        if let Err(e) = tx.commit().await {
            log::error!("error committing transaction subscription_id={} error={e}", subscription.id);
            continue;
        }

        log::info!(
            "processed subscription id={} invoice={}",
            subscription.id,
            invoice.invoice_ref()
        );
    }

    log::info!("daily invoicing dispatch finished");
}

fn render_request_for(invoice: &Invoice, base_url: &str) -> PdfRenderRequest {
    PdfRenderRequest {
        product_code: invoice.product_code.clone(),
        customer_id: invoice.customer_id.clone(),
        invoice_id: invoice.invoice_ref(),
        email_to: invoice.email_to.clone(),
        invoice_date: invoice.invoice_date.format("%b %d, %Y").to_string(),
        name: invoice.name.clone(),
        address: invoice.address.clone(),
        contact: invoice.contact.clone(),
        tax: invoice.tax,
        unit: invoice.unit,
        description: invoice.description.clone(),
        price_per_unit: invoice.price_per_unit,
        price: invoice.price,
        sub_total: invoice.sub_total,
        tax_amount: invoice.tax_amount,
        grand_total: invoice.grand_total,
        currency: invoice.currency.clone(),
        currency_symbol: invoice.currency_symbol.clone(),
        done_url: format!("{}{}/{}", base_url, api::invoice::CB_PATH, invoice.invoice_ref()),
    }
}

/// Hourly tick: any invoice PROCESSING for longer than the stall threshold is
/// forced to FAILED and its subscription released. Re-running the sweep over
/// already swept rows is a no-op because failed invoices no longer match.
pub async fn sweep_stalled_invoices(pool: &MySqlPool, now: NaiveDateTime) {
    let cutoff = now - Duration::minutes(STALL_THRESHOLD_MINUTES);
    let invoices = match db::stalled_invoices(pool, cutoff).await {
        Ok(i) => i,
        Err(e) => {
            log::error!("error loading stalled invoices: {e}");
            return;
        }
    };

    for invoice in invoices {
        let subscription = match db::subscription_for_invoice(pool, &invoice).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                log::warn!(
                    "no live subscription for stalled invoice id={} subscription_id={}",
                    invoice.id,
                    invoice.subscription_id
                );
                continue;
            }
            Err(e) => {
                log::error!("error loading subscription for invoice id={} error={e}", invoice.id);
                continue;
            }
        };

        let mut tx = match pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                log::error!("error beginning transaction invoice_id={} error={e}", invoice.id);
                continue;
            }
        };

        if let Err(e) = db::set_invoice_status(&mut tx, invoice.id, Status::Failed).await {
            log::error!("error failing invoice id={} error={e}", invoice.id);
            let _ = tx.rollback().await;
            continue;
        }

        if let Err(e) = db::complete_subscription(
            &mut tx,
            subscription.id,
            subscription.billing_frequency_remains,
            Status::Failed,
            subscription.next_invoice_date,
        )
        .await
        {
            log::error!("error releasing subscription id={} error={e}", subscription.id);
            let _ = tx.rollback().await;
            continue;
        }

        if let Err(e) = tx.commit().await {
            log::error!("error committing stall sweep invoice_id={} error={e}", invoice.id);
            continue;
        }

        log::warn!(
            "swept stalled invoice id={} subscription_id={} started_at={}",
            invoice.id,
            invoice.subscription_id,
            invoice.invoicing_started_at
        );
    }

    log::info!("hourly stall sweep finished");
}
