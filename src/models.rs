// src/models.rs

use chrono::{Months, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Serialization format for DATETIME instants crossing service boundaries.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const INVOICE_REF_TAG: &str = "INV";
/// Both the coordinator and the PDF service build and parse the composite
/// invoice reference with this separator.
pub const INVOICE_REF_SEPARATOR: char = '-';

/// Lifecycle state shared by subscriptions and invoices, stored as TINYINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Processing,
    Done,
    Failed,
}

impl Status {
    pub fn from_i8(value: i8) -> Status {
        match value {
            1 => Status::Processing,
            2 => Status::Done,
            3 => Status::Failed,
            _ => Status::NotStarted,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Status::NotStarted => 0,
            Status::Processing => 1,
            Status::Done => 2,
            Status::Failed => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::NotStarted => "NOT_STARTED",
            Status::Processing => "PROCESSING",
            Status::Done => "DONE",
            Status::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i32,
    pub customer_id: String,
    pub contract_start_date: NaiveDate,
    pub duration: i32,
    pub duration_units: String,
    pub billing_frequency: i32,
    pub billing_frequency_units: String,
    pub price: Decimal,
    pub tax: i32,
    pub currency: String,
    pub product_code: String,
    pub billing_frequency_remains: i32,
    pub next_invoice_date: NaiveDate,
    pub invoicing_started_at: Option<NaiveDateTime>,
    pub status: Status,
}

/// One billing attempt against a subscription. The customer and pricing
/// fields are a snapshot taken at invoicing time and never mutated.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub id: i32,
    pub subscription_id: i32,
    pub customer_id: String,
    pub product_code: String,
    pub email_to: String,
    pub invoice_date: NaiveDate,
    pub name: String,
    pub address: String,
    pub contact: String,
    pub tax: i32,
    pub unit: i32,
    pub description: String,
    pub price_per_unit: Decimal,
    pub price: Decimal,
    pub sub_total: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub currency: String,
    pub currency_symbol: String,
    pub invoicing_started_at: NaiveDateTime,
    pub status: Status,
}

impl Invoice {
    /// The composite reference that correlates this invoice across services.
    pub fn invoice_ref(&self) -> String {
        InvoiceRef::format(
            self.subscription_id,
            &self.customer_id,
            &self.product_code,
            self.id,
        )
    }
}

/// Parsed form of the composite invoice reference
/// `INV-{subscription_id}-{customer_id}-{product_code}-{invoice_id}`.
///
/// Customer and product codes may themselves contain the separator, so the
/// segment between the two numeric ends stays opaque here. Callers that need
/// to authenticate the full reference load the invoice by its numeric keys
/// and compare the re-formatted reference with the presented string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRef {
    pub subscription_id: i32,
    pub invoice_id: i32,
    pub subject: String,
}

impl InvoiceRef {
    pub fn format(subscription_id: i32, customer_id: &str, product_code: &str, invoice_id: i32) -> String {
        let sep = INVOICE_REF_SEPARATOR;
        format!("{INVOICE_REF_TAG}{sep}{subscription_id}{sep}{customer_id}{sep}{product_code}{sep}{invoice_id}")
    }

    pub fn parse(raw: &str) -> Result<InvoiceRef, String> {
        let parts: Vec<&str> = raw.split(INVOICE_REF_SEPARATOR).collect();
        if parts.len() < 5 || parts[0] != INVOICE_REF_TAG {
            return Err("invalid invoice reference format".to_string());
        }

        let subscription_id: i32 = parts[1]
            .parse()
            .map_err(|_| "invalid subscription id in invoice reference".to_string())?;
        let invoice_id: i32 = parts[parts.len() - 1]
            .parse()
            .map_err(|_| "invalid invoice id in invoice reference".to_string())?;

        Ok(InvoiceRef {
            subscription_id,
            invoice_id,
            subject: parts[2..parts.len() - 1].join(&INVOICE_REF_SEPARATOR.to_string()),
        })
    }
}

impl fmt::Display for InvoiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = INVOICE_REF_SEPARATOR;
        write!(
            f,
            "{INVOICE_REF_TAG}{sep}{}{sep}{}{sep}{}",
            self.subscription_id, self.subject, self.invoice_id
        )
    }
}

/// Computes the follow-up invoice date after a successful billing cycle.
/// Only the `MONTHS` billing frequency unit is defined.
pub fn next_invoice_date(subscription: &Subscription) -> Result<NaiveDate, String> {
    match subscription.billing_frequency_units.as_str() {
        "MONTHS" => {
            if subscription.billing_frequency <= 0 {
                return Err(format!(
                    "invalid billing frequency: {}",
                    subscription.billing_frequency
                ));
            }
            let months = subscription.duration / subscription.billing_frequency;
            let months = u32::try_from(months)
                .map_err(|_| format!("invalid billing interval: {months} months"))?;
            subscription
                .next_invoice_date
                .checked_add_months(Months::new(months))
                .ok_or_else(|| "next invoice date out of range".to_string())
        }
        other => Err(format!("unknown billing frequency units: {other}")),
    }
}

/// Snapshot row owned by the PDF renderer, keyed by the composite reference.
#[derive(Debug, Clone)]
pub struct PdfInvoice {
    pub id: i32,
    pub product_code: String,
    pub customer_id: String,
    pub invoice_id: String,
    pub email_to: String,
    pub invoice_date: String,
    pub name: String,
    pub address: String,
    pub contact: String,
    pub tax: i32,
    pub unit: i32,
    pub description: String,
    pub price_per_unit: Decimal,
    pub price: Decimal,
    pub sub_total: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub currency: String,
    pub currency_symbol: String,
    pub done_url: String,
    pub email_service_id: Option<i32>,
    pub email_service_message: Option<String>,
    pub email_service_status: Option<i16>,
    pub email_service_triggered_at: Option<NaiveDateTime>,
}

/// Row owned by the email dispatcher. Exactly one of `invoice_sent_at` /
/// `failed_at` is set once the job is terminal.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EmailJob {
    pub id: i32,
    #[serde(rename = "productCode")]
    pub product_code: String,
    #[serde(rename = "customerID")]
    pub customer_id: String,
    #[serde(rename = "invoiceID")]
    pub invoice_id: String,
    #[serde(rename = "emailTo")]
    pub email_to: String,
    #[serde(rename = "fileHash")]
    pub file_hash: String,
    #[serde(rename = "doneURL")]
    pub done_url: String,
    #[serde(rename = "invoiceSentAt")]
    pub invoice_sent_at: Option<NaiveDateTime>,
    #[serde(rename = "failedAt")]
    pub failed_at: Option<NaiveDateTime>,
}

/// Render request the coordinator POSTs to the PDF service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PdfRenderRequest {
    #[serde(rename = "productCode")]
    pub product_code: String,
    #[serde(rename = "customerID")]
    pub customer_id: String,
    #[serde(rename = "invoiceID")]
    pub invoice_id: String,
    #[serde(rename = "emailTo")]
    pub email_to: String,
    #[serde(rename = "invoiceDate")]
    pub invoice_date: String,
    pub name: String,
    pub address: String,
    pub contact: String,
    pub tax: i32,
    pub unit: i32,
    pub description: String,
    #[serde(rename = "pricePerUnit")]
    pub price_per_unit: Decimal,
    pub price: Decimal,
    #[serde(rename = "subTotal")]
    pub sub_total: Decimal,
    #[serde(rename = "taxAmount")]
    pub tax_amount: Decimal,
    #[serde(rename = "grandTotal")]
    pub grand_total: Decimal,
    pub currency: String,
    #[serde(rename = "currencySymbol")]
    pub currency_symbol: String,
    #[serde(rename = "doneURL")]
    pub done_url: String,
}

impl PdfRenderRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.product_code.is_empty() {
            return Err("empty product code".to_string());
        }
        if self.customer_id.is_empty() {
            return Err("empty customer ID".to_string());
        }
        if self.invoice_id.is_empty() {
            return Err("empty invoice ID".to_string());
        }
        if self.email_to.is_empty() {
            return Err("empty email to".to_string());
        }
        if self.invoice_date.is_empty() {
            return Err("empty invoice date".to_string());
        }
        if self.name.is_empty() {
            return Err("empty name".to_string());
        }
        if self.address.is_empty() {
            return Err("empty address".to_string());
        }
        if self.contact.is_empty() {
            return Err("empty contact".to_string());
        }
        if self.tax < 0 {
            return Err("invalid tax".to_string());
        }
        if self.unit <= 0 {
            return Err("invalid unit".to_string());
        }
        if self.currency.is_empty() {
            return Err("empty currency".to_string());
        }
        if self.currency_symbol.is_empty() {
            return Err("empty currency symbol".to_string());
        }
        if self.done_url.is_empty() {
            return Err("empty done URL".to_string());
        }
        Ok(())
    }
}

/// Callback the email dispatcher POSTs back to the PDF service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailCallback {
    pub status: i16,
    #[serde(rename = "failedMessage", skip_serializing_if = "Option::is_none")]
    pub failed_message: Option<String>,
    #[serde(rename = "failedAt", skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    #[serde(rename = "successMessage", skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(rename = "invoiceSentAt", skip_serializing_if = "Option::is_none")]
    pub invoice_sent_at: Option<String>,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
}

/// Terminal callback the PDF service relays to the invoice coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceCallback {
    pub id: i32,
    #[serde(rename = "emailServiceID", skip_serializing_if = "Option::is_none")]
    pub email_service_id: Option<i32>,
    #[serde(rename = "emailServiceMessage")]
    pub email_service_message: String,
    #[serde(rename = "emailServiceStatus")]
    pub email_service_status: i16,
    #[serde(rename = "emailServiceTriggeredAt")]
    pub email_service_triggered_at: String,
}

/// Pricing snapshot served by the accounts lookup service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Account {
    #[serde(rename = "productDescription")]
    pub product_description: String,
    pub quantity: i32,
    #[serde(rename = "unitPrice")]
    pub unit_price: Decimal,
    pub price: Decimal,
    #[serde(rename = "subTotal")]
    pub sub_total: Decimal,
    pub tax: i32,
    #[serde(rename = "taxAmount")]
    pub tax_amount: Decimal,
    #[serde(rename = "grandTotal")]
    pub grand_total: Decimal,
    pub currency: String,
    #[serde(rename = "currencySymbol")]
    pub currency_symbol: String,
}

/// Contact snapshot served by the customer lookup service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub address: String,
    pub contact: String,
}
