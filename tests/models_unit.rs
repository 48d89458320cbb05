use chrono::NaiveDate;
use rust_decimal::Decimal;

use invoice_pipeline::models::{
    next_invoice_date, InvoiceRef, PdfRenderRequest, Status, Subscription,
};

fn subscription(duration: i32, frequency: i32, units: &str, next: &str) -> Subscription {
    Subscription {
        id: 1,
        customer_id: "CUSTOMER-0001".to_string(),
        contract_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        duration,
        duration_units: "MONTHS".to_string(),
        billing_frequency: frequency,
        billing_frequency_units: units.to_string(),
        price: Decimal::new(103_00, 2),
        tax: 10,
        currency: "EUR".to_string(),
        product_code: "PRD-160".to_string(),
        billing_frequency_remains: 3,
        next_invoice_date: next.parse().unwrap(),
        invoicing_started_at: None,
        status: Status::NotStarted,
    }
}

fn render_request() -> PdfRenderRequest {
    PdfRenderRequest {
        product_code: "PRD-160".to_string(),
        customer_id: "CUSTOMER-0001".to_string(),
        invoice_id: "INV-1-CUSTOMER-0001-PRD-160-7".to_string(),
        email_to: "samantha.johnson@example.com".to_string(),
        invoice_date: "Jan 15, 2024".to_string(),
        name: "Samantha Johnson".to_string(),
        address: "123 Main Street, Anytown, USA".to_string(),
        contact: "+1 (555) 123-4567".to_string(),
        tax: 10,
        unit: 1,
        description: "Product 1".to_string(),
        price_per_unit: Decimal::new(103_00, 2),
        price: Decimal::new(103_00, 2),
        sub_total: Decimal::new(103_00, 2),
        tax_amount: Decimal::new(10_30, 2),
        grand_total: Decimal::new(113_30, 2),
        currency: "EUR".to_string(),
        currency_symbol: "€".to_string(),
        done_url: "http://localhost:8080/api/cb/INV-1-CUSTOMER-0001-PRD-160-7".to_string(),
    }
}

#[test]
fn invoice_ref_format_matches_expected_shape() {
    let formatted = InvoiceRef::format(1, "CUSTOMER-0001", "PRD-160", 7);
    assert_eq!(formatted, "INV-1-CUSTOMER-0001-PRD-160-7");
}

#[test]
fn invoice_ref_parse_is_left_inverse_of_format() {
    let cases = [
        (1, "CUSTOMER-0001", "PRD-160", 7),
        (42, "c", "p", 0),
        (0, "A-B-C", "PRD", 99999),
    ];

    for (subscription_id, customer_id, product_code, invoice_id) in cases {
        let formatted = InvoiceRef::format(subscription_id, customer_id, product_code, invoice_id);
        let parsed = InvoiceRef::parse(&formatted).expect("parse formatted reference");
        assert_eq!(parsed.subscription_id, subscription_id);
        assert_eq!(parsed.invoice_id, invoice_id);
        assert_eq!(parsed.subject, format!("{customer_id}-{product_code}"));
        assert_eq!(parsed.to_string(), formatted);
    }
}

#[test]
fn invoice_ref_parse_rejects_malformed_input() {
    for raw in [
        "",
        "INVALID-ID",
        "INV-1-c-p",
        "FOO-1-c-p-2",
        "INV-x-c-p-1",
        "INV-1-c-p-x",
        "INV--c-p-",
    ] {
        assert!(InvoiceRef::parse(raw).is_err(), "expected rejection for {raw:?}");
    }
}

#[test]
fn invoice_ref_parse_accepts_minimal_reference() {
    let parsed = InvoiceRef::parse("INV-1-c-p-2").unwrap();
    assert_eq!(parsed.subscription_id, 1);
    assert_eq!(parsed.invoice_id, 2);
    assert_eq!(parsed.subject, "c-p");
}

#[test]
fn status_maps_to_and_from_storage() {
    for status in [Status::NotStarted, Status::Processing, Status::Done, Status::Failed] {
        assert_eq!(Status::from_i8(status.as_i8()), status);
    }
    assert_eq!(Status::from_i8(9), Status::NotStarted);

    assert_eq!(Status::NotStarted.to_string(), "NOT_STARTED");
    assert_eq!(Status::Processing.to_string(), "PROCESSING");
    assert_eq!(Status::Done.to_string(), "DONE");
    assert_eq!(Status::Failed.to_string(), "FAILED");
}

#[test]
fn next_invoice_date_advances_by_whole_months() {
    let date = next_invoice_date(&subscription(1, 1, "MONTHS", "2024-01-15")).unwrap();
    assert_eq!(date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
}

#[test]
fn next_invoice_date_clamps_to_month_end() {
    let date = next_invoice_date(&subscription(1, 1, "MONTHS", "2024-01-31")).unwrap();
    assert_eq!(date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
}

#[test]
fn next_invoice_date_floors_non_divisible_intervals() {
    let date = next_invoice_date(&subscription(7, 2, "MONTHS", "2024-01-15")).unwrap();
    assert_eq!(date, NaiveDate::from_ymd_opt(2024, 4, 15).unwrap());
}

#[test]
fn next_invoice_date_rejects_unknown_units() {
    let err = next_invoice_date(&subscription(1, 1, "WEEKS", "2024-01-15")).unwrap_err();
    assert!(err.contains("unknown billing frequency units"));
}

#[test]
fn next_invoice_date_rejects_non_positive_frequency() {
    assert!(next_invoice_date(&subscription(1, 0, "MONTHS", "2024-01-15")).is_err());
}

#[test]
fn render_request_validation_accepts_complete_payload() {
    assert!(render_request().validate().is_ok());
}

#[test]
fn render_request_validation_rejects_missing_fields() {
    let cases: Vec<(Box<dyn Fn(&mut PdfRenderRequest)>, &str)> = vec![
        (Box::new(|r| r.product_code.clear()), "empty product code"),
        (Box::new(|r| r.customer_id.clear()), "empty customer ID"),
        (Box::new(|r| r.invoice_id.clear()), "empty invoice ID"),
        (Box::new(|r| r.email_to.clear()), "empty email to"),
        (Box::new(|r| r.invoice_date.clear()), "empty invoice date"),
        (Box::new(|r| r.name.clear()), "empty name"),
        (Box::new(|r| r.address.clear()), "empty address"),
        (Box::new(|r| r.contact.clear()), "empty contact"),
        (Box::new(|r| r.tax = -1), "invalid tax"),
        (Box::new(|r| r.unit = 0), "invalid unit"),
        (Box::new(|r| r.currency.clear()), "empty currency"),
        (Box::new(|r| r.currency_symbol.clear()), "empty currency symbol"),
        (Box::new(|r| r.done_url.clear()), "empty done URL"),
    ];

    for (mutate, expected) in cases {
        let mut request = render_request();
        mutate(&mut request);
        assert_eq!(request.validate().unwrap_err(), expected);
    }
}
