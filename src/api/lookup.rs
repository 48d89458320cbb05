// src/api/lookup.rs
//
// Read-only accounts and customer lookups over fixture data. No state.

use actix_web::{get, web, HttpResponse};
use rust_decimal::Decimal;

use crate::models::{Account, Customer};

fn account(customer_id: &str, product_id: &str) -> Option<Account> {
    match (customer_id, product_id) {
        ("CUSTOMER-0001", "PRD-160") | ("CUSTOMER-0002", "PRD-160") => Some(Account {
            product_description: "Product 1".to_string(),
            quantity: 1,
            unit_price: Decimal::new(103_00, 2),
            price: Decimal::new(103_00, 2),
            sub_total: Decimal::new(103_00, 2),
            tax: 10,
            tax_amount: Decimal::new(10_30, 2),
            grand_total: Decimal::new(113_30, 2),
            currency: "EUR".to_string(),
            currency_symbol: "€".to_string(),
        }),
        ("CUSTOMER-0003", "PRD-400") => Some(Account {
            product_description: "Product 2".to_string(),
            quantity: 2,
            unit_price: Decimal::new(10_50, 2),
            price: Decimal::new(21_00, 2),
            sub_total: Decimal::new(21_00, 2),
            tax: 5,
            tax_amount: Decimal::new(1_05, 2),
            grand_total: Decimal::new(22_05, 2),
            currency: "USD".to_string(),
            currency_symbol: "$".to_string(),
        }),
        ("CUSTOMER-0004", "PRD-799") => Some(Account {
            product_description: "Product 3".to_string(),
            quantity: 1,
            unit_price: Decimal::new(10_50, 2),
            price: Decimal::new(10_50, 2),
            sub_total: Decimal::new(10_50, 2),
            tax: 10,
            tax_amount: Decimal::new(1_05, 2),
            grand_total: Decimal::new(11_05, 2),
            currency: "GBP".to_string(),
            currency_symbol: "£".to_string(),
        }),
        _ => None,
    }
}

fn customer(customer_id: &str) -> Option<Customer> {
    match customer_id {
        "CUSTOMER-0001" => Some(Customer {
            name: "Samantha Johnson".to_string(),
            email: "samantha.johnson@example.com".to_string(),
            address: "123 Main Street, Anytown, USA".to_string(),
            contact: "+1 (555) 123-4567".to_string(),
        }),
        "CUSTOMER-0002" => Some(Customer {
            name: "Michael Thompson".to_string(),
            email: "michael.thompson@example.com".to_string(),
            address: "456 Elm Street, Anycity, USA".to_string(),
            contact: "+1 (555) 987-6543".to_string(),
        }),
        "CUSTOMER-0003" => Some(Customer {
            name: "Emily Rodriguez".to_string(),
            email: "emily.rodriguez@example.com".to_string(),
            address: "789 Oak Avenue, Anyville, USA".to_string(),
            contact: "+1 (555) 321-7890".to_string(),
        }),
        "CUSTOMER-0004" => Some(Customer {
            name: "David Lee".to_string(),
            email: "david.lee@example.com".to_string(),
            address: "101 Pine Road, Anystate, USA".to_string(),
            contact: "+1 (555) 876-5432".to_string(),
        }),
        _ => None,
    }
}

#[get("/api/accounts/{customer_id}/{product_id}")]
pub async fn account_lookup(path: web::Path<(String, String)>) -> HttpResponse {
    let (customer_id, product_id) = path.into_inner();

    match account(&customer_id, &product_id) {
        Some(account) => HttpResponse::Ok().json(account),
        None => HttpResponse::NotFound().finish(),
    }
}

#[get("/api/customers/{customer_id}")]
pub async fn customer_lookup(path: web::Path<String>) -> HttpResponse {
    let customer_id = path.into_inner();

    match customer(&customer_id) {
        Some(customer) => HttpResponse::Ok().json(customer),
        None => HttpResponse::NotFound().finish(),
    }
}
