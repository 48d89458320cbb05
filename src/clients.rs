// src/clients.rs
//
// Outbound HTTP plumbing shared by the pipeline services. Every call is
// bounded by a 10 second client deadline.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::models::{Account, Customer};

#[derive(Debug)]
pub enum ClientError {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Http(e) => write!(f, "http error: {e}"),
            ClientError::Status { status, body } => {
                write!(f, "unexpected status code: {status} body={body}")
            }
            ClientError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build http client")
}

/// POSTs a JSON body and treats anything but 200 as an error.
pub async fn post_json<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> Result<(), ClientError> {
    let resp = client.post(url).json(body).send().await?;

    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(())
}

pub async fn fetch_account(
    client: &reqwest::Client,
    base_url: &str,
    customer_id: &str,
    product_id: &str,
) -> Result<Account, ClientError> {
    let url = format!("{base_url}/api/accounts/{customer_id}/{product_id}");
    fetch_json(client, &url).await
}

pub async fn fetch_customer(
    client: &reqwest::Client,
    base_url: &str,
    customer_id: &str,
) -> Result<Customer, ClientError> {
    let url = format!("{base_url}/api/customers/{customer_id}");
    fetch_json(client, &url).await
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ClientError> {
    let resp = client.get(url).send().await?;

    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str::<T>(&body)
        .map_err(|e| ClientError::InvalidResponse(format!("{e}; body={body}")))
}
