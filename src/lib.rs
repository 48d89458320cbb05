pub mod api;
pub mod clients;
pub mod cron;
pub mod db;
pub mod docs;
pub mod mailer;
pub mod models;
pub mod pdf_render;

use sqlx::MySqlPool;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct InvoiceState {
    pub pool: MySqlPool,
    pub http: reqwest::Client,
    pub base_url: String,
    pub pdf_svc_url: String,
    pub accounts_base_url: String,
    pub customer_base_url: String,
}

#[derive(Clone)]
pub struct PdfState {
    pub pool: MySqlPool,
    pub http: reqwest::Client,
    pub base_url: String,
    pub email_svc_url: String,
    pub company: pdf_render::CompanyInfo,
    /// Serializes render + hand-off so two requests for the same invoice
    /// cannot interleave on one instance.
    pub render_lock: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Clone)]
pub struct EmailState {
    pub pool: MySqlPool,
    pub http: reqwest::Client,
    pub pdf_path: PathBuf,
    pub mailer: Arc<dyn mailer::Mailer>,
    /// Serializes the lookup-or-create section and the send job; at most one
    /// send runs at a time per instance.
    pub send_lock: Arc<tokio::sync::Mutex<()>>,
}
