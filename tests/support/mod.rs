#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::{Connection, MySqlConnection, MySqlPool};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, MutexGuard};

use invoice_pipeline::mailer::Mailer;
use invoice_pipeline::{clients, pdf_render::CompanyInfo, EmailState, InvoiceState, PdfState};

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}mysql", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: MySqlPool,
    _guard: MutexGuard<'static, ()>,
}

pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let mut admin = MySqlConnection::connect(&admin_url)
        .await
        .expect("connect admin db");

    let _ = sqlx::query("SELECT GET_LOCK('invoice_pipeline_tests', 60)")
        .execute(&mut admin)
        .await;

    let quoted_name = quote_identifier(&db_name);
    sqlx::query(&format!("DROP DATABASE IF EXISTS {quoted_name}"))
        .execute(&mut admin)
        .await
        .expect("drop test db");
    sqlx::query(&format!("CREATE DATABASE {quoted_name}"))
        .execute(&mut admin)
        .await
        .expect("create test db");

    let _ = sqlx::query("SELECT RELEASE_LOCK('invoice_pipeline_tests')")
        .execute(&mut admin)
        .await;

    let _ = admin.close().await;

    let pool = MySqlPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");

    TestDb { pool, _guard: guard }
}

pub fn invoice_state(
    pool: MySqlPool,
    base_url: &str,
    pdf_svc_url: &str,
    accounts_base_url: &str,
    customer_base_url: &str,
) -> InvoiceState {
    InvoiceState {
        pool,
        http: clients::http_client(),
        base_url: base_url.to_string(),
        pdf_svc_url: pdf_svc_url.to_string(),
        accounts_base_url: accounts_base_url.to_string(),
        customer_base_url: customer_base_url.to_string(),
    }
}

pub fn pdf_state(pool: MySqlPool, base_url: &str, email_svc_url: &str) -> PdfState {
    PdfState {
        pool,
        http: clients::http_client(),
        base_url: base_url.to_string(),
        email_svc_url: email_svc_url.to_string(),
        company: test_company(),
        render_lock: Arc::new(Mutex::new(())),
    }
}

pub fn email_state(pool: MySqlPool, pdf_path: &Path, mailer: Arc<StubMailer>) -> EmailState {
    EmailState {
        pool,
        http: clients::http_client(),
        pdf_path: PathBuf::from(pdf_path),
        mailer,
        send_lock: Arc::new(Mutex::new(())),
    }
}

pub fn test_company() -> CompanyInfo {
    CompanyInfo {
        company_no: "201912345A".to_string(),
        name: "Acme Billing Ltd".to_string(),
        address: "12 Harbour Front, Dockside, Anyport".to_string(),
        contact: "+1 (555) 000-1111".to_string(),
        logo_path: String::new(),
        logo_img_type: String::new(),
    }
}

/// Mailer stand-in that records sends and can be flipped into failure mode.
#[derive(Debug, Default)]
pub struct StubMailer {
    pub sent: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send_invoice(&self, _to: &str, attachment: &Path) -> Result<(), String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("stub smtp failure".to_string());
        }
        std::fs::metadata(attachment).map_err(|e| format!("missing attachment: {e}"))?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
