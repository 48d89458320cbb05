// Email dispatcher: owns the emails table and the PDF directory, sends
// invoices over SMTP and reports outcomes back to the PDF service.

use actix_web::{web, App, HttpServer};
use dotenvy::dotenv;
use sqlx::mysql::MySqlPoolOptions;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use invoice_pipeline::mailer::SmtpMailer;
use invoice_pipeline::{api, clients, EmailState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let dsn = env::var("MYSQL_DSN").expect("MYSQL_DSN must be set");
    let pool = MySqlPoolOptions::new()
        .connect(&dsn)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let mailer = SmtpMailer::from_env().expect("Failed to configure SMTP mailer");

    let state = web::Data::new(EmailState {
        pool,
        http: clients::http_client(),
        pdf_path: PathBuf::from(env::var("PDF_PATH").expect("PDF_PATH must be set")),
        mailer: Arc::new(mailer),
        send_lock: Arc::new(tokio::sync::Mutex::new(())),
    });

    let port: u16 = env::var("PORT")
        .expect("PORT must be set")
        .parse()
        .expect("PORT must be a number");

    log::info!("Server listening on port {port}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(api::email::email_invoice)
            .service(api::email::email_invoice_by_id)
    })
    .shutdown_timeout(10)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
