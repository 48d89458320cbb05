// PDF renderer service: owns the pdf_invoices snapshot table, renders
// invoices asynchronously and relays email outcomes to the coordinator.

use actix_web::{web, App, HttpServer};
use dotenvy::dotenv;
use sqlx::mysql::MySqlPoolOptions;
use std::env;
use std::sync::Arc;

use invoice_pipeline::{api, clients, pdf_render::CompanyInfo, PdfState};

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

    let state = web::Data::new(PdfState {
        pool,
        http: clients::http_client(),
        base_url: env::var("BASE_URL").expect("BASE_URL must be set"),
        email_svc_url: env::var("EMAIL_SVC").expect("EMAIL_SVC must be set"),
        company: CompanyInfo::from_env(),
        render_lock: Arc::new(tokio::sync::Mutex::new(())),
    });

    let port: u16 = env::var("PORT")
        .expect("PORT must be set")
        .parse()
        .expect("PORT must be a number");

    log::info!("Server listening on port {port}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(api::pdf::generate_invoice_pdf)
            .service(api::pdf::invoice_pdf_by_id)
            .service(api::pdf::invoice_pdf_callback)
    })
    .shutdown_timeout(30)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
