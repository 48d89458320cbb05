// Invoice coordinator: owns the subscription and invoice tables, runs the
// daily invoicing dispatch and the hourly stall sweep, and exposes the
// terminal callback endpoint.

use actix_web::{web, App, HttpServer};
use dotenvy::dotenv;
use sqlx::mysql::MySqlPoolOptions;
use std::env;
use tokio_cron_scheduler::{Job, JobScheduler};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use invoice_pipeline::{api, clients, cron, docs, InvoiceState};

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

    let state = InvoiceState {
        pool,
        http: clients::http_client(),
        base_url: env::var("BASE_URL").expect("BASE_URL must be set"),
        pdf_svc_url: env::var("PDF_SVC").expect("PDF_SVC must be set"),
        accounts_base_url: env::var("ACCOUNTS_SERVICE_BASE_URL")
            .expect("ACCOUNTS_SERVICE_BASE_URL must be set"),
        customer_base_url: env::var("CUSTOMER_SERVICE_BASE_URL")
            .expect("CUSTOMER_SERVICE_BASE_URL must be set"),
    };

    let scheduler = JobScheduler::new()
        .await
        .expect("Failed to create job scheduler");

    // Hourly: reap invoices stuck in PROCESSING.
    let sweep_state = state.clone();
    scheduler
        .add(
            Job::new_async("0 0 * * * *", move |_uuid, _l| {
                let state = sweep_state.clone();
                Box::pin(async move {
                    log::info!("Running hourly stall sweep");
                    cron::sweep_stalled_invoices(&state.pool, chrono::Utc::now().naive_utc()).await;
                })
            })
            .expect("Invalid stall sweep schedule"),
        )
        .await
        .expect("Failed to schedule stall sweep");

    // Daily: dispatch due subscriptions into the render pipeline.
    let dispatch_state = state.clone();
    scheduler
        .add(
            Job::new_async("0 0 0 * * *", move |_uuid, _l| {
                let state = dispatch_state.clone();
                Box::pin(async move {
                    log::info!("Running daily invoicing dispatch");
                    cron::dispatch_due_subscriptions(&state, chrono::Utc::now().naive_utc()).await;
                })
            })
            .expect("Invalid dispatch schedule"),
        )
        .await
        .expect("Failed to schedule invoicing dispatch");

    scheduler.start().await.expect("Failed to start job scheduler");

    let port: u16 = env::var("PORT")
        .expect("PORT must be set")
        .parse()
        .expect("PORT must be a number");
    let data = web::Data::new(state);

    log::info!("Server listening on port {port}");
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(
                SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .service(api::invoice::health)
            .service(api::invoice::invoice_callback)
    })
    .shutdown_timeout(10)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
