// Customer lookup service: read-only contact snapshots by customer id.

use actix_web::{App, HttpServer};
use dotenvy::dotenv;
use std::env;

use invoice_pipeline::api;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let port: u16 = env::var("PORT")
        .expect("PORT must be set")
        .parse()
        .expect("PORT must be a number");

    log::info!("Server listening on port {port}");
    HttpServer::new(|| App::new().service(api::lookup::customer_lookup))
        .shutdown_timeout(10)
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
