use actix_web::{middleware, web, App, HttpServer};
use std::io;

use crate::handlers::{health_check, list_lineage, run_lineage, AppState};

/// Start the HTTP server
pub async fn start_server(host: &str, port: u16, workers: usize, state: AppState) -> io::Result<()> {
    let bind_addr = format!("{}:{}", host, port);
    let state = web::Data::new(state);

    tracing::info!("Starting server on {} with {} workers", bind_addr, workers);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health_check))
            .route("/lineage", web::post().to(run_lineage))
            .route("/lineage/{to_table}", web::get().to(list_lineage))
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
