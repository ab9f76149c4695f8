//! # Forno API Server
//!
//! The main entry point for the Actix-web HTTP server.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod observability;
mod state;
mod telemetry;

use config::AppConfig;
use observability::RequestIdMiddleware;
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Forno API Server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config).await;

    // The in-process limiter accumulates a bucket per caller; sweep idle
    // ones in the background so the map tracks active traffic only.
    if let Some(limiter) = state.sweeper.clone() {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tick.tick().await;
                limiter.sweep().await;
            }
        });
    }

    HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure_routes);

        // Admission runs inside the request-id span and ahead of handlers.
        #[cfg(feature = "rate-limit")]
        let app = app.wrap(middleware::admission::AdmissionFilter::new(
            state.limiter.clone(),
            state.rate_limit.clone(),
            state.token_service.clone(),
        ));

        app.wrap(TracingLogger::default()).wrap(RequestIdMiddleware)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
