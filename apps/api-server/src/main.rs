//! # Gatekeeper API Server
//!
//! The main entry point for the Actix-web HTTP server.

use std::net::IpAddr;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod background;
mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use background::BackgroundTasks;
use config::AppConfig;
use middleware::AdmissionMiddleware;
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    tracing::info!(
        "Starting Gatekeeper API Server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let background = BackgroundTasks::start(&state, &config.sweep).await;

    if !config.trusted_proxies.is_empty() {
        tracing::info!(proxies = ?config.trusted_proxies, "Trusting X-Forwarded-For from proxies");
    }

    let server_state = state.clone();
    let trusted_proxies: Arc<[IpAddr]> = config.trusted_proxies.clone().into();
    let result = HttpServer::new(move || {
        App::new()
            .wrap(
                AdmissionMiddleware::new(server_state.admission.clone(), server_state.clock.clone())
                    .trust_proxies(trusted_proxies.clone()),
            )
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(server_state.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    background.shutdown().await;
    tracing::info!("Server stopped");
    result
}
