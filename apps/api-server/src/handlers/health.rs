//! Health check endpoint.

use actix_web::{HttpResponse, web};
use gatekeeper_shared::dto::HealthResponse;

use crate::state::AppState;

/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.clock.now(),
        block_store: state.block_store.to_string(),
        upstream_credentials: state.capacity.len(),
    };

    HttpResponse::Ok().json(response)
}
