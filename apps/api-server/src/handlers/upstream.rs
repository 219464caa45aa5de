//! Upstream relay and credential pool visibility.

use actix_web::{HttpResponse, http::StatusCode, web};
use gatekeeper_core::domain::UpstreamRequest;
use gatekeeper_shared::ApiResponse;

use crate::middleware::{AdminGuard, AppError, AppResult};
use crate::state::AppState;

fn valid_operation(operation: &str) -> bool {
    !operation.is_empty()
        && operation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// POST /api/upstream/{operation}
///
/// Forwards the JSON body to the provider through the credential pool.
pub async fn relay(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let operation = path.into_inner();
    if !valid_operation(&operation) {
        return Err(AppError::BadRequest(format!(
            "'{operation}' is not a valid operation name"
        )));
    }

    let request = UpstreamRequest::new(operation, body.into_inner());
    let response = state.capacity.perform_call(&request).await?;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    Ok(HttpResponse::build(status).json(response.body))
}

/// GET /api/admin/upstream/usage
pub async fn usage_stats(_admin: AdminGuard, state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(state.capacity.get_usage_stats()))
}
