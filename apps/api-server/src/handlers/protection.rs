//! Inbound protection administration.

use std::net::IpAddr;

use actix_web::{HttpResponse, web};
use gatekeeper_core::domain::BlockEntry;
use gatekeeper_shared::ApiResponse;
use gatekeeper_shared::dto::{BlockIpRequest, BlockedIpResponse, BlockedIpsResponse};

use crate::middleware::{AdminGuard, AppError, AppResult};
use crate::state::AppState;

const MANUAL_BLOCK_REASON: &str = "manual block";

fn parse_ip(raw: &str) -> AppResult<IpAddr> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("'{raw}' is not an IP address")))
}

fn blocked_response(entry: BlockEntry) -> BlockedIpResponse {
    BlockedIpResponse {
        ip: entry.ip.to_string(),
        blocked_until: entry.blocked_until,
        reason: entry.reason,
    }
}

/// GET /api/admin/protection
pub async fn protection_stats(_admin: AdminGuard, state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(state.admission.get_protection_stats()))
}

/// GET /api/admin/protection/blocked
pub async fn list_blocked(_admin: AdminGuard, state: web::Data<AppState>) -> HttpResponse {
    let blocked: Vec<BlockedIpResponse> = state
        .admission
        .list_blocked()
        .into_iter()
        .map(blocked_response)
        .collect();

    HttpResponse::Ok().json(ApiResponse::ok(BlockedIpsResponse {
        total: blocked.len(),
        blocked,
    }))
}

/// GET /api/admin/protection/ips/{ip}
pub async fn ip_statistics(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let ip = parse_ip(&path)?;
    // Consult the durable store so a block from before a restart shows up.
    state.admission.is_blocked(ip).await;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(state.admission.get_ip_statistics(ip))))
}

/// POST /api/admin/protection/ips/{ip}/block
pub async fn block_ip(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<BlockIpRequest>>,
) -> AppResult<HttpResponse> {
    let ip = parse_ip(&path)?;
    let reason = body
        .and_then(|body| body.into_inner().reason)
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| MANUAL_BLOCK_REASON.to_string());

    let entry = state.admission.block_ip(ip, &reason).await;
    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message(
        blocked_response(entry),
        "IP blocked",
    )))
}

/// DELETE /api/admin/protection/ips/{ip}/block
pub async fn unblock_ip(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let ip = parse_ip(&path)?;
    state.admission.unblock_ip(ip).await;
    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message(
        state.admission.get_ip_statistics(ip),
        "IP unblocked",
    )))
}
