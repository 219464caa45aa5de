//! Admin token extractor.

use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use std::future::{Ready, ready};
use subtle::ConstantTimeEq;

use super::error::AppError;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Guards administrative handlers.
///
/// When `ADMIN_TOKEN` is set, the request must carry the same value in
/// `X-Admin-Token`. Without a configured token the routes are open, which
/// is only meant for development.
#[derive(Debug, Clone, Copy)]
pub struct AdminGuard;

impl FromRequest for AdminGuard {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState not found in app data");
            return ready(Err(AppError::Unauthorized));
        };

        let Some(expected) = state.admin_token.as_deref() else {
            return ready(Ok(AdminGuard));
        };

        let presented = req
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());

        match presented {
            Some(token) if tokens_match(token, expected) => ready(Ok(AdminGuard)),
            _ => {
                tracing::warn!(path = %req.path(), "Admin request rejected");
                ready(Err(AppError::Unauthorized))
            }
        }
    }
}

/// Constant-time comparison of the presented and configured tokens.
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
