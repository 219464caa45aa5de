//! Middleware and extractors.

pub mod admin;
pub mod admission;
pub mod error;

pub use admin::AdminGuard;
pub use admission::AdmissionMiddleware;
pub use error::{AppError, AppResult};
