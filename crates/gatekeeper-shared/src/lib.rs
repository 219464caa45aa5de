//! # Gatekeeper Shared
//!
//! Wire types for the administrative API, usable by clients without
//! pulling in the server crates.

pub mod dto;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
