//! # Gatekeeper Core
//!
//! The domain layer of the gatekeeper.
//! This crate holds the state rules for admission control and credential
//! rotation, plus the ports infrastructure must implement. It has zero
//! infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::{AdmissionError, ConfigError, RepoError, UpstreamError, UpstreamFailure};
