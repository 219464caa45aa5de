//! # Gatekeeper Infrastructure
//!
//! Concrete implementations of the ports defined in `gatekeeper-core`,
//! plus the two gatekeeping services built on them:
//!
//! - [`AdmissionController`] decides per request whether to admit inbound
//!   traffic, and blocks abusive addresses.
//! - [`CapacityManager`] rotates a pool of upstream credentials, ejects
//!   failing ones and retries calls across the pool.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `postgres` - Durable block list in PostgreSQL via SeaORM
//! - `redis` - Durable block list in Redis
//! - `http-client` - reqwest-based upstream client

pub mod admission;
pub mod block_store;
pub mod capacity;
pub mod config;
pub mod counter;
pub mod database;
pub mod sweeper;
pub mod upstream;

pub use admission::AdmissionController;
pub use block_store::InMemoryBlockStore;
pub use capacity::CapacityManager;
pub use config::{AdmissionConfig, CapacityConfig, GatekeeperConfig};
pub use counter::WindowCounterStore;
pub use sweeper::{Sweeper, SweeperHandle};

#[cfg(feature = "postgres")]
pub use database::PostgresBlockStore;

#[cfg(feature = "redis")]
pub use block_store::{RedisBlockStore, RedisConfig};

#[cfg(feature = "http-client")]
pub use upstream::{HttpUpstreamClient, HttpUpstreamConfig};
