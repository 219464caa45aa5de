//! PostgreSQL persistence for the block list.

mod connections;

#[cfg(feature = "postgres")]
mod block_repo;

#[cfg(feature = "postgres")]
pub mod entity;

pub use connections::DatabaseConfig;

#[cfg(feature = "postgres")]
pub use block_repo::PostgresBlockStore;
