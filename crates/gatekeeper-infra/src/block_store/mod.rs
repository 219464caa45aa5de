//! Durable block list implementations.

mod memory;

pub use memory::InMemoryBlockStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisBlockStore, RedisConfig};
