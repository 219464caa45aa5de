//! Redis block store - block records expire with the block itself.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use gatekeeper_core::RepoError;
use gatekeeper_core::domain::{BlockRecord, until};
use gatekeeper_core::ports::BlockStore;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Key prefix for block records
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            key_prefix: "ipblock".to_string(),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            key_prefix: std::env::var("REDIS_BLOCK_KEY_PREFIX")
                .unwrap_or_else(|_| "ipblock".to_string()),
        }
    }
}

/// Redis-backed block store.
///
/// Each blocked address is one JSON value whose TTL matches the time left
/// on the block; clearing a block deletes the key.
pub struct RedisBlockStore {
    conn: ConnectionManager,
    config: RedisConfig,
}

impl RedisBlockStore {
    pub async fn new(config: RedisConfig) -> Result<Self, RepoError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| RepoError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RepoError::Connection("Connection timed out".to_string()))?
            .map_err(|e| RepoError::Connection(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis block store");

        Ok(Self { conn, config })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, RepoError> {
        Self::new(RedisConfig::from_env()).await
    }

    fn make_key(&self, ip: IpAddr) -> String {
        format!("{}:{}", self.config.key_prefix, ip)
    }
}

#[async_trait]
impl BlockStore for RedisBlockStore {
    async fn find(&self, ip: IpAddr) -> Result<Option<BlockRecord>, RepoError> {
        let mut conn = self.conn.clone();
        let raw = conn
            .get::<_, Option<String>>(self.make_key(ip))
            .await
            .map_err(|e| RepoError::Query(e.to_string()))?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| RepoError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn upsert(&self, record: BlockRecord) -> Result<(), RepoError> {
        let mut conn = self.conn.clone();
        let key = self.make_key(record.ip_address);

        match ttl_secs(&record) {
            Some(secs) if secs > 0 => {
                let json = serde_json::to_string(&record)
                    .map_err(|e| RepoError::Serialization(e.to_string()))?;
                conn.set_ex::<_, _, ()>(&key, json, secs)
                    .await
                    .map_err(|e| RepoError::Query(e.to_string()))?;
            }
            _ => {
                conn.del::<_, ()>(&key)
                    .await
                    .map_err(|e| RepoError::Query(e.to_string()))?;
            }
        }

        Ok(())
    }
}

/// Seconds the key should live, measured from the record's own timestamp
/// so expiry follows the clock that made the decision.
fn ttl_secs(record: &BlockRecord) -> Option<u64> {
    record
        .blocked_until
        .filter(|_| record.blocked)
        .map(|deadline| until(record.updated_at, deadline).as_secs())
}
