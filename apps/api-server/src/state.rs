//! Application state - shared across all handlers.

use std::sync::Arc;

use gatekeeper_core::ConfigError;
use gatekeeper_core::ports::{BlockStore, Clock, SystemClock};
#[cfg(not(feature = "http-client"))]
use gatekeeper_core::ports::UpstreamClient;
use gatekeeper_infra::{AdmissionController, CapacityManager, InMemoryBlockStore};

use crate::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionController>,
    pub capacity: Arc<CapacityManager>,
    pub clock: Arc<dyn Clock>,
    pub admin_token: Option<Arc<str>>,
    /// Name of the durable block store in use, for health output.
    pub block_store: &'static str,
}

impl AppState {
    /// Build the application state with the best available block store.
    pub async fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (store, block_store) = select_block_store(config).await;

        let admission = Arc::new(AdmissionController::new(
            config.gatekeeper.admission.clone(),
            store,
            clock.clone(),
        ));
        let capacity = Arc::new(build_capacity(config, clock.clone())?);

        tracing::info!(
            block_store,
            credentials = capacity.len(),
            "Application state initialized"
        );

        Ok(Self {
            admission,
            capacity,
            clock,
            admin_token: config.admin_token.as_deref().map(Arc::from),
            block_store,
        })
    }
}

type SelectedStore = (Arc<dyn BlockStore>, &'static str);

/// PostgreSQL first, then Redis, then the in-memory fallback.
async fn select_block_store(config: &AppConfig) -> SelectedStore {
    if let Some(selected) = postgres_store(config).await {
        return selected;
    }
    if let Some(selected) = redis_store(config).await {
        return selected;
    }

    if config.database.is_some() || config.redis_url.is_some() {
        tracing::warn!("Durable block store unavailable, blocks will not survive a restart");
    } else {
        tracing::warn!("No DATABASE_URL or REDIS_URL set, using in-memory block list");
    }
    (Arc::new(InMemoryBlockStore::new()), "memory")
}

#[cfg(feature = "postgres")]
async fn postgres_store(config: &AppConfig) -> Option<SelectedStore> {
    let db_config = config.database.as_ref()?;
    match db_config.connect().await {
        Ok(conn) => {
            let store: Arc<dyn BlockStore> = Arc::new(gatekeeper_infra::PostgresBlockStore::new(conn));
            Some((store, "postgres"))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database, trying next block store");
            None
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn postgres_store(_config: &AppConfig) -> Option<SelectedStore> {
    None
}

#[cfg(feature = "redis")]
async fn redis_store(config: &AppConfig) -> Option<SelectedStore> {
    let url = config.redis_url.as_ref()?;
    let redis_config = gatekeeper_infra::RedisConfig {
        url: url.clone(),
        ..gatekeeper_infra::RedisConfig::from_env()
    };
    match gatekeeper_infra::RedisBlockStore::new(redis_config).await {
        Ok(store) => {
            let store: Arc<dyn BlockStore> = Arc::new(store);
            Some((store, "redis"))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Redis, using in-memory block list");
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn redis_store(_config: &AppConfig) -> Option<SelectedStore> {
    None
}

#[cfg(feature = "http-client")]
fn build_capacity(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<CapacityManager, ConfigError> {
    let connect = gatekeeper_infra::HttpUpstreamClient::connector(&config.upstream)?;
    Ok(CapacityManager::new(&config.gatekeeper.capacity, clock, connect))
}

#[cfg(not(feature = "http-client"))]
fn build_capacity(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<CapacityManager, ConfigError> {
    Ok(CapacityManager::new(&config.gatekeeper.capacity, clock, |_| {
        let client: Arc<dyn UpstreamClient> = Arc::new(NoUpstreamClient);
        client
    }))
}

/// Stand-in when the server is built without an upstream client.
#[cfg(not(feature = "http-client"))]
struct NoUpstreamClient;

#[cfg(not(feature = "http-client"))]
#[async_trait::async_trait]
impl UpstreamClient for NoUpstreamClient {
    async fn send(
        &self,
        _request: &gatekeeper_core::domain::UpstreamRequest,
    ) -> Result<gatekeeper_core::domain::UpstreamResponse, gatekeeper_core::UpstreamFailure> {
        Err(gatekeeper_core::UpstreamFailure::Transport(
            "server built without the http-client feature".to_string(),
        ))
    }
}
