//! In-memory block store - used as fallback when no database is configured.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use tokio::sync::RwLock;

use gatekeeper_core::RepoError;
use gatekeeper_core::domain::BlockRecord;
use gatekeeper_core::ports::BlockStore;

/// Block records kept in a `HashMap` behind an async `RwLock`.
///
/// Note: Data is lost on process restart, so blocks do not survive one.
#[derive(Default)]
pub struct InMemoryBlockStore {
    records: RwLock<HashMap<IpAddr, BlockRecord>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn find(&self, ip: IpAddr) -> Result<Option<BlockRecord>, RepoError> {
        Ok(self.records.read().await.get(&ip).cloned())
    }

    async fn upsert(&self, record: BlockRecord) -> Result<(), RepoError> {
        self.records.write().await.insert(record.ip_address, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = InMemoryBlockStore::new();
        let ip: IpAddr = "192.0.2.10".parse().unwrap();
        let now = Utc::now();

        let mut record = BlockRecord::cleared(ip, now);
        record.blocked = true;
        record.blocked_until = Some(now + chrono::Duration::minutes(5));
        store.upsert(record).await.unwrap();
        assert!(store.find(ip).await.unwrap().unwrap().is_blocked(now));

        store.upsert(BlockRecord::cleared(ip, now)).await.unwrap();
        assert!(!store.find(ip).await.unwrap().unwrap().is_blocked(now));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_missing() {
        let store = InMemoryBlockStore::new();
        assert!(store.find("192.0.2.99".parse().unwrap()).await.unwrap().is_none());
    }
}
