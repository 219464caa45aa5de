//! Durable block list port.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::domain::BlockRecord;
use crate::error::RepoError;

/// Authoritative storage for block decisions, surviving restarts.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Fetch the record for an address, if one was ever written.
    async fn find(&self, ip: IpAddr) -> Result<Option<BlockRecord>, RepoError>;

    /// Create the record, or overwrite `blocked`, `blocked_until` and `reason`.
    async fn upsert(&self, record: BlockRecord) -> Result<(), RepoError>;
}
