//! PostgreSQL block store.

use std::net::IpAddr;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DbConn, EntityTrait};

use gatekeeper_core::RepoError;
use gatekeeper_core::domain::BlockRecord;
use gatekeeper_core::ports::BlockStore;

use super::entity::ip_block::{self, Entity as IpBlock};

/// Block store backed by the `ip_blocks` table.
pub struct PostgresBlockStore {
    db: DbConn,
}

impl PostgresBlockStore {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlockStore for PostgresBlockStore {
    async fn find(&self, ip: IpAddr) -> Result<Option<BlockRecord>, RepoError> {
        let model = IpBlock::find_by_id(ip.to_string())
            .one(&self.db)
            .await
            .map_err(|e| RepoError::Query(e.to_string()))?;

        model.map(BlockRecord::try_from).transpose()
    }

    async fn upsert(&self, record: BlockRecord) -> Result<(), RepoError> {
        let ip = record.ip_address;
        let model: ip_block::ActiveModel = record.into();

        IpBlock::insert(model)
            .on_conflict(
                OnConflict::column(ip_block::Column::IpAddress)
                    .update_columns([
                        ip_block::Column::Blocked,
                        ip_block::Column::BlockedUntil,
                        ip_block::Column::Reason,
                        ip_block::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| RepoError::Query(e.to_string()))?;

        tracing::debug!(ip = %ip, "Block record upserted");
        Ok(())
    }
}
