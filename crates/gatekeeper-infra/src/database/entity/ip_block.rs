//! Durable block record for SeaORM.

use std::net::IpAddr;

use sea_orm::Set;
use sea_orm::entity::prelude::*;

use gatekeeper_core::RepoError;
use gatekeeper_core::domain::BlockRecord;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ip_blocks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub ip_address: String,
    pub blocked: bool,
    pub blocked_until: Option<DateTimeWithTimeZone>,
    pub reason: Option<String>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for BlockRecord {
    type Error = RepoError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let ip_address: IpAddr = model.ip_address.parse().map_err(|_| {
            RepoError::Serialization(format!("invalid ip_address {:?}", model.ip_address))
        })?;

        Ok(Self {
            ip_address,
            blocked: model.blocked,
            blocked_until: model.blocked_until.map(Into::into),
            reason: model.reason,
            updated_at: model.updated_at.into(),
        })
    }
}

impl From<BlockRecord> for ActiveModel {
    fn from(record: BlockRecord) -> Self {
        Self {
            ip_address: Set(record.ip_address.to_string()),
            blocked: Set(record.blocked),
            blocked_until: Set(record.blocked_until.map(Into::into)),
            reason: Set(record.reason),
            updated_at: Set(record.updated_at.into()),
        }
    }
}
