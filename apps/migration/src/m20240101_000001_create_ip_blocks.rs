use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IpBlocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IpBlocks::IpAddress)
                            .string_len(45)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IpBlocks::Blocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(IpBlocks::BlockedUntil).timestamp_with_time_zone())
                    .col(ColumnDef::new(IpBlocks::Reason).text())
                    .col(
                        ColumnDef::new(IpBlocks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IpBlocks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum IpBlocks {
    Table,
    IpAddress,
    Blocked,
    BlockedUntil,
    Reason,
    UpdatedAt,
}
