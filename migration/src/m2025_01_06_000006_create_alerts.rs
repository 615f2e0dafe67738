//! Migration to create the alerts table.
//!
//! Historical alerts accumulate per pair; a partial unique index allows at
//! most one unresolved alert per (customer, equipment type).

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alerts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Alerts::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Alerts::CustomerName).text().not_null())
                    .col(ColumnDef::new(Alerts::EquipmentType).text().not_null())
                    .col(ColumnDef::new(Alerts::CurrentBalance).integer().not_null())
                    .col(ColumnDef::new(Alerts::Threshold).integer().not_null())
                    .col(ColumnDef::new(Alerts::Excess).integer().not_null())
                    .col(ColumnDef::new(Alerts::Priority).text().not_null())
                    .col(
                        ColumnDef::new(Alerts::Resolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Alerts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Alerts::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alerts_customer_id")
                            .from(Alerts::Table, Alerts::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Partial index: sea-query has no builder for the WHERE clause.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_open_pair ON alerts (customer_id, equipment_type) WHERE resolved = false".to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_resolved_created")
                    .table(Alerts::Table)
                    .col(Alerts::Resolved)
                    .col(Alerts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_alerts_open_pair").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_alerts_resolved_created").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    CustomerId,
    CustomerName,
    EquipmentType,
    CurrentBalance,
    Threshold,
    Excess,
    Priority,
    Resolved,
    CreatedAt,
    UpdatedAt,
    ResolvedAt,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
}
