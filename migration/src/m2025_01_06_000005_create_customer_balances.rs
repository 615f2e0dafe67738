//! Migration to create the customer_balances table.
//!
//! One row per (customer, equipment type), guarded by a unique index so that
//! concurrent first movements for a pair cannot create duplicates.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomerBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerBalances::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CustomerBalances::CustomerId).uuid().not_null())
                    .col(
                        ColumnDef::new(CustomerBalances::CustomerName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerBalances::EquipmentType)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerBalances::CurrentBalance)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CustomerBalances::Threshold)
                            .integer()
                            .not_null()
                            .default(20),
                    )
                    .col(
                        ColumnDef::new(CustomerBalances::LastMovement)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CustomerBalances::Status)
                            .text()
                            .not_null()
                            .default("normal"),
                    )
                    .col(
                        ColumnDef::new(CustomerBalances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CustomerBalances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_balances_customer_id")
                            .from(CustomerBalances::Table, CustomerBalances::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_balances_customer_type_unique")
                    .table(CustomerBalances::Table)
                    .col(CustomerBalances::CustomerId)
                    .col(CustomerBalances::EquipmentType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_balances_customer_name")
                    .table(CustomerBalances::Table)
                    .col(CustomerBalances::CustomerName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_balances_status")
                    .table(CustomerBalances::Table)
                    .col(CustomerBalances::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_customer_balances_customer_type_unique",
            "idx_customer_balances_customer_name",
            "idx_customer_balances_status",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(CustomerBalances::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CustomerBalances {
    Table,
    Id,
    CustomerId,
    CustomerName,
    EquipmentType,
    CurrentBalance,
    Threshold,
    LastMovement,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
}
