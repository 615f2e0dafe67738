//! Migration to create the driver_instructions table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DriverInstructions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DriverInstructions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DriverInstructions::Title).text().not_null())
                    .col(ColumnDef::new(DriverInstructions::Content).text().not_null())
                    .col(
                        ColumnDef::new(DriverInstructions::Priority)
                            .text()
                            .not_null()
                            .default("MEDIUM"),
                    )
                    .col(
                        ColumnDef::new(DriverInstructions::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(DriverInstructions::AssignedDriver).text().null())
                    .col(ColumnDef::new(DriverInstructions::CustomerName).text().null())
                    .col(
                        ColumnDef::new(DriverInstructions::DeliveryLocation)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(DriverInstructions::ContactPhone).text().null())
                    .col(
                        ColumnDef::new(DriverInstructions::DeliveryDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(DriverInstructions::EquipmentType).text().null())
                    .col(
                        ColumnDef::new(DriverInstructions::EquipmentQuantity)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DriverInstructions::SpecialInstructions)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(DriverInstructions::CreatedBy).text().null())
                    .col(
                        ColumnDef::new(DriverInstructions::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(DriverInstructions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DriverInstructions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_driver_instructions_driver_status")
                    .table(DriverInstructions::Table)
                    .col(DriverInstructions::AssignedDriver)
                    .col(DriverInstructions::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_driver_instructions_driver_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DriverInstructions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DriverInstructions {
    Table,
    Id,
    Title,
    Content,
    Priority,
    Status,
    AssignedDriver,
    CustomerName,
    DeliveryLocation,
    ContactPhone,
    DeliveryDate,
    EquipmentType,
    EquipmentQuantity,
    SpecialInstructions,
    CreatedBy,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
