//! Migration to create the movements table (the equipment ledger).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movements::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Movements::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Movements::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Movements::CustomerName).text().not_null())
                    .col(ColumnDef::new(Movements::EquipmentType).text().not_null())
                    .col(ColumnDef::new(Movements::EquipmentSpecId).uuid().null())
                    .col(ColumnDef::new(Movements::EquipmentName).text().null())
                    .col(ColumnDef::new(Movements::EquipmentColor).text().null())
                    .col(ColumnDef::new(Movements::EquipmentSize).text().null())
                    .col(ColumnDef::new(Movements::EquipmentGrade).text().null())
                    .col(ColumnDef::new(Movements::Quantity).integer().not_null())
                    .col(ColumnDef::new(Movements::Direction).text().not_null())
                    .col(
                        ColumnDef::new(Movements::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Movements::DriverName).text().null())
                    .col(ColumnDef::new(Movements::ConfidenceScore).double().null())
                    .col(
                        ColumnDef::new(Movements::Verified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Movements::Notes).text().null())
                    .col(ColumnDef::new(Movements::SourceImageRef).text().null())
                    .col(
                        ColumnDef::new(Movements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movements_customer_id")
                            .from(Movements::Table, Movements::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movements_equipment_spec_id")
                            .from(Movements::Table, Movements::EquipmentSpecId)
                            .to(EquipmentSpecifications::Table, EquipmentSpecifications::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movements_customer_type")
                    .table(Movements::Table)
                    .col(Movements::CustomerId)
                    .col(Movements::EquipmentType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movements_customer_name")
                    .table(Movements::Table)
                    .col(Movements::CustomerName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movements_timestamp")
                    .table(Movements::Table)
                    .col(Movements::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movements_source_image_ref")
                    .table(Movements::Table)
                    .col(Movements::SourceImageRef)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_movements_customer_type",
            "idx_movements_customer_name",
            "idx_movements_timestamp",
            "idx_movements_source_image_ref",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(Movements::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Movements {
    Table,
    Id,
    CustomerId,
    CustomerName,
    EquipmentType,
    EquipmentSpecId,
    EquipmentName,
    EquipmentColor,
    EquipmentSize,
    EquipmentGrade,
    Quantity,
    Direction,
    Timestamp,
    DriverName,
    ConfidenceScore,
    Verified,
    Notes,
    SourceImageRef,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum EquipmentSpecifications {
    Table,
    Id,
}
