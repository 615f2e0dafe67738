//! Migration to create the equipment_specifications table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EquipmentSpecifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EquipmentSpecifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EquipmentSpecifications::EquipmentType)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EquipmentSpecifications::Name).text().not_null())
                    .col(ColumnDef::new(EquipmentSpecifications::Color).text().null())
                    .col(ColumnDef::new(EquipmentSpecifications::Size).text().null())
                    .col(ColumnDef::new(EquipmentSpecifications::Grade).text().null())
                    .col(
                        ColumnDef::new(EquipmentSpecifications::Description)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EquipmentSpecifications::DefaultThreshold)
                            .integer()
                            .not_null()
                            .default(20),
                    )
                    .col(
                        ColumnDef::new(EquipmentSpecifications::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(EquipmentSpecifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EquipmentSpecifications::UpdatedAt)
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
                    .name("idx_equipment_specifications_type_active")
                    .table(EquipmentSpecifications::Table)
                    .col(EquipmentSpecifications::EquipmentType)
                    .col(EquipmentSpecifications::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_equipment_specifications_type_active")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(EquipmentSpecifications::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum EquipmentSpecifications {
    Table,
    Id,
    EquipmentType,
    Name,
    Color,
    Size,
    Grade,
    Description,
    DefaultThreshold,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
