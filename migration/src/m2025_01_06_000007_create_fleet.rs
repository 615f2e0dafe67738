//! Migration to create the vehicles and drivers tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vehicles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vehicles::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Vehicles::FleetNumber)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Vehicles::Registration)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Vehicles::Make).text().null())
                    .col(ColumnDef::new(Vehicles::Model).text().null())
                    .col(ColumnDef::new(Vehicles::Year).integer().null())
                    .col(ColumnDef::new(Vehicles::VehicleType).text().null())
                    .col(ColumnDef::new(Vehicles::Capacity).text().null())
                    .col(
                        ColumnDef::new(Vehicles::Status)
                            .text()
                            .not_null()
                            .default("available"),
                    )
                    .col(
                        ColumnDef::new(Vehicles::MotExpiry)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Vehicles::InsuranceExpiry)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Vehicles::LastServiceDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Vehicles::NextServiceDue)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Vehicles::Mileage).integer().null())
                    .col(ColumnDef::new(Vehicles::Notes).text().null())
                    .col(
                        ColumnDef::new(Vehicles::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Vehicles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Vehicles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Drivers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Drivers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Drivers::DriverName).text().not_null())
                    .col(ColumnDef::new(Drivers::EmployeeId).text().null().unique_key())
                    .col(ColumnDef::new(Drivers::Email).text().null())
                    .col(ColumnDef::new(Drivers::Phone).text().null())
                    .col(ColumnDef::new(Drivers::LicenseNumber).text().null())
                    .col(
                        ColumnDef::new(Drivers::LicenseExpiry)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Drivers::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Drivers::AssignedVehicleId).uuid().null())
                    .col(ColumnDef::new(Drivers::Notes).text().null())
                    .col(
                        ColumnDef::new(Drivers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Drivers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Drivers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_drivers_assigned_vehicle_id")
                            .from(Drivers::Table, Drivers::AssignedVehicleId)
                            .to(Vehicles::Table, Vehicles::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_drivers_driver_name")
                    .table(Drivers::Table)
                    .col(Drivers::DriverName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_drivers_driver_name").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Drivers::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Vehicles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Vehicles {
    Table,
    Id,
    FleetNumber,
    Registration,
    Make,
    Model,
    Year,
    VehicleType,
    Capacity,
    Status,
    MotExpiry,
    InsuranceExpiry,
    LastServiceDate,
    NextServiceDue,
    Mileage,
    Notes,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Drivers {
    Table,
    Id,
    DriverName,
    EmployeeId,
    Email,
    Phone,
    LicenseNumber,
    LicenseExpiry,
    Status,
    AssignedVehicleId,
    Notes,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
