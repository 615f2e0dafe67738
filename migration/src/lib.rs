//! Database migrations for the equipment ledger.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_06_000001_create_users;
mod m2025_01_06_000002_create_customers;
mod m2025_01_06_000003_create_equipment_specifications;
mod m2025_01_06_000004_create_movements;
mod m2025_01_06_000005_create_customer_balances;
mod m2025_01_06_000006_create_alerts;
mod m2025_01_06_000007_create_fleet;
mod m2025_01_06_000008_create_driver_instructions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_06_000001_create_users::Migration),
            Box::new(m2025_01_06_000002_create_customers::Migration),
            Box::new(m2025_01_06_000003_create_equipment_specifications::Migration),
            Box::new(m2025_01_06_000004_create_movements::Migration),
            Box::new(m2025_01_06_000005_create_customer_balances::Migration),
            Box::new(m2025_01_06_000006_create_alerts::Migration),
            Box::new(m2025_01_06_000007_create_fleet::Migration),
            Box::new(m2025_01_06_000008_create_driver_instructions::Migration),
        ]
    }
}
