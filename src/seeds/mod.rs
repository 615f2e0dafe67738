//! Database seeding
//!
//! Startup seeding for the equipment specification catalogue and the
//! optional bootstrap administrator. Both seeders skip rows that already
//! exist, so they are safe to run on every boot.

pub mod admin;
pub mod equipment_specs;

pub use admin::seed_bootstrap_admin;
pub use equipment_specs::seed_equipment_specs;

use anyhow::Result;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

/// Runs every seeder enabled by `config`.
pub async fn run(db: &DatabaseConnection, config: &AppConfig) -> Result<()> {
    if config.seed_equipment_specs {
        seed_equipment_specs(db).await?;
    }
    seed_bootstrap_admin(db, config).await?;
    Ok(())
}
