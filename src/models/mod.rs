//! # Data Models
//!
//! Entity models for the equipment ledger plus a few shared response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod alert;
pub mod customer;
pub mod customer_balance;
pub mod driver;
pub mod driver_instruction;
pub mod equipment_specification;
pub mod movement;
pub mod user;
pub mod user_session;
pub mod vehicle;

pub use alert::Entity as Alert;
pub use customer::Entity as Customer;
pub use customer_balance::Entity as CustomerBalance;
pub use driver::Entity as Driver;
pub use driver_instruction::Entity as DriverInstruction;
pub use equipment_specification::Entity as EquipmentSpecification;
pub use equipment_specification::EquipmentType;
pub use movement::Direction;
pub use movement::Entity as Movement;
pub use user::Entity as User;
pub use user::Role;
pub use user_session::Entity as UserSession;
pub use vehicle::Entity as Vehicle;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "equipment-ledger".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Liveness and volume summary returned by `/health`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_movements: u64,
    /// Distinct customers that have at least one movement
    pub total_customers: u64,
}
