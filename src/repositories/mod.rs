//! # Repository Layer
//!
//! Repositories wrap SeaORM access for the directory entities. Ledger writes
//! (movements, balances, alerts) live in [`crate::ledger`].

pub mod customer;
pub mod driver;
pub mod driver_instruction;
pub mod equipment_specification;
pub mod movement;
pub mod user;
pub mod vehicle;

pub use customer::CustomerRepository;
pub use driver::DriverRepository;
pub use driver_instruction::DriverInstructionRepository;
pub use equipment_specification::EquipmentSpecificationRepository;
pub use movement::MovementRepository;
pub use user::UserRepository;
pub use vehicle::VehicleRepository;
