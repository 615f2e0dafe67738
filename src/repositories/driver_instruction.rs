//! # Driver Instruction Repository
//!
//! Stored instructions plus collection tasks derived on the fly from
//! over-threshold balances.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::ledger::AlertPolicy;
use crate::models::alert::AlertPriority;
use crate::models::customer_balance::{self, BalanceStatus};
use crate::models::driver_instruction::{self, InstructionPriority, InstructionStatus};
use crate::models::equipment_specification::EquipmentType;
use crate::models::{CustomerBalance, DriverInstruction};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDriverInstruction {
    pub title: String,
    pub content: String,
    pub priority: Option<InstructionPriority>,
    pub status: Option<InstructionStatus>,
    pub assigned_driver: Option<String>,
    pub customer_name: Option<String>,
    pub delivery_location: Option<String>,
    pub contact_phone: Option<String>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub equipment_type: Option<EquipmentType>,
    pub equipment_quantity: Option<i32>,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DriverInstructionPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub priority: Option<InstructionPriority>,
    pub status: Option<InstructionStatus>,
    pub assigned_driver: Option<String>,
    pub customer_name: Option<String>,
    pub delivery_location: Option<String>,
    pub contact_phone: Option<String>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub equipment_type: Option<EquipmentType>,
    pub equipment_quantity: Option<i32>,
    pub special_instructions: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct InstructionFilter {
    pub driver_name: Option<String>,
    pub status: Option<InstructionStatus>,
    pub priority: Option<InstructionPriority>,
    pub is_active: Option<bool>,
}

/// Collection task derived from an over-threshold balance. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AutoInstruction {
    /// `auto_{customer}_{equipment_type}`
    pub id: String,
    pub title: String,
    pub content: String,
    pub priority: InstructionPriority,
    pub status: InstructionStatus,
    pub assigned_driver: Option<String>,
    pub customer_name: String,
    pub equipment_type: EquipmentType,
    pub equipment_quantity: i32,
    pub special_instructions: String,
    pub created_at: DateTime<Utc>,
}

impl AutoInstruction {
    pub fn from_balance(balance: &customer_balance::Model, policy: &AlertPolicy) -> Self {
        let excess = crate::ledger::excess(balance.current_balance, balance.threshold);
        let priority = match policy.priority(balance.current_balance, balance.threshold) {
            AlertPriority::High => InstructionPriority::High,
            AlertPriority::Medium => InstructionPriority::Medium,
        };
        let kind = balance.equipment_type;
        Self {
            id: format!("auto_{}_{}", balance.customer_name, kind),
            title: format!("Collect Equipment - {}", balance.customer_name),
            content: format!("Collect {excess} {kind}(s) from {}", balance.customer_name),
            priority,
            status: InstructionStatus::Pending,
            assigned_driver: None,
            customer_name: balance.customer_name.clone(),
            equipment_type: kind,
            equipment_quantity: excess,
            special_instructions: format!(
                "Customer has {} but threshold is {}",
                balance.current_balance, balance.threshold
            ),
            created_at: Utc::now(),
        }
    }
}

pub struct DriverInstructionRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> DriverInstructionRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        filter: &InstructionFilter,
    ) -> Result<Vec<driver_instruction::Model>, RepositoryError> {
        let mut query = DriverInstruction::find();
        if let Some(driver) = filter.driver_name.as_deref() {
            query = query.filter(driver_instruction::Column::AssignedDriver.eq(driver));
        }
        if let Some(status) = filter.status {
            query = query.filter(driver_instruction::Column::Status.eq(status));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(driver_instruction::Column::Priority.eq(priority));
        }
        if let Some(active) = filter.is_active {
            query = query.filter(driver_instruction::Column::IsActive.eq(active));
        }
        Ok(query
            .order_by_desc(driver_instruction::Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<driver_instruction::Model, RepositoryError> {
        DriverInstruction::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Driver instruction not found"))
    }

    pub async fn create(
        &self,
        request: NewDriverInstruction,
        created_by: &str,
    ) -> Result<driver_instruction::Model, RepositoryError> {
        let title = required(&request.title, "title")?;
        let content = required(&request.content, "content")?;
        validate_quantity(request.equipment_quantity)?;

        let now = Utc::now().fixed_offset();
        let model = driver_instruction::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title),
            content: Set(content),
            priority: Set(request.priority.unwrap_or_default()),
            status: Set(request.status.unwrap_or_default()),
            assigned_driver: Set(request.assigned_driver),
            customer_name: Set(request.customer_name),
            delivery_location: Set(request.delivery_location),
            contact_phone: Set(request.contact_phone),
            delivery_date: Set(request.delivery_date.map(|t| t.fixed_offset())),
            equipment_type: Set(request.equipment_type),
            equipment_quantity: Set(request.equipment_quantity),
            special_instructions: Set(request.special_instructions),
            created_by: Set(Some(created_by.to_string())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await?;

        info!(instruction_id = %model.id, created_by, "driver instruction created");
        Ok(model)
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: DriverInstructionPatch,
    ) -> Result<driver_instruction::Model, RepositoryError> {
        let existing = self.get(id).await?;
        validate_quantity(patch.equipment_quantity)?;

        let mut active = existing.into_active_model();
        if let Some(v) = patch.title {
            active.title = Set(required(&v, "title")?);
        }
        if let Some(v) = patch.content {
            active.content = Set(required(&v, "content")?);
        }
        if let Some(v) = patch.priority {
            active.priority = Set(v);
        }
        if let Some(v) = patch.status {
            active.status = Set(v);
        }
        if let Some(v) = patch.assigned_driver {
            active.assigned_driver = Set(Some(v));
        }
        if let Some(v) = patch.customer_name {
            active.customer_name = Set(Some(v));
        }
        if let Some(v) = patch.delivery_location {
            active.delivery_location = Set(Some(v));
        }
        if let Some(v) = patch.contact_phone {
            active.contact_phone = Set(Some(v));
        }
        if let Some(v) = patch.delivery_date {
            active.delivery_date = Set(Some(v.fixed_offset()));
        }
        if let Some(v) = patch.equipment_type {
            active.equipment_type = Set(Some(v));
        }
        if let Some(v) = patch.equipment_quantity {
            active.equipment_quantity = Set(Some(v));
        }
        if let Some(v) = patch.special_instructions {
            active.special_instructions = Set(Some(v));
        }
        if let Some(v) = patch.is_active {
            active.is_active = Set(v);
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(self.db).await?)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: InstructionStatus,
    ) -> Result<driver_instruction::Model, RepositoryError> {
        let mut active = self.get(id).await?.into_active_model();
        active.status = Set(status);
        active.updated_at = Set(Utc::now().fixed_offset());
        let model = active.update(self.db).await?;
        info!(instruction_id = %id, status = ?status, "driver instruction status changed");
        Ok(model)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.get(id).await?.delete(self.db).await?;
        info!(instruction_id = %id, "driver instruction deleted");
        Ok(())
    }

    /// Collection tasks for every over-threshold balance, highest balance first.
    ///
    /// Derived tasks are never assigned, so any `driver_name` filter yields
    /// an empty list.
    pub async fn auto_generated(
        &self,
        policy: &AlertPolicy,
        driver_name: Option<&str>,
        status: Option<InstructionStatus>,
    ) -> Result<Vec<AutoInstruction>, RepositoryError> {
        let balances = CustomerBalance::find()
            .filter(customer_balance::Column::Status.eq(BalanceStatus::OverThreshold))
            .order_by_desc(customer_balance::Column::CurrentBalance)
            .all(self.db)
            .await?;

        Ok(balances
            .iter()
            .map(|balance| AutoInstruction::from_balance(balance, policy))
            .filter(|task| driver_name.is_none_or(|d| task.assigned_driver.as_deref() == Some(d)))
            .filter(|task| status.is_none_or(|s| task.status == s))
            .collect())
    }
}

fn required(value: &str, field: &str) -> Result<String, RepositoryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_quantity(quantity: Option<i32>) -> Result<(), RepositoryError> {
    if quantity.is_some_and(|q| q < 0) {
        return Err(RepositoryError::validation(
            "equipment_quantity must be non-negative",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(current: i32, threshold: i32) -> customer_balance::Model {
        let now = Utc::now().fixed_offset();
        customer_balance::Model {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            customer_name: "Tesco Leeds".into(),
            equipment_type: EquipmentType::Pallet,
            current_balance: current,
            threshold,
            last_movement: Some(now),
            status: crate::ledger::classify(current, threshold),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn collection_task_from_balance() {
        let task = AutoInstruction::from_balance(&balance(32, 20), &AlertPolicy::default());
        assert_eq!(task.id, "auto_Tesco Leeds_pallet");
        assert_eq!(task.title, "Collect Equipment - Tesco Leeds");
        assert_eq!(task.content, "Collect 12 pallet(s) from Tesco Leeds");
        assert_eq!(task.equipment_quantity, 12);
        assert_eq!(task.priority, InstructionPriority::High);
        assert_eq!(task.status, InstructionStatus::Pending);
        assert_eq!(
            task.special_instructions,
            "Customer has 32 but threshold is 20"
        );
    }

    #[test]
    fn moderate_overage_is_medium() {
        let task = AutoInstruction::from_balance(&balance(25, 20), &AlertPolicy::default());
        assert_eq!(task.priority, InstructionPriority::Medium);
        assert!(task.assigned_driver.is_none());
    }
}
