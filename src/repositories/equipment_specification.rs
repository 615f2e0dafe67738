//! # Equipment Specification Repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::equipment_specification::{self, EquipmentType};
use crate::models::{CustomerBalance, EquipmentSpecification, Movement, customer_balance, movement};

const DEFAULT_SPEC_THRESHOLD: i32 = 20;

/// Request body for creating an equipment specification
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewEquipmentSpecification {
    pub equipment_type: EquipmentType,
    pub name: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub grade: Option<String>,
    pub description: Option<String>,
    pub default_threshold: Option<i32>,
    pub is_active: Option<bool>,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EquipmentSpecificationPatch {
    pub equipment_type: Option<EquipmentType>,
    pub name: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub grade: Option<String>,
    pub description: Option<String>,
    pub default_threshold: Option<i32>,
    pub is_active: Option<bool>,
}

pub struct EquipmentSpecificationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EquipmentSpecificationRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        equipment_type: Option<EquipmentType>,
        is_active: Option<bool>,
    ) -> Result<Vec<equipment_specification::Model>, RepositoryError> {
        let mut query = EquipmentSpecification::find();
        if let Some(kind) = equipment_type {
            query = query.filter(equipment_specification::Column::EquipmentType.eq(kind));
        }
        if let Some(active) = is_active {
            query = query.filter(equipment_specification::Column::IsActive.eq(active));
        }
        Ok(query
            .order_by_asc(equipment_specification::Column::EquipmentType)
            .order_by_asc(equipment_specification::Column::Name)
            .all(self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<equipment_specification::Model, RepositoryError> {
        EquipmentSpecification::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Equipment specification not found"))
    }

    pub async fn create(
        &self,
        request: NewEquipmentSpecification,
    ) -> Result<equipment_specification::Model, RepositoryError> {
        let name = validate_name(&request.name)?;
        let default_threshold = request.default_threshold.unwrap_or(DEFAULT_SPEC_THRESHOLD);
        validate_threshold(default_threshold)?;

        let now = Utc::now().fixed_offset();
        let model = equipment_specification::ActiveModel {
            id: Set(Uuid::new_v4()),
            equipment_type: Set(request.equipment_type),
            name: Set(name),
            color: Set(request.color),
            size: Set(request.size),
            grade: Set(request.grade),
            description: Set(request.description),
            default_threshold: Set(default_threshold),
            is_active: Set(request.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await?;

        info!(spec_id = %model.id, name = %model.name, "equipment specification created");
        Ok(model)
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: EquipmentSpecificationPatch,
    ) -> Result<equipment_specification::Model, RepositoryError> {
        let existing = self.get(id).await?;
        let mut active = existing.into_active_model();

        if let Some(kind) = patch.equipment_type {
            active.equipment_type = Set(kind);
        }
        if let Some(name) = patch.name {
            active.name = Set(validate_name(&name)?);
        }
        if let Some(v) = patch.color {
            active.color = Set(Some(v));
        }
        if let Some(v) = patch.size {
            active.size = Set(Some(v));
        }
        if let Some(v) = patch.grade {
            active.grade = Set(Some(v));
        }
        if let Some(v) = patch.description {
            active.description = Set(Some(v));
        }
        if let Some(threshold) = patch.default_threshold {
            validate_threshold(threshold)?;
            active.default_threshold = Set(threshold);
        }
        if let Some(v) = patch.is_active {
            active.is_active = Set(v);
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(self.db).await?)
    }

    /// Soft delete. Refused with counts while recorded movements reference
    /// the specification, since those movements feed live balances.
    pub async fn delete(
        &self,
        id: Uuid,
    ) -> Result<equipment_specification::Model, RepositoryError> {
        let spec = self.get(id).await?;

        let movements = Movement::find()
            .filter(movement::Column::EquipmentSpecId.eq(id))
            .count(self.db)
            .await?;

        if movements > 0 {
            let pairs: Vec<(Uuid, EquipmentType)> = Movement::find()
                .select_only()
                .column(movement::Column::CustomerId)
                .column(movement::Column::EquipmentType)
                .filter(movement::Column::EquipmentSpecId.eq(id))
                .distinct()
                .into_tuple()
                .all(self.db)
                .await?;
            let pair_filter = pairs.into_iter().fold(Condition::any(), |cond, (customer_id, kind)| {
                cond.add(
                    Condition::all()
                        .add(customer_balance::Column::CustomerId.eq(customer_id))
                        .add(customer_balance::Column::EquipmentType.eq(kind)),
                )
            });
            let balances = CustomerBalance::find()
                .filter(pair_filter)
                .count(self.db)
                .await?;

            return Err(RepositoryError::conflict(
                format!(
                    "Cannot delete equipment specification. Referenced by {movements} movements feeding {balances} balances. Consider setting is_active to false instead."
                ),
                json!({ "movements": movements, "balances": balances }),
            ));
        }

        let mut active = spec.into_active_model();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now().fixed_offset());
        let updated = active.update(self.db).await?;
        info!(spec_id = %id, "equipment specification deactivated");
        Ok(updated)
    }
}

fn validate_name(name: &str) -> Result<String, RepositoryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::validation("name must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_threshold(threshold: i32) -> Result<(), RepositoryError> {
    if threshold < 0 {
        return Err(RepositoryError::validation(
            "default_threshold must be non-negative",
        ));
    }
    Ok(())
}
