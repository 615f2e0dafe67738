//! # Driver Repository

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::driver::{self, DriverStatus};
use crate::models::{Driver, Vehicle};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDriver {
    pub driver_name: String,
    pub employee_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub license_number: Option<String>,
    pub license_expiry: Option<DateTime<Utc>>,
    pub status: Option<DriverStatus>,
    pub assigned_vehicle_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DriverPatch {
    pub driver_name: Option<String>,
    pub employee_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub license_number: Option<String>,
    pub license_expiry: Option<DateTime<Utc>>,
    pub status: Option<DriverStatus>,
    pub assigned_vehicle_id: Option<Uuid>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

pub struct DriverRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> DriverRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        status: Option<DriverStatus>,
        is_active: Option<bool>,
    ) -> Result<Vec<driver::Model>, RepositoryError> {
        let mut query = Driver::find();
        if let Some(status) = status {
            query = query.filter(driver::Column::Status.eq(status));
        }
        if let Some(active) = is_active {
            query = query.filter(driver::Column::IsActive.eq(active));
        }
        Ok(query
            .order_by_asc(driver::Column::DriverName)
            .all(self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<driver::Model, RepositoryError> {
        Driver::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Driver not found"))
    }

    pub async fn create(&self, request: NewDriver) -> Result<driver::Model, RepositoryError> {
        let driver_name = request.driver_name.trim().to_string();
        if driver_name.is_empty() {
            return Err(RepositoryError::validation("driver_name must not be empty"));
        }
        if let Some(vehicle_id) = request.assigned_vehicle_id {
            self.ensure_vehicle_exists(vehicle_id).await?;
        }

        let now = Utc::now().fixed_offset();
        let model = driver::ActiveModel {
            id: Set(Uuid::new_v4()),
            driver_name: Set(driver_name),
            employee_id: Set(request.employee_id),
            email: Set(request.email),
            phone: Set(request.phone),
            license_number: Set(request.license_number),
            license_expiry: Set(request.license_expiry.map(|t| t.fixed_offset())),
            status: Set(request.status.unwrap_or_default()),
            assigned_vehicle_id: Set(request.assigned_vehicle_id),
            notes: Set(request.notes),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
        .map_err(|e| RepositoryError::unique_or_database(e, "employee_id"))?;

        info!(driver_id = %model.id, "driver created");
        Ok(model)
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: DriverPatch,
    ) -> Result<driver::Model, RepositoryError> {
        let existing = self.get(id).await?;
        if let Some(vehicle_id) = patch.assigned_vehicle_id {
            self.ensure_vehicle_exists(vehicle_id).await?;
        }

        let mut active = existing.into_active_model();
        if let Some(name) = patch.driver_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(RepositoryError::validation("driver_name must not be empty"));
            }
            active.driver_name = Set(name);
        }
        if let Some(v) = patch.employee_id {
            active.employee_id = Set(Some(v));
        }
        if let Some(v) = patch.email {
            active.email = Set(Some(v));
        }
        if let Some(v) = patch.phone {
            active.phone = Set(Some(v));
        }
        if let Some(v) = patch.license_number {
            active.license_number = Set(Some(v));
        }
        if let Some(v) = patch.license_expiry {
            active.license_expiry = Set(Some(v.fixed_offset()));
        }
        if let Some(v) = patch.status {
            active.status = Set(v);
        }
        if let Some(v) = patch.assigned_vehicle_id {
            active.assigned_vehicle_id = Set(Some(v));
        }
        if let Some(v) = patch.notes {
            active.notes = Set(Some(v));
        }
        if let Some(v) = patch.is_active {
            active.is_active = Set(v);
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        active
            .update(self.db)
            .await
            .map_err(|e| RepositoryError::unique_or_database(e, "employee_id"))
    }

    /// Soft delete: the driver is deactivated and marked inactive.
    pub async fn delete(&self, id: Uuid) -> Result<driver::Model, RepositoryError> {
        let mut active = self.get(id).await?.into_active_model();
        active.is_active = Set(false);
        active.status = Set(DriverStatus::Inactive);
        active.updated_at = Set(Utc::now().fixed_offset());
        let model = active.update(self.db).await?;
        info!(driver_id = %id, "driver deactivated");
        Ok(model)
    }

    async fn ensure_vehicle_exists(&self, vehicle_id: Uuid) -> Result<(), RepositoryError> {
        if Vehicle::find_by_id(vehicle_id).one(self.db).await?.is_none() {
            return Err(RepositoryError::validation(format!(
                "assigned_vehicle_id {vehicle_id} does not exist"
            )));
        }
        Ok(())
    }
}
