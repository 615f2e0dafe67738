//! # Vehicle Repository

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::Vehicle;
use crate::models::vehicle::{self, VehicleStatus};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewVehicle {
    pub fleet_number: String,
    pub registration: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub vehicle_type: Option<String>,
    pub capacity: Option<String>,
    pub status: Option<VehicleStatus>,
    pub mot_expiry: Option<DateTime<Utc>>,
    pub insurance_expiry: Option<DateTime<Utc>>,
    pub last_service_date: Option<DateTime<Utc>>,
    pub next_service_due: Option<DateTime<Utc>>,
    pub mileage: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct VehiclePatch {
    pub fleet_number: Option<String>,
    pub registration: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub vehicle_type: Option<String>,
    pub capacity: Option<String>,
    pub status: Option<VehicleStatus>,
    pub mot_expiry: Option<DateTime<Utc>>,
    pub insurance_expiry: Option<DateTime<Utc>>,
    pub last_service_date: Option<DateTime<Utc>>,
    pub next_service_due: Option<DateTime<Utc>>,
    pub mileage: Option<i32>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

pub struct VehicleRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> VehicleRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        status: Option<VehicleStatus>,
        is_active: Option<bool>,
    ) -> Result<Vec<vehicle::Model>, RepositoryError> {
        let mut query = Vehicle::find();
        if let Some(status) = status {
            query = query.filter(vehicle::Column::Status.eq(status));
        }
        if let Some(active) = is_active {
            query = query.filter(vehicle::Column::IsActive.eq(active));
        }
        Ok(query
            .order_by_asc(vehicle::Column::FleetNumber)
            .all(self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<vehicle::Model, RepositoryError> {
        Vehicle::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Vehicle not found"))
    }

    pub async fn create(&self, request: NewVehicle) -> Result<vehicle::Model, RepositoryError> {
        let fleet_number = required(&request.fleet_number, "fleet_number")?;
        let registration = required(&request.registration, "registration")?.to_uppercase();
        self.ensure_unique(&fleet_number, &registration, None).await?;

        let now = Utc::now().fixed_offset();
        let model = vehicle::ActiveModel {
            id: Set(Uuid::new_v4()),
            fleet_number: Set(fleet_number),
            registration: Set(registration),
            make: Set(request.make),
            model: Set(request.model),
            year: Set(request.year),
            vehicle_type: Set(request.vehicle_type),
            capacity: Set(request.capacity),
            status: Set(request.status.unwrap_or_default()),
            mot_expiry: Set(request.mot_expiry.map(|t| t.fixed_offset())),
            insurance_expiry: Set(request.insurance_expiry.map(|t| t.fixed_offset())),
            last_service_date: Set(request.last_service_date.map(|t| t.fixed_offset())),
            next_service_due: Set(request.next_service_due.map(|t| t.fixed_offset())),
            mileage: Set(request.mileage),
            notes: Set(request.notes),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
        .map_err(|e| RepositoryError::unique_or_database(e, "fleet_number"))?;

        info!(vehicle_id = %model.id, fleet_number = %model.fleet_number, "vehicle created");
        Ok(model)
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: VehiclePatch,
    ) -> Result<vehicle::Model, RepositoryError> {
        let existing = self.get(id).await?;
        let fleet_number = match patch.fleet_number.as_deref() {
            Some(v) => required(v, "fleet_number")?,
            None => existing.fleet_number.clone(),
        };
        let registration = match patch.registration.as_deref() {
            Some(v) => required(v, "registration")?.to_uppercase(),
            None => existing.registration.clone(),
        };
        self.ensure_unique(&fleet_number, &registration, Some(id))
            .await?;

        let mut active = existing.into_active_model();
        active.fleet_number = Set(fleet_number);
        active.registration = Set(registration);
        if let Some(v) = patch.make {
            active.make = Set(Some(v));
        }
        if let Some(v) = patch.model {
            active.model = Set(Some(v));
        }
        if let Some(v) = patch.year {
            active.year = Set(Some(v));
        }
        if let Some(v) = patch.vehicle_type {
            active.vehicle_type = Set(Some(v));
        }
        if let Some(v) = patch.capacity {
            active.capacity = Set(Some(v));
        }
        if let Some(v) = patch.status {
            active.status = Set(v);
        }
        if let Some(v) = patch.mot_expiry {
            active.mot_expiry = Set(Some(v.fixed_offset()));
        }
        if let Some(v) = patch.insurance_expiry {
            active.insurance_expiry = Set(Some(v.fixed_offset()));
        }
        if let Some(v) = patch.last_service_date {
            active.last_service_date = Set(Some(v.fixed_offset()));
        }
        if let Some(v) = patch.next_service_due {
            active.next_service_due = Set(Some(v.fixed_offset()));
        }
        if let Some(v) = patch.mileage {
            active.mileage = Set(Some(v));
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
            .map_err(|e| RepositoryError::unique_or_database(e, "fleet_number"))
    }

    /// Soft delete: deactivated and taken out of service.
    pub async fn delete(&self, id: Uuid) -> Result<vehicle::Model, RepositoryError> {
        let mut active = self.get(id).await?.into_active_model();
        active.is_active = Set(false);
        active.status = Set(VehicleStatus::OutOfService);
        active.updated_at = Set(Utc::now().fixed_offset());
        let model = active.update(self.db).await?;
        info!(vehicle_id = %id, "vehicle deactivated");
        Ok(model)
    }

    async fn ensure_unique(
        &self,
        fleet_number: &str,
        registration: &str,
        except: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        for (field, column, value) in [
            ("fleet_number", vehicle::Column::FleetNumber, fleet_number),
            ("registration", vehicle::Column::Registration, registration),
        ] {
            let mut query = Vehicle::find().filter(column.eq(value));
            if let Some(id) = except {
                query = query.filter(vehicle::Column::Id.ne(id));
            }
            if query.count(self.db).await? > 0 {
                return Err(RepositoryError::duplicate(field));
            }
        }
        Ok(())
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
