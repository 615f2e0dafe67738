//! Read access to the movement ledger. Writes go through the reconciler.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Expr, Func},
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::equipment_specification::EquipmentType;
use crate::models::{Movement, movement};

pub const DEFAULT_PAGE_LIMIT: u64 = 100;
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// Filters for listing movements
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    /// Case-insensitive substring of the recorded customer name
    pub customer_name: Option<String>,
    pub equipment_type: Option<EquipmentType>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl MovementFilter {
    pub fn effective_limit(&self) -> u64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

pub struct MovementRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MovementRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Newest first.
    pub async fn list(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<movement::Model>, RepositoryError> {
        let mut query = Movement::find();
        if let Some(name) = filter
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(movement::Column::CustomerName)))
                    .like(format!("%{}%", name.to_lowercase())),
            );
        }
        if let Some(kind) = filter.equipment_type {
            query = query.filter(movement::Column::EquipmentType.eq(kind));
        }

        Ok(query
            .order_by_desc(movement::Column::Timestamp)
            .order_by_desc(movement::Column::CreatedAt)
            .offset(filter.skip.unwrap_or(0))
            .limit(filter.effective_limit())
            .all(self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<movement::Model, RepositoryError> {
        Movement::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Movement not found"))
    }

    /// Marks a movement as checked by a human. The only mutation a recorded
    /// movement ever sees.
    pub async fn verify(&self, id: Uuid) -> Result<movement::Model, RepositoryError> {
        let existing = self.get(id).await?;
        if existing.verified {
            return Ok(existing);
        }
        let mut active = existing.into_active_model();
        active.verified = Set(true);
        Ok(active.update(self.db).await?)
    }

    pub async fn count_total(&self) -> Result<u64, RepositoryError> {
        Ok(Movement::find().count(self.db).await?)
    }

    pub async fn count_distinct_customers(&self) -> Result<u64, RepositoryError> {
        let count: Option<i64> = Movement::find()
            .select_only()
            .column_as(
                Expr::col(movement::Column::CustomerId).count_distinct(),
                "count",
            )
            .into_tuple()
            .one(self.db)
            .await?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }
}
