//! Alert manager: opens, refreshes and resolves threshold-breach alerts.
//!
//! At most one unresolved alert exists per (customer, equipment type); the
//! `idx_alerts_open_pair` partial unique index backs this. Alerts are only
//! resolved explicitly (or by the balance rebuild tool).

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::info;
use uuid::Uuid;

use super::{AlertPolicy, excess};
use crate::error::RepositoryError;
use crate::models::alert;
use crate::models::customer_balance;
use crate::models::{Alert, EquipmentType};
use crate::telemetry;

/// What `upsert_alert` did.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertUpsert {
    Created(alert::Model),
    Updated(alert::Model),
    /// Open alert already reflected the balance; nothing written
    Unchanged(alert::Model),
}

impl AlertUpsert {
    pub fn into_model(self) -> alert::Model {
        match self {
            AlertUpsert::Created(model)
            | AlertUpsert::Updated(model)
            | AlertUpsert::Unchanged(model) => model,
        }
    }

    pub fn model(&self) -> &alert::Model {
        match self {
            AlertUpsert::Created(model)
            | AlertUpsert::Updated(model)
            | AlertUpsert::Unchanged(model) => model,
        }
    }
}

/// Opens an alert for a breaching balance, or refreshes the open one in place.
///
/// Refreshing touches `current_balance`, `excess` and `priority` only; the
/// threshold and `created_at` recorded when the alert opened are kept.
pub async fn upsert_alert<C: ConnectionTrait>(
    conn: &C,
    policy: AlertPolicy,
    balance: &customer_balance::Model,
) -> Result<AlertUpsert, RepositoryError> {
    if !balance.status.is_breach() {
        return Err(RepositoryError::validation(
            "alerts are only raised for over-threshold or negative balances",
        ));
    }

    let excess = excess(balance.current_balance, balance.threshold);
    let priority = policy.priority(balance.current_balance, balance.threshold);
    let now = Utc::now().fixed_offset();

    let open = Alert::find()
        .filter(alert::Column::CustomerId.eq(balance.customer_id))
        .filter(alert::Column::EquipmentType.eq(balance.equipment_type))
        .filter(alert::Column::Resolved.eq(false))
        .lock_exclusive()
        .one(conn)
        .await?;

    if let Some(open) = open {
        if open.current_balance == balance.current_balance
            && open.excess == excess
            && open.priority == priority
        {
            return Ok(AlertUpsert::Unchanged(open));
        }

        let mut active: alert::ActiveModel = open.into();
        active.current_balance = Set(balance.current_balance);
        active.excess = Set(excess);
        active.priority = Set(priority);
        active.customer_name = Set(balance.customer_name.clone());
        active.updated_at = Set(now);
        return Ok(AlertUpsert::Updated(active.update(conn).await?));
    }

    let created = alert::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(balance.customer_id),
        customer_name: Set(balance.customer_name.clone()),
        equipment_type: Set(balance.equipment_type),
        current_balance: Set(balance.current_balance),
        threshold: Set(balance.threshold),
        excess: Set(excess),
        priority: Set(priority),
        resolved: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        resolved_at: Set(None),
    }
    .insert(conn)
    .await?;

    telemetry::record_alert_opened(match created.priority {
        alert::AlertPriority::High => "high",
        alert::AlertPriority::Medium => "medium",
    });
    info!(
        alert_id = %created.id,
        customer = %created.customer_name,
        equipment_type = %created.equipment_type,
        excess = created.excess,
        priority = ?created.priority,
        "alert opened"
    );

    Ok(AlertUpsert::Created(created))
}

pub(crate) async fn find_open_alert<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    equipment_type: EquipmentType,
) -> Result<Option<alert::Model>, sea_orm::DbErr> {
    Alert::find()
        .filter(alert::Column::CustomerId.eq(customer_id))
        .filter(alert::Column::EquipmentType.eq(equipment_type))
        .filter(alert::Column::Resolved.eq(false))
        .one(conn)
        .await
}

pub(crate) async fn mark_resolved<C: ConnectionTrait>(
    conn: &C,
    alert: alert::Model,
) -> Result<alert::Model, sea_orm::DbErr> {
    let now = Utc::now().fixed_offset();
    let mut active: alert::ActiveModel = alert.into();
    active.resolved = Set(true);
    active.resolved_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(conn).await
}

/// Read and resolve operations over alerts.
pub struct AlertManager<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> AlertManager<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Alerts filtered by resolution state, newest first. `None` means open only.
    pub async fn list(&self, resolved: Option<bool>) -> Result<Vec<alert::Model>, RepositoryError> {
        Ok(Alert::find()
            .filter(alert::Column::Resolved.eq(resolved.unwrap_or(false)))
            .order_by_desc(alert::Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    /// Resolves an alert. Already-resolved alerts are returned untouched.
    pub async fn resolve(&self, alert_id: Uuid) -> Result<alert::Model, RepositoryError> {
        let alert = Alert::find_by_id(alert_id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Alert not found"))?;

        if alert.resolved {
            return Ok(alert);
        }

        let resolved = mark_resolved(self.db, alert).await?;
        info!(alert_id = %resolved.id, customer = %resolved.customer_name, "alert resolved");
        Ok(resolved)
    }
}
