//! Balance reconciler: records movements and keeps each (customer, equipment
//! type) balance equal to the signed sum of its movements.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, Func, OnConflict},
};
use tracing::{debug, info};
use uuid::Uuid;

use super::{AlertPolicy, alerts, classify};
use crate::error::RepositoryError;
use crate::models::customer::{self, CustomerStatus};
use crate::models::customer_balance::{self, BalanceStatus};
use crate::models::movement::{self, Direction};
use crate::models::{
    Customer, CustomerBalance, EquipmentSpecification, EquipmentType, Movement, alert,
    equipment_specification,
};
use crate::telemetry;

/// A movement ready to be recorded. Built by the HTTP layer from manual
/// entries or from photo extraction.
#[derive(Debug, Clone)]
pub struct NewMovement {
    /// Client-chosen id; a repeat of a known id replays the stored movement
    pub id: Option<Uuid>,
    pub customer_name: String,
    pub equipment_type: EquipmentType,
    pub equipment_spec_id: Option<Uuid>,
    pub quantity: i32,
    pub direction: Direction,
    pub timestamp: Option<DateTimeWithTimeZone>,
    pub driver_name: Option<String>,
    pub confidence_score: Option<f64>,
    pub verified: bool,
    pub notes: Option<String>,
    pub source_image_ref: Option<String>,
}

impl NewMovement {
    pub fn new(
        customer_name: impl Into<String>,
        equipment_type: EquipmentType,
        quantity: i32,
        direction: Direction,
    ) -> Self {
        Self {
            id: None,
            customer_name: customer_name.into(),
            equipment_type,
            equipment_spec_id: None,
            quantity,
            direction,
            timestamp: None,
            driver_name: None,
            confidence_score: None,
            verified: false,
            notes: None,
            source_image_ref: None,
        }
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.quantity <= 0 {
            return Err(RepositoryError::validation("quantity must be greater than 0"));
        }
        if self.customer_name.trim().is_empty() {
            return Err(RepositoryError::validation("customer_name must not be empty"));
        }
        if let Some(confidence) = self.confidence_score
            && !(0.0..=1.0).contains(&confidence)
        {
            return Err(RepositoryError::validation(
                "confidence_score must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}

/// Outcome of recording a movement.
#[derive(Debug, Clone)]
pub struct RecordedMovement {
    pub movement: movement::Model,
    pub balance: customer_balance::Model,
    /// Open alert for the pair after the write, if any
    pub alert: Option<alert::Model>,
    /// True when the movement id was already known and nothing was applied
    pub replayed: bool,
}

/// Service over the movement ledger and the balances derived from it.
pub struct BalanceReconciler<'a> {
    db: &'a DatabaseConnection,
    policy: AlertPolicy,
}

impl<'a> BalanceReconciler<'a> {
    pub fn new(db: &'a DatabaseConnection, policy: AlertPolicy) -> Self {
        Self { db, policy }
    }

    /// Records one movement and applies it, all in one transaction.
    pub async fn record(&self, new: NewMovement) -> Result<RecordedMovement, RepositoryError> {
        let mut recorded = self.record_batch(vec![new]).await?;
        recorded
            .pop()
            .ok_or_else(|| DbErr::Custom("movement batch returned no result".into()).into())
    }

    /// Records several movements atomically; either all apply or none do.
    pub async fn record_batch(
        &self,
        batch: Vec<NewMovement>,
    ) -> Result<Vec<RecordedMovement>, RepositoryError> {
        for new in &batch {
            new.validate()?;
        }

        let txn = self.db.begin().await?;
        let mut results = Vec::with_capacity(batch.len());
        for new in batch {
            results.push(record_in(&txn, self.policy, new).await?);
        }
        txn.commit().await?;

        log_applied(&results);
        Ok(results)
    }

    /// Balances whose customer name contains `customer_name` (case-insensitive),
    /// optionally restricted to one equipment type.
    pub async fn get_balance(
        &self,
        customer_name: &str,
        equipment_type: Option<EquipmentType>,
    ) -> Result<Vec<customer_balance::Model>, RepositoryError> {
        let pattern = format!("%{}%", customer_name.trim().to_lowercase());
        let mut query = CustomerBalance::find().filter(
            Expr::expr(Func::lower(Expr::col(customer_balance::Column::CustomerName)))
                .like(pattern),
        );
        if let Some(kind) = equipment_type {
            query = query.filter(customer_balance::Column::EquipmentType.eq(kind));
        }
        Ok(query
            .order_by_asc(customer_balance::Column::CustomerName)
            .order_by_asc(customer_balance::Column::EquipmentType)
            .all(self.db)
            .await?)
    }

    pub async fn list_balances(
        &self,
        status: Option<BalanceStatus>,
    ) -> Result<Vec<customer_balance::Model>, RepositoryError> {
        let mut query = CustomerBalance::find();
        if let Some(status) = status {
            query = query.filter(customer_balance::Column::Status.eq(status));
        }
        Ok(query
            .order_by_asc(customer_balance::Column::CustomerName)
            .order_by_asc(customer_balance::Column::EquipmentType)
            .all(self.db)
            .await?)
    }

    /// Sets a pair's threshold and recomputes its status. Alerts are left alone.
    pub async fn set_threshold(
        &self,
        customer_name: &str,
        equipment_type: EquipmentType,
        threshold: i32,
    ) -> Result<customer_balance::Model, RepositoryError> {
        if threshold < 0 {
            return Err(RepositoryError::validation("threshold must be non-negative"));
        }

        let txn = self.db.begin().await?;
        let balance = CustomerBalance::find()
            .filter(customer_balance::Column::CustomerName.eq(customer_name))
            .filter(customer_balance::Column::EquipmentType.eq(equipment_type))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Customer balance not found"))?;

        let status = classify(balance.current_balance, threshold);
        let mut active: customer_balance::ActiveModel = balance.into();
        active.threshold = Set(threshold);
        active.status = Set(status);
        active.updated_at = Set(Utc::now().fixed_offset());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            customer = %updated.customer_name,
            equipment_type = %updated.equipment_type,
            threshold,
            status = ?updated.status,
            "threshold updated"
        );
        Ok(updated)
    }
}

/// Emits the per-movement log line and counter for freshly applied movements.
pub(crate) fn log_applied(results: &[RecordedMovement]) {
    for recorded in results.iter().filter(|r| !r.replayed) {
        let source = if recorded.movement.source_image_ref.is_some() {
            "photo"
        } else {
            "manual"
        };
        let direction = match recorded.movement.direction {
            Direction::In => "in",
            Direction::Out => "out",
        };
        telemetry::record_movement_applied(direction, source);
        info!(
            movement_id = %recorded.movement.id,
            customer = %recorded.movement.customer_name,
            equipment_type = %recorded.movement.equipment_type,
            quantity = recorded.movement.quantity,
            balance = recorded.balance.current_balance,
            "movement applied"
        );
    }
}

/// Records one movement on an open connection or transaction.
pub(crate) async fn record_in<C: ConnectionTrait>(
    conn: &C,
    policy: AlertPolicy,
    new: NewMovement,
) -> Result<RecordedMovement, RepositoryError> {
    if let Some(id) = new.id
        && let Some(existing) = Movement::find_by_id(id).one(conn).await?
    {
        debug!(movement_id = %id, "movement already recorded, replaying");
        return replay(conn, existing).await;
    }

    let customer_name = new.customer_name.trim().to_string();
    let customer = find_or_create_customer(conn, &customer_name).await?;

    let spec = match new.equipment_spec_id {
        Some(spec_id) => {
            let spec = EquipmentSpecification::find_by_id(spec_id)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    RepositoryError::validation(format!(
                        "unknown equipment specification {spec_id}"
                    ))
                })?;
            if spec.equipment_type != new.equipment_type {
                return Err(RepositoryError::validation(format!(
                    "equipment specification {} is a {}, not a {}",
                    spec.id, spec.equipment_type, new.equipment_type
                )));
            }
            Some(spec)
        }
        None => None,
    };

    let now = Utc::now().fixed_offset();
    let movement = movement::ActiveModel {
        id: Set(new.id.unwrap_or_else(Uuid::new_v4)),
        customer_id: Set(customer.id),
        customer_name: Set(customer_name),
        equipment_type: Set(new.equipment_type),
        equipment_spec_id: Set(spec.as_ref().map(|s| s.id)),
        equipment_name: Set(spec.as_ref().map(|s| s.name.clone())),
        equipment_color: Set(spec.as_ref().and_then(|s| s.color.clone())),
        equipment_size: Set(spec.as_ref().and_then(|s| s.size.clone())),
        equipment_grade: Set(spec.as_ref().and_then(|s| s.grade.clone())),
        quantity: Set(new.quantity),
        direction: Set(new.direction),
        timestamp: Set(new.timestamp.unwrap_or(now)),
        driver_name: Set(new.driver_name),
        confidence_score: Set(new.confidence_score),
        verified: Set(new.verified),
        notes: Set(new.notes),
        source_image_ref: Set(new.source_image_ref),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    let (balance, alert) = apply(conn, policy, &movement).await?;

    Ok(RecordedMovement {
        movement,
        balance,
        alert,
        replayed: false,
    })
}

async fn replay<C: ConnectionTrait>(
    conn: &C,
    existing: movement::Model,
) -> Result<RecordedMovement, RepositoryError> {
    let balance = find_balance(conn, existing.customer_id, existing.equipment_type)
        .await?
        .ok_or_else(|| DbErr::Custom(format!("no balance for movement {}", existing.id)))?;
    let alert =
        alerts::find_open_alert(conn, existing.customer_id, existing.equipment_type).await?;
    Ok(RecordedMovement {
        movement: existing,
        balance,
        alert,
        replayed: true,
    })
}

/// Applies a stored movement to its pair's balance and re-evaluates the alert.
///
/// Creates the balance row on first use. The row is re-read under an
/// exclusive lock so concurrent movements for the same pair serialize.
pub async fn apply<C: ConnectionTrait>(
    conn: &C,
    policy: AlertPolicy,
    movement: &movement::Model,
) -> Result<(customer_balance::Model, Option<alert::Model>), RepositoryError> {
    let balance = match lock_balance(conn, movement.customer_id, movement.equipment_type).await? {
        Some(balance) => balance,
        None => {
            let threshold = initial_threshold(
                conn,
                policy,
                movement.equipment_type,
                movement.equipment_spec_id,
            )
            .await?;
            insert_balance_if_absent(
                conn,
                movement.customer_id,
                &movement.customer_name,
                movement.equipment_type,
                threshold,
                None,
            )
            .await?;
            lock_balance(conn, movement.customer_id, movement.equipment_type)
                .await?
                .ok_or_else(|| DbErr::Custom("balance row missing after insert".into()))?
        }
    };

    let delta = movement.direction.signed(movement.quantity);
    let current_balance = balance
        .current_balance
        .checked_add(delta)
        .ok_or_else(|| RepositoryError::validation("balance would overflow"))?;
    let status = classify(current_balance, balance.threshold);

    let mut active: customer_balance::ActiveModel = balance.into();
    active.current_balance = Set(current_balance);
    active.status = Set(status);
    active.last_movement = Set(Some(movement.timestamp));
    active.updated_at = Set(Utc::now().fixed_offset());
    let updated = active.update(conn).await?;

    let alert = if status.is_breach() {
        Some(alerts::upsert_alert(conn, policy, &updated).await?.into_model())
    } else {
        None
    };

    Ok((updated, alert))
}

/// Looks a customer up by exact name, creating an active one if absent.
pub(crate) async fn find_or_create_customer<C: ConnectionTrait>(
    conn: &C,
    customer_name: &str,
) -> Result<customer::Model, RepositoryError> {
    if let Some(existing) = find_customer_by_name(conn, customer_name).await? {
        return Ok(existing);
    }

    let now = Utc::now().fixed_offset();
    let seed = customer::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_name: Set(customer_name.to_string()),
        contact_person: Set(None),
        email: Set(None),
        phone: Set(None),
        address: Set(None),
        city: Set(None),
        postcode: Set(None),
        country: Set(Some(customer::DEFAULT_COUNTRY.to_string())),
        status: Set(CustomerStatus::Active),
        credit_limit: Set(None),
        payment_terms: Set(Some(customer::DEFAULT_PAYMENT_TERMS.to_string())),
        notes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Customer::insert(seed)
        .on_conflict(
            OnConflict::column(customer::Column::CustomerName)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    find_customer_by_name(conn, customer_name)
        .await?
        .ok_or_else(|| DbErr::Custom(format!("customer {customer_name} missing after insert")).into())
}

async fn find_customer_by_name<C: ConnectionTrait>(
    conn: &C,
    customer_name: &str,
) -> Result<Option<customer::Model>, DbErr> {
    Customer::find()
        .filter(customer::Column::CustomerName.eq(customer_name))
        .one(conn)
        .await
}

/// Threshold for a brand-new balance: the named specification's default,
/// else the lowest default among active specifications of the type, else the
/// configured fallback.
pub(crate) async fn initial_threshold<C: ConnectionTrait>(
    conn: &C,
    policy: AlertPolicy,
    equipment_type: EquipmentType,
    spec_id: Option<Uuid>,
) -> Result<i32, DbErr> {
    if let Some(spec_id) = spec_id
        && let Some(spec) = EquipmentSpecification::find_by_id(spec_id).one(conn).await?
    {
        return Ok(spec.default_threshold);
    }

    let lowest = EquipmentSpecification::find()
        .filter(equipment_specification::Column::EquipmentType.eq(equipment_type))
        .filter(equipment_specification::Column::IsActive.eq(true))
        .order_by_asc(equipment_specification::Column::DefaultThreshold)
        .one(conn)
        .await?;

    Ok(lowest
        .map(|spec| spec.default_threshold)
        .unwrap_or(policy.default_threshold))
}

pub(crate) async fn insert_balance_if_absent<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    customer_name: &str,
    equipment_type: EquipmentType,
    threshold: i32,
    last_movement: Option<DateTimeWithTimeZone>,
) -> Result<(), DbErr> {
    let now = Utc::now().fixed_offset();
    let seed = customer_balance::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        customer_name: Set(customer_name.to_string()),
        equipment_type: Set(equipment_type),
        current_balance: Set(0),
        threshold: Set(threshold),
        last_movement: Set(last_movement),
        status: Set(BalanceStatus::Normal),
        created_at: Set(now),
        updated_at: Set(now),
    };
    CustomerBalance::insert(seed)
        .on_conflict(
            OnConflict::columns([
                customer_balance::Column::CustomerId,
                customer_balance::Column::EquipmentType,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

pub(crate) async fn find_balance<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    equipment_type: EquipmentType,
) -> Result<Option<customer_balance::Model>, DbErr> {
    CustomerBalance::find()
        .filter(customer_balance::Column::CustomerId.eq(customer_id))
        .filter(customer_balance::Column::EquipmentType.eq(equipment_type))
        .one(conn)
        .await
}

/// `SELECT ... FOR UPDATE` on Postgres; SQLite ignores the lock clause and
/// relies on its single-writer transaction.
async fn lock_balance<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    equipment_type: EquipmentType,
) -> Result<Option<customer_balance::Model>, DbErr> {
    CustomerBalance::find()
        .filter(customer_balance::Column::CustomerId.eq(customer_id))
        .filter(customer_balance::Column::EquipmentType.eq(equipment_type))
        .lock_exclusive()
        .one(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_non_positive_quantity() {
        let movement = NewMovement::new("Acme", EquipmentType::Pallet, 0, Direction::In);
        assert!(matches!(
            movement.validate(),
            Err(RepositoryError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_blank_customer() {
        let movement = NewMovement::new("   ", EquipmentType::Cage, 3, Direction::Out);
        assert!(movement.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_confidence() {
        let mut movement = NewMovement::new("Acme", EquipmentType::Dolly, 3, Direction::In);
        movement.confidence_score = Some(1.2);
        assert!(movement.validate().is_err());
        movement.confidence_score = Some(0.0);
        assert!(movement.validate().is_ok());
    }
}
