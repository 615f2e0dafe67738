//! Batch correction: recompute every balance from the movement ledger.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    TransactionTrait, prelude::DateTimeWithTimeZone,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::alerts::{self, AlertUpsert};
use super::reconciler::{find_balance, initial_threshold, insert_balance_if_absent};
use super::{AlertPolicy, classify};
use crate::error::RepositoryError;
use crate::models::customer_balance;
use crate::models::{Customer, CustomerBalance, EquipmentType, Movement};

/// Counts of what a rebuild changed (or would change, on a dry run).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub dry_run: bool,
    pub balances_checked: usize,
    pub balances_corrected: usize,
    pub balances_created: usize,
    pub alerts_opened: usize,
    pub alerts_refreshed: usize,
    pub alerts_resolved: usize,
}

#[derive(Default)]
struct LedgerTotal {
    net: i64,
    last_movement: Option<DateTimeWithTimeZone>,
}

/// Recomputes balances from movements, refreshes open alerts with the
/// current priority rule and resolves alerts whose balance is back to normal.
///
/// Runs in one transaction; `dry_run` rolls it back after computing the report.
pub async fn rebuild_balances(
    db: &DatabaseConnection,
    policy: AlertPolicy,
    dry_run: bool,
) -> Result<RebuildReport, RepositoryError> {
    let txn = db.begin().await?;
    let mut report = RebuildReport {
        dry_run,
        ..RebuildReport::default()
    };

    let mut totals: HashMap<(Uuid, EquipmentType), LedgerTotal> = HashMap::new();
    for movement in Movement::find().all(&txn).await? {
        let entry = totals
            .entry((movement.customer_id, movement.equipment_type))
            .or_default();
        entry.net += i64::from(movement.direction.signed(movement.quantity));
        if entry
            .last_movement
            .is_none_or(|last| last < movement.timestamp)
        {
            entry.last_movement = Some(movement.timestamp);
        }
    }

    for balance in CustomerBalance::find().all(&txn).await? {
        report.balances_checked += 1;
        let expected = totals
            .remove(&(balance.customer_id, balance.equipment_type))
            .map(|total| total.net)
            .unwrap_or(0);
        let expected = to_balance(expected, &balance)?;
        let status = classify(expected, balance.threshold);

        let balance = if expected != balance.current_balance || status != balance.status {
            warn!(
                customer = %balance.customer_name,
                equipment_type = %balance.equipment_type,
                stored = balance.current_balance,
                expected,
                "balance drifted from ledger"
            );
            report.balances_corrected += 1;
            let mut active: customer_balance::ActiveModel = balance.into();
            active.current_balance = Set(expected);
            active.status = Set(status);
            active.updated_at = Set(Utc::now().fixed_offset());
            active.update(&txn).await?
        } else {
            balance
        };

        reconcile_alert(&txn, policy, &balance, &mut report).await?;
    }

    // Pairs with movements but no balance row.
    for ((customer_id, equipment_type), total) in totals {
        let customer = Customer::find_by_id(customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("customer {customer_id}")))?;
        let threshold = initial_threshold(&txn, policy, equipment_type, None).await?;
        insert_balance_if_absent(
            &txn,
            customer_id,
            &customer.customer_name,
            equipment_type,
            threshold,
            total.last_movement,
        )
        .await?;
        let seeded = find_balance(&txn, customer_id, equipment_type)
            .await?
            .ok_or_else(|| DbErr::Custom("balance row missing after insert".into()))?;
        let net = to_balance(total.net, &seeded)?;

        let mut active: customer_balance::ActiveModel = seeded.into();
        active.current_balance = Set(net);
        active.status = Set(classify(net, threshold));
        let balance = active.update(&txn).await?;
        report.balances_created += 1;

        reconcile_alert(&txn, policy, &balance, &mut report).await?;
    }

    if dry_run {
        txn.rollback().await?;
    } else {
        txn.commit().await?;
    }

    info!(?report, "balance rebuild finished");
    Ok(report)
}

fn to_balance(net: i64, balance: &customer_balance::Model) -> Result<i32, RepositoryError> {
    i32::try_from(net).map_err(|_| {
        RepositoryError::validation(format!(
            "ledger total {net} for {} / {} does not fit a balance",
            balance.customer_name, balance.equipment_type
        ))
    })
}

async fn reconcile_alert<C: ConnectionTrait>(
    conn: &C,
    policy: AlertPolicy,
    balance: &customer_balance::Model,
    report: &mut RebuildReport,
) -> Result<(), RepositoryError> {
    if balance.status.is_breach() {
        match alerts::upsert_alert(conn, policy, balance).await? {
            AlertUpsert::Created(_) => report.alerts_opened += 1,
            AlertUpsert::Updated(_) => report.alerts_refreshed += 1,
            AlertUpsert::Unchanged(_) => {}
        }
    } else if let Some(open) =
        alerts::find_open_alert(conn, balance.customer_id, balance.equipment_type).await?
    {
        alerts::mark_resolved(conn, open).await?;
        report.alerts_resolved += 1;
    }
    Ok(())
}
