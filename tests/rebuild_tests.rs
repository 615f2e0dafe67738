//! Balance rebuild from the movement ledger.

use equipment_ledger::ledger::{AlertManager, AlertPolicy, BalanceReconciler, NewMovement, rebuild_balances};
use equipment_ledger::models::customer_balance::{self, BalanceStatus};
use equipment_ledger::models::{CustomerBalance, Direction, EquipmentType};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

fn policy() -> AlertPolicy {
    AlertPolicy {
        default_threshold: 20,
        high_priority_multiplier: 1.5,
    }
}

async fn corrupt(db: &DatabaseConnection, balance_id: Uuid, value: i32) {
    let balance = CustomerBalance::find_by_id(balance_id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let mut active: customer_balance::ActiveModel = balance.into();
    active.current_balance = Set(value);
    active.status = Set(BalanceStatus::Normal);
    active.update(db).await.unwrap();
}

async fn stored_balance(db: &DatabaseConnection, balance_id: Uuid) -> customer_balance::Model {
    CustomerBalance::find_by_id(balance_id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn consistent_ledger_needs_no_correction() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy());
    ledger
        .record(NewMovement::new("Tesco Leeds", EquipmentType::Pallet, 12, Direction::In))
        .await
        .unwrap();
    ledger
        .record(NewMovement::new("Asda York", EquipmentType::Cage, 3, Direction::Out))
        .await
        .unwrap();

    let report = rebuild_balances(&db, policy(), false).await.unwrap();

    assert_eq!(report.balances_checked, 2);
    assert_eq!(report.balances_corrected, 0);
    assert_eq!(report.balances_created, 0);
    assert_eq!(report.alerts_resolved, 0);
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let db = test_utils::setup_test_db().await.unwrap();
    let recorded = BalanceReconciler::new(&db, policy())
        .record(NewMovement::new("Tesco Leeds", EquipmentType::Pallet, 22, Direction::In))
        .await
        .unwrap();
    corrupt(&db, recorded.balance.id, 5).await;

    let report = rebuild_balances(&db, policy(), true).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.balances_corrected, 1);
    assert_eq!(stored_balance(&db, recorded.balance.id).await.current_balance, 5);
}

#[tokio::test]
async fn drifted_balance_is_restored_from_movements() {
    let db = test_utils::setup_test_db().await.unwrap();
    let recorded = BalanceReconciler::new(&db, policy())
        .record(NewMovement::new("Tesco Leeds", EquipmentType::Pallet, 22, Direction::In))
        .await
        .unwrap();
    corrupt(&db, recorded.balance.id, 5).await;

    let report = rebuild_balances(&db, policy(), false).await.unwrap();

    assert!(!report.dry_run);
    assert_eq!(report.balances_corrected, 1);
    let balance = stored_balance(&db, recorded.balance.id).await;
    assert_eq!(balance.current_balance, 22);
    assert_eq!(balance.status, BalanceStatus::OverThreshold);

    let again = rebuild_balances(&db, policy(), false).await.unwrap();
    assert_eq!(again.balances_corrected, 0);
}

#[tokio::test]
async fn recovered_balance_has_its_alert_resolved() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy());
    ledger
        .record(NewMovement::new("Asda York", EquipmentType::Cage, 25, Direction::In))
        .await
        .unwrap();
    ledger
        .record(NewMovement::new("Asda York", EquipmentType::Cage, 25, Direction::Out))
        .await
        .unwrap();
    let alerts = AlertManager::new(&db);
    assert_eq!(alerts.list(Some(false)).await.unwrap().len(), 1);

    let report = rebuild_balances(&db, policy(), false).await.unwrap();

    assert_eq!(report.alerts_resolved, 1);
    assert!(alerts.list(Some(false)).await.unwrap().is_empty());
    assert_eq!(alerts.list(Some(true)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_balance_row_is_recreated() {
    let db = test_utils::setup_test_db().await.unwrap();
    let recorded = BalanceReconciler::new(&db, policy())
        .record(NewMovement::new("Morrisons Bradford", EquipmentType::Dolly, 7, Direction::In))
        .await
        .unwrap();
    CustomerBalance::delete_by_id(recorded.balance.id)
        .exec(&db)
        .await
        .unwrap();

    let report = rebuild_balances(&db, policy(), false).await.unwrap();

    assert_eq!(report.balances_checked, 0);
    assert_eq!(report.balances_created, 1);
    let balances = BalanceReconciler::new(&db, policy())
        .get_balance("Morrisons Bradford", Some(EquipmentType::Dolly))
        .await
        .unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].current_balance, 7);
    assert_eq!(balances[0].status, BalanceStatus::Normal);
}
