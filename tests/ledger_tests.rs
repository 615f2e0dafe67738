//! Integration tests for balance reconciliation and alert management.

use equipment_ledger::error::RepositoryError;
use equipment_ledger::ledger::alerts::{AlertUpsert, upsert_alert};
use equipment_ledger::ledger::{AlertManager, AlertPolicy, BalanceReconciler, NewMovement};
use equipment_ledger::models::alert::AlertPriority;
use equipment_ledger::models::customer_balance::BalanceStatus;
use equipment_ledger::models::{Direction, EquipmentType, Movement};
use equipment_ledger::repositories::EquipmentSpecificationRepository;
use equipment_ledger::repositories::equipment_specification::NewEquipmentSpecification;
use sea_orm::{EntityTrait, PaginatorTrait};
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

fn policy(default_threshold: i32) -> AlertPolicy {
    AlertPolicy {
        default_threshold,
        high_priority_multiplier: 1.5,
    }
}

fn cage(customer: &str, quantity: i32, direction: Direction) -> NewMovement {
    NewMovement::new(customer, EquipmentType::Cage, quantity, direction)
}

#[tokio::test]
async fn moderate_overage_opens_medium_alert() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));

    ledger.record(cage("Customer X", 30, Direction::In)).await.unwrap();
    let recorded = ledger.record(cage("Customer X", 8, Direction::Out)).await.unwrap();

    assert_eq!(recorded.balance.current_balance, 22);
    assert_eq!(recorded.balance.status, BalanceStatus::OverThreshold);

    let alerts = AlertManager::new(&db).list(None).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].excess, 2);
    assert_eq!(alerts[0].current_balance, 22);
    assert_eq!(alerts[0].priority, AlertPriority::Medium);
}

#[tokio::test]
async fn large_overage_opens_high_alert() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(30));

    let recorded = ledger.record(cage("Customer Y", 50, Direction::In)).await.unwrap();

    assert_eq!(recorded.balance.current_balance, 50);
    assert_eq!(recorded.balance.threshold, 30);
    let alert = recorded.alert.expect("breach opens an alert");
    assert_eq!(alert.excess, 20);
    assert_eq!(alert.priority, AlertPriority::High);
}

#[tokio::test]
async fn collection_before_any_delivery_goes_negative_and_alerts() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));

    let recorded = ledger.record(cage("Customer Z", 5, Direction::Out)).await.unwrap();

    assert_eq!(recorded.balance.current_balance, -5);
    assert_eq!(recorded.balance.status, BalanceStatus::Negative);
    let alert = recorded.alert.expect("negative balance opens an alert");
    assert_eq!(alert.excess, 0);
    assert!(!alert.resolved);
}

#[tokio::test]
async fn raising_threshold_clears_status_but_keeps_alert_open() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    ledger.record(cage("Customer X", 30, Direction::In)).await.unwrap();
    ledger.record(cage("Customer X", 8, Direction::Out)).await.unwrap();

    let updated = ledger
        .set_threshold("Customer X", EquipmentType::Cage, 25)
        .await
        .unwrap();

    assert_eq!(updated.threshold, 25);
    assert_eq!(updated.status, BalanceStatus::Normal);
    let open = AlertManager::new(&db).list(Some(false)).await.unwrap();
    assert_eq!(open.len(), 1);
    assert!(!open[0].resolved);
}

#[tokio::test]
async fn set_threshold_on_unknown_pair_is_not_found() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));

    let err = ledger
        .set_threshold("Nobody", EquipmentType::Pallet, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound(_)));

    let err = ledger
        .set_threshold("Nobody", EquipmentType::Pallet, -1)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(_)));
}

#[tokio::test]
async fn recovery_below_threshold_does_not_auto_resolve() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    ledger.record(cage("Depot", 25, Direction::In)).await.unwrap();

    let recovered = ledger.record(cage("Depot", 15, Direction::Out)).await.unwrap();

    assert_eq!(recovered.balance.current_balance, 10);
    assert_eq!(recovered.balance.status, BalanceStatus::Normal);
    assert!(recovered.alert.is_none());
    assert_eq!(AlertManager::new(&db).list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn further_breach_refreshes_the_open_alert() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    let first = ledger.record(cage("Depot", 22, Direction::In)).await.unwrap();
    let second = ledger.record(cage("Depot", 10, Direction::In)).await.unwrap();

    let first_alert = first.alert.unwrap();
    let second_alert = second.alert.unwrap();
    assert_eq!(first_alert.id, second_alert.id);
    assert_eq!(second_alert.current_balance, 32);
    assert_eq!(second_alert.excess, 12);
    assert_eq!(second_alert.priority, AlertPriority::High);
    assert_eq!(second_alert.threshold, 20);
}

#[tokio::test]
async fn upserting_an_unchanged_balance_is_idempotent() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    let recorded = ledger.record(cage("Depot", 24, Direction::In)).await.unwrap();

    let again = upsert_alert(&db, policy(20), &recorded.balance).await.unwrap();

    assert!(matches!(again, AlertUpsert::Unchanged(_)));
    assert_eq!(again.model().id, recorded.alert.unwrap().id);
    assert_eq!(AlertManager::new(&db).list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn upsert_refuses_normal_balances() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    let recorded = ledger.record(cage("Depot", 5, Direction::In)).await.unwrap();

    let err = upsert_alert(&db, policy(20), &recorded.balance).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(_)));
}

#[tokio::test]
async fn resolved_alert_is_replaced_on_the_next_breach() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    let alerts = AlertManager::new(&db);
    let first = ledger
        .record(cage("Depot", 25, Direction::In))
        .await
        .unwrap()
        .alert
        .unwrap();

    let resolved = alerts.resolve(first.id).await.unwrap();
    assert!(resolved.resolved);
    assert!(resolved.resolved_at.is_some());

    let again = alerts.resolve(first.id).await.unwrap();
    assert_eq!(again.resolved_at, resolved.resolved_at);

    let second = ledger
        .record(cage("Depot", 1, Direction::In))
        .await
        .unwrap()
        .alert
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(alerts.list(Some(true)).await.unwrap().len(), 1);
    assert_eq!(alerts.list(Some(false)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resolving_unknown_alert_is_not_found() {
    let db = test_utils::setup_test_db().await.unwrap();
    let err = AlertManager::new(&db).resolve(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound(_)));
}

#[tokio::test]
async fn balance_is_independent_of_movement_order() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(100));
    let moves = [
        (12, Direction::In),
        (5, Direction::Out),
        (30, Direction::In),
        (9, Direction::Out),
    ];

    for (qty, dir) in moves {
        ledger.record(cage("Forward", qty, dir)).await.unwrap();
    }
    for (qty, dir) in moves.iter().rev() {
        ledger.record(cage("Backward", *qty, *dir)).await.unwrap();
    }

    let forward = ledger.get_balance("Forward", None).await.unwrap();
    let backward = ledger.get_balance("Backward", None).await.unwrap();
    assert_eq!(forward[0].current_balance, 28);
    assert_eq!(backward[0].current_balance, 28);
}

#[tokio::test]
async fn repeated_movement_id_replays_without_reapplying() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    let id = Uuid::new_v4();
    let movement = NewMovement {
        id: Some(id),
        ..cage("Replay Ltd", 7, Direction::In)
    };

    let first = ledger.record(movement.clone()).await.unwrap();
    let second = ledger.record(movement).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.movement.id, id);
    assert_eq!(second.balance.current_balance, 7);
    assert_eq!(Movement::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_batch_applies_nothing() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    let batch = vec![
        cage("Atomic Ltd", 4, Direction::In),
        NewMovement {
            equipment_spec_id: Some(Uuid::new_v4()),
            ..cage("Atomic Ltd", 2, Direction::In)
        },
    ];

    let err = ledger.record_batch(batch).await.unwrap_err();

    assert!(matches!(err, RepositoryError::Validation(_)));
    assert_eq!(Movement::find().count(&db).await.unwrap(), 0);
    assert!(ledger.get_balance("Atomic", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_movement_is_rejected_before_writing() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));

    let err = ledger
        .record(cage("Acme", 0, Direction::In))
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::Validation(_)));
    assert_eq!(Movement::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn new_balance_takes_threshold_from_specifications() {
    let db = test_utils::setup_test_db().await.unwrap();
    let specs = EquipmentSpecificationRepository::new(&db);
    let spec = |name: &str, threshold| NewEquipmentSpecification {
        equipment_type: EquipmentType::Pallet,
        name: name.to_string(),
        color: None,
        size: None,
        grade: None,
        description: None,
        default_threshold: Some(threshold),
        is_active: Some(true),
    };
    specs.create(spec("Euro Pallet", 50)).await.unwrap();
    let uk = specs.create(spec("UK Pallet", 40)).await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));

    let by_type = ledger
        .record(NewMovement::new("Lowest", EquipmentType::Pallet, 1, Direction::In))
        .await
        .unwrap();
    let by_spec = ledger
        .record(NewMovement {
            equipment_spec_id: Some(uk.id),
            ..NewMovement::new("Named", EquipmentType::Pallet, 1, Direction::In)
        })
        .await
        .unwrap();
    let fallback = ledger
        .record(NewMovement::new("Fallback", EquipmentType::Dolly, 1, Direction::In))
        .await
        .unwrap();

    assert_eq!(by_type.balance.threshold, 40);
    assert_eq!(by_spec.balance.threshold, 40);
    assert_eq!(by_spec.movement.equipment_name.as_deref(), Some("UK Pallet"));
    assert_eq!(fallback.balance.threshold, 20);
}

#[tokio::test]
async fn spec_of_another_type_is_rejected() {
    let db = test_utils::setup_test_db().await.unwrap();
    let spec = EquipmentSpecificationRepository::new(&db)
        .create(NewEquipmentSpecification {
            equipment_type: EquipmentType::Pallet,
            name: "Euro Pallet".into(),
            color: None,
            size: None,
            grade: None,
            description: None,
            default_threshold: None,
            is_active: None,
        })
        .await
        .unwrap();

    let err = BalanceReconciler::new(&db, policy(20))
        .record(NewMovement {
            equipment_spec_id: Some(spec.id),
            ..cage("Mismatch", 3, Direction::In)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(_)));
}

#[tokio::test]
async fn balance_lookup_is_case_insensitive_substring() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    ledger
        .record(NewMovement::new("Tesco Leeds", EquipmentType::Pallet, 3, Direction::In))
        .await
        .unwrap();
    ledger.record(cage("Tesco Leeds", 2, Direction::In)).await.unwrap();
    ledger.record(cage("Asda York", 2, Direction::In)).await.unwrap();

    assert_eq!(ledger.get_balance("tesco", None).await.unwrap().len(), 2);
    let cages = ledger
        .get_balance("LEEDS", Some(EquipmentType::Cage))
        .await
        .unwrap();
    assert_eq!(cages.len(), 1);
    assert_eq!(cages[0].current_balance, 2);
    assert!(ledger.get_balance("Sainsbury", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_balances_filters_by_status() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, policy(20));
    ledger.record(cage("Normal Co", 5, Direction::In)).await.unwrap();
    ledger.record(cage("Over Co", 25, Direction::In)).await.unwrap();
    ledger.record(cage("Short Co", 2, Direction::Out)).await.unwrap();

    assert_eq!(ledger.list_balances(None).await.unwrap().len(), 3);
    let over = ledger
        .list_balances(Some(BalanceStatus::OverThreshold))
        .await
        .unwrap();
    assert_eq!(over.len(), 1);
    assert_eq!(over[0].customer_name, "Over Co");
    let negative = ledger
        .list_balances(Some(BalanceStatus::Negative))
        .await
        .unwrap();
    assert_eq!(negative[0].customer_name, "Short Co");
}

#[tokio::test]
async fn concurrent_movements_for_one_pair_all_apply() {
    let db = test_utils::setup_test_db().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            BalanceReconciler::new(&db, policy(100))
                .record(cage("Busy Depot", 3, Direction::In))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let balances = BalanceReconciler::new(&db, policy(100))
        .get_balance("Busy Depot", Some(EquipmentType::Cage))
        .await
        .unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].current_balance, 30);
}
