//! Integration tests for customers, equipment specifications, fleet records
//! and driver instructions.

use chrono::{Duration, Utc};
use equipment_ledger::error::RepositoryError;
use equipment_ledger::ledger::{AlertManager, AlertPolicy, BalanceReconciler, NewMovement};
use equipment_ledger::models::driver::DriverStatus;
use equipment_ledger::models::driver_instruction::{InstructionPriority, InstructionStatus};
use equipment_ledger::models::vehicle::VehicleStatus;
use equipment_ledger::models::{Direction, EquipmentType};
use equipment_ledger::repositories::customer::{CustomerPatch, NewCustomer};
use equipment_ledger::repositories::driver::{DriverPatch, NewDriver};
use equipment_ledger::repositories::driver_instruction::{InstructionFilter, NewDriverInstruction};
use equipment_ledger::repositories::equipment_specification::NewEquipmentSpecification;
use equipment_ledger::repositories::vehicle::NewVehicle;
use equipment_ledger::repositories::{
    CustomerRepository, DriverInstructionRepository, DriverRepository,
    EquipmentSpecificationRepository, VehicleRepository,
};
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

fn new_customer(name: &str) -> NewCustomer {
    NewCustomer {
        customer_name: name.to_string(),
        contact_person: None,
        email: None,
        phone: None,
        address: None,
        city: Some("Leeds".to_string()),
        postcode: None,
        country: None,
        status: None,
        credit_limit: None,
        payment_terms: None,
        notes: None,
    }
}

fn new_spec(name: &str) -> NewEquipmentSpecification {
    NewEquipmentSpecification {
        equipment_type: EquipmentType::Pallet,
        name: name.to_string(),
        color: Some("Blue".to_string()),
        size: Some("1200x800mm".to_string()),
        grade: Some("A".to_string()),
        description: None,
        default_threshold: None,
        is_active: None,
    }
}

fn new_vehicle(fleet_number: &str, registration: &str) -> NewVehicle {
    NewVehicle {
        fleet_number: fleet_number.to_string(),
        registration: registration.to_string(),
        make: Some("Iveco".to_string()),
        model: Some("Eurocargo".to_string()),
        year: Some(2021),
        vehicle_type: None,
        capacity: None,
        status: None,
        mot_expiry: None,
        insurance_expiry: None,
        last_service_date: None,
        next_service_due: None,
        mileage: None,
        notes: None,
    }
}

fn new_driver(name: &str, employee_id: &str) -> NewDriver {
    NewDriver {
        driver_name: name.to_string(),
        employee_id: Some(employee_id.to_string()),
        email: None,
        phone: None,
        license_number: None,
        license_expiry: Some(Utc::now() + Duration::days(365)),
        status: None,
        assigned_vehicle_id: None,
        notes: None,
    }
}

fn new_instruction(title: &str, driver: Option<&str>) -> NewDriverInstruction {
    NewDriverInstruction {
        title: title.to_string(),
        content: "Collect empties from the loading bay".to_string(),
        priority: None,
        status: None,
        assigned_driver: driver.map(str::to_string),
        customer_name: Some("Tesco Leeds".to_string()),
        delivery_location: None,
        contact_phone: None,
        delivery_date: None,
        equipment_type: Some(EquipmentType::Pallet),
        equipment_quantity: Some(12),
        special_instructions: None,
    }
}

#[tokio::test]
async fn customer_defaults_and_duplicate_names() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customers = CustomerRepository::new(&db);

    let created = customers.create(new_customer("Tesco Leeds")).await.unwrap();
    assert_eq!(created.country.as_deref(), Some("UK"));
    assert_eq!(created.payment_terms.as_deref(), Some("30 days"));

    let err = customers.create(new_customer("Tesco Leeds")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));

    let err = customers.create(new_customer("   ")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(_)));
}

#[tokio::test]
async fn customer_search_matches_name_and_city() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customers = CustomerRepository::new(&db);
    customers.create(new_customer("Tesco Leeds")).await.unwrap();
    customers
        .create(NewCustomer {
            city: Some("York".to_string()),
            ..new_customer("Asda")
        })
        .await
        .unwrap();

    assert_eq!(customers.list(None, Some("tesco")).await.unwrap().len(), 1);
    assert_eq!(customers.list(None, Some("york")).await.unwrap().len(), 1);
    assert_eq!(customers.list(None, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn renaming_a_customer_keeps_its_balances_and_alerts() {
    let db = test_utils::setup_test_db().await.unwrap();
    let ledger = BalanceReconciler::new(&db, AlertPolicy::default());
    let recorded = ledger
        .record(NewMovement::new("Tesco Leeds", EquipmentType::Cage, 25, Direction::In))
        .await
        .unwrap();
    let customers = CustomerRepository::new(&db);

    customers
        .update(
            recorded.movement.customer_id,
            CustomerPatch {
                customer_name: Some("Tesco Leeds DC".to_string()),
                ..CustomerPatch::default()
            },
        )
        .await
        .unwrap();

    let balances = ledger.get_balance("Tesco Leeds DC", None).await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].current_balance, 25);
    let alerts = AlertManager::new(&db).list(None).await.unwrap();
    assert_eq!(alerts[0].customer_name, "Tesco Leeds DC");

    let next = ledger
        .record(NewMovement::new("Tesco Leeds DC", EquipmentType::Cage, 5, Direction::Out))
        .await
        .unwrap();
    assert_eq!(next.balance.id, balances[0].id);
    assert_eq!(next.balance.current_balance, 20);
}

#[tokio::test]
async fn rename_to_existing_name_conflicts() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customers = CustomerRepository::new(&db);
    customers.create(new_customer("Tesco Leeds")).await.unwrap();
    let asda = customers.create(new_customer("Asda York")).await.unwrap();

    let err = customers
        .update(
            asda.id,
            CustomerPatch {
                customer_name: Some("Tesco Leeds".to_string()),
                ..CustomerPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));
}

#[tokio::test]
async fn customer_with_history_cannot_be_deleted() {
    let db = test_utils::setup_test_db().await.unwrap();
    let recorded = BalanceReconciler::new(&db, AlertPolicy::default())
        .record(NewMovement::new("Busy Ltd", EquipmentType::Pallet, 3, Direction::In))
        .await
        .unwrap();
    let customers = CustomerRepository::new(&db);

    let err = customers
        .delete(recorded.movement.customer_id)
        .await
        .unwrap_err();
    match err {
        RepositoryError::Conflict { details, .. } => {
            assert_eq!(details["balances"], 1);
            assert_eq!(details["movements"], 1);
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let idle = customers.create(new_customer("Idle Ltd")).await.unwrap();
    customers.delete(idle.id).await.unwrap();
    assert!(matches!(
        customers.get(idle.id).await,
        Err(RepositoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn referenced_specification_cannot_be_deleted() {
    let db = test_utils::setup_test_db().await.unwrap();
    let specs = EquipmentSpecificationRepository::new(&db);
    let spec = specs.create(new_spec("Euro Pallet Blue")).await.unwrap();
    assert_eq!(spec.default_threshold, 20);
    assert!(spec.is_active);
    BalanceReconciler::new(&db, AlertPolicy::default())
        .record(NewMovement {
            equipment_spec_id: Some(spec.id),
            ..NewMovement::new("Tesco Leeds", EquipmentType::Pallet, 4, Direction::In)
        })
        .await
        .unwrap();

    let err = specs.delete(spec.id).await.unwrap_err();
    match err {
        RepositoryError::Conflict { message, details } => {
            assert!(message.contains("is_active to false"));
            assert_eq!(details["movements"], 1);
            assert_eq!(details["balances"], 1);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(specs.get(spec.id).await.unwrap().is_active);
}

#[tokio::test]
async fn unreferenced_specification_is_soft_deleted() {
    let db = test_utils::setup_test_db().await.unwrap();
    let specs = EquipmentSpecificationRepository::new(&db);
    let spec = specs.create(new_spec("Half Pallet")).await.unwrap();

    let deleted = specs.delete(spec.id).await.unwrap();

    assert!(!deleted.is_active);
    assert_eq!(specs.list(None, Some(true)).await.unwrap().len(), 0);
    assert_eq!(specs.list(Some(EquipmentType::Pallet), None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn specification_rejects_negative_threshold() {
    let db = test_utils::setup_test_db().await.unwrap();
    let err = EquipmentSpecificationRepository::new(&db)
        .create(NewEquipmentSpecification {
            default_threshold: Some(-3),
            ..new_spec("Broken")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(_)));
}

#[tokio::test]
async fn vehicles_are_unique_and_soft_deleted() {
    let db = test_utils::setup_test_db().await.unwrap();
    let vehicles = VehicleRepository::new(&db);
    let van = vehicles.create(new_vehicle("FL-01", "ab12 cde")).await.unwrap();
    assert_eq!(van.registration, "AB12 CDE");

    let err = vehicles
        .create(new_vehicle("FL-01", "XY99 ZZZ"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));
    let err = vehicles
        .create(new_vehicle("FL-02", "AB12 CDE"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));

    let retired = vehicles.delete(van.id).await.unwrap();
    assert!(!retired.is_active);
    assert_eq!(retired.status, VehicleStatus::OutOfService);
}

#[tokio::test]
async fn drivers_reference_existing_vehicles() {
    let db = test_utils::setup_test_db().await.unwrap();
    let drivers = DriverRepository::new(&db);

    let err = drivers
        .create(NewDriver {
            assigned_vehicle_id: Some(Uuid::new_v4()),
            ..new_driver("Tom Harrison", "DRV-101")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(_)));

    let van = VehicleRepository::new(&db)
        .create(new_vehicle("FL-07", "LN70 ABC"))
        .await
        .unwrap();
    let tom = drivers
        .create(NewDriver {
            assigned_vehicle_id: Some(van.id),
            ..new_driver("Tom Harrison", "DRV-101")
        })
        .await
        .unwrap();
    assert_eq!(tom.status, DriverStatus::Active);

    let err = drivers
        .create(new_driver("Tom Clone", "DRV-101"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));

    let on_leave = drivers
        .update(
            tom.id,
            DriverPatch {
                status: Some(DriverStatus::OnLeave),
                ..DriverPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(on_leave.status, DriverStatus::OnLeave);

    let gone = drivers.delete(tom.id).await.unwrap();
    assert!(!gone.is_active);
    assert_eq!(drivers.list(None, Some(true)).await.unwrap().len(), 0);
}

#[tokio::test]
async fn instructions_filter_and_transition() {
    let db = test_utils::setup_test_db().await.unwrap();
    let instructions = DriverInstructionRepository::new(&db);
    let first = instructions
        .create(new_instruction("Collect pallets", Some("tom")), "manager1")
        .await
        .unwrap();
    instructions
        .create(new_instruction("Drop cages", Some("sara")), "manager1")
        .await
        .unwrap();

    assert_eq!(first.created_by.as_deref(), Some("manager1"));
    assert_eq!(first.status, InstructionStatus::Pending);
    assert_eq!(first.priority, InstructionPriority::Medium);

    let toms = instructions
        .list(&InstructionFilter {
            driver_name: Some("tom".to_string()),
            ..InstructionFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(toms.len(), 1);

    let started = instructions
        .update_status(first.id, InstructionStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(started.status, InstructionStatus::InProgress);

    instructions.delete(first.id).await.unwrap();
    assert!(matches!(
        instructions.get(first.id).await,
        Err(RepositoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn collection_tasks_follow_over_threshold_balances() {
    let db = test_utils::setup_test_db().await.unwrap();
    let policy = AlertPolicy::default();
    let ledger = BalanceReconciler::new(&db, policy);
    ledger
        .record(NewMovement::new("Tesco Leeds", EquipmentType::Pallet, 32, Direction::In))
        .await
        .unwrap();
    ledger
        .record(NewMovement::new("Asda York", EquipmentType::Cage, 24, Direction::In))
        .await
        .unwrap();
    ledger
        .record(NewMovement::new("Quiet Co", EquipmentType::Cage, 3, Direction::In))
        .await
        .unwrap();
    let instructions = DriverInstructionRepository::new(&db);

    let tasks = instructions.auto_generated(&policy, None, None).await.unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].customer_name, "Tesco Leeds");
    assert_eq!(tasks[0].equipment_quantity, 12);
    assert_eq!(tasks[0].priority, InstructionPriority::High);
    assert_eq!(tasks[1].customer_name, "Asda York");
    assert_eq!(tasks[1].priority, InstructionPriority::Medium);

    assert!(
        instructions
            .auto_generated(&policy, Some("tom"), None)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        instructions
            .auto_generated(&policy, None, Some(InstructionStatus::Completed))
            .await
            .unwrap()
            .is_empty()
    );
}
