//! Delivery-note ingestion against a mocked vision API.

use std::time::Duration;

use equipment_ledger::extraction::{
    ExtractedMovement, Extraction, ExtractionError, ImageExtractor, PLACEHOLDER_CUSTOMER,
    VisionExtractor, image_ref, ingest_delivery_note,
};
use equipment_ledger::ledger::{AlertPolicy, BalanceReconciler};
use equipment_ledger::models::{Direction, EquipmentType};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

const NOTE_IMAGE: &[u8] = b"\xff\xd8\xff\xe0 delivery note bytes";

fn extractor_for(server: &MockServer) -> VisionExtractor {
    VisionExtractor::new(
        Some("test-key".to_string()),
        server.uri(),
        "vision-test",
        Duration::from_secs(5),
    )
    .unwrap()
}

fn model_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "content": [{ "type": "text", "text": text }]
    }))
}

const TESCO_NOTE: &str = r#"Here is the extracted data:
```json
{
  "customer_name": "Tesco Leeds",
  "movements": [
    {"equipment_type": "pallets", "quantity": 12, "direction": "in"},
    {"equipment_type": "cage", "quantity": 3, "direction": "out"}
  ],
  "date": "2025-01-06",
  "notes": "Signed by R. Patel",
  "confidence": 0.92
}
```"#;

#[tokio::test]
async fn readable_note_records_each_line() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .respond_with(model_reply(TESCO_NOTE))
        .expect(1)
        .mount(&server)
        .await;
    let db = test_utils::setup_test_db().await.unwrap();
    let extractor = extractor_for(&server);

    let outcome = ingest_delivery_note(
        &db,
        AlertPolicy::default(),
        &extractor,
        NOTE_IMAGE,
        "image/jpeg",
        Some("tom".to_string()),
    )
    .await
    .unwrap();

    assert!(!outcome.replayed);
    assert!(outcome.extraction_error.is_none());
    assert_eq!(outcome.source_image_ref, image_ref(NOTE_IMAGE));
    assert!(outcome.source_image_ref.starts_with("sha256:"));
    assert_eq!(outcome.movements.len(), 2);
    for movement in &outcome.movements {
        assert_eq!(movement.customer_name, "Tesco Leeds");
        assert_eq!(movement.confidence_score, Some(0.92));
        assert_eq!(movement.driver_name.as_deref(), Some("tom"));
        assert!(!movement.verified);
    }
    let extraction = outcome.extraction.unwrap();
    assert_eq!(extraction.date.map(|d| d.to_string()).as_deref(), Some("2025-01-06"));

    let balances = BalanceReconciler::new(&db, AlertPolicy::default())
        .get_balance("Tesco Leeds", None)
        .await
        .unwrap();
    let pallets = balances
        .iter()
        .find(|b| b.equipment_type == EquipmentType::Pallet)
        .unwrap();
    let cages = balances
        .iter()
        .find(|b| b.equipment_type == EquipmentType::Cage)
        .unwrap();
    assert_eq!(pallets.current_balance, 12);
    assert_eq!(cages.current_balance, -3);
}

#[tokio::test]
async fn upstream_failure_records_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;
    let db = test_utils::setup_test_db().await.unwrap();
    let extractor = extractor_for(&server);

    let outcome = ingest_delivery_note(
        &db,
        AlertPolicy::default(),
        &extractor,
        NOTE_IMAGE,
        "image/png",
        None,
    )
    .await
    .unwrap();

    let error = outcome.extraction_error.unwrap();
    assert!(error.contains("529"));
    assert_eq!(outcome.movements.len(), 1);
    let placeholder = &outcome.movements[0];
    assert_eq!(placeholder.customer_name, PLACEHOLDER_CUSTOMER);
    assert_eq!(placeholder.equipment_type, EquipmentType::Other);
    assert_eq!(placeholder.quantity, 1);
    assert_eq!(placeholder.direction, Direction::In);
    assert_eq!(placeholder.confidence_score, Some(0.0));
    assert!(
        placeholder
            .notes
            .as_deref()
            .is_some_and(|n| n.starts_with("Automatic extraction failed"))
    );
}

#[tokio::test]
async fn unparseable_reply_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply("I could not read this image, sorry."))
        .mount(&server)
        .await;
    let extractor = extractor_for(&server);

    let err = extractor.extract(NOTE_IMAGE, "image/jpeg").await.unwrap_err();

    assert!(matches!(err, ExtractionError::Malformed(_)));
}

#[tokio::test]
async fn same_image_is_not_applied_twice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(TESCO_NOTE))
        .expect(1)
        .mount(&server)
        .await;
    let db = test_utils::setup_test_db().await.unwrap();
    let extractor = extractor_for(&server);
    let policy = AlertPolicy::default();

    let first = ingest_delivery_note(&db, policy, &extractor, NOTE_IMAGE, "image/jpeg", None)
        .await
        .unwrap();
    let second = ingest_delivery_note(&db, policy, &extractor, NOTE_IMAGE, "image/jpeg", None)
        .await
        .unwrap();

    assert!(second.replayed);
    assert!(second.extraction.is_none());
    let mut first_ids: Vec<_> = first.movements.iter().map(|m| m.id).collect();
    let mut second_ids: Vec<_> = second.movements.iter().map(|m| m.id).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);

    let pallets = BalanceReconciler::new(&db, policy)
        .get_balance("Tesco Leeds", Some(EquipmentType::Pallet))
        .await
        .unwrap();
    assert_eq!(pallets[0].current_balance, 12);
}

#[tokio::test]
async fn placeholder_upload_is_extracted_again() {
    let db = test_utils::setup_test_db().await.unwrap();
    let policy = AlertPolicy::default();
    let failing = test_utils::StubExtractor::failing();
    let reading = test_utils::StubExtractor::returning(Extraction {
        customer_name: "Asda York".to_string(),
        movements: vec![ExtractedMovement {
            equipment_type: EquipmentType::Dolly,
            quantity: 6,
            direction: Direction::In,
        }],
        date: None,
        notes: None,
        confidence: 0.8,
    });

    let first = ingest_delivery_note(&db, policy, &failing, NOTE_IMAGE, "image/jpeg", None)
        .await
        .unwrap();
    let second = ingest_delivery_note(&db, policy, &reading, NOTE_IMAGE, "image/jpeg", None)
        .await
        .unwrap();

    assert!(first.extraction_error.is_some());
    assert!(!second.replayed);
    assert_eq!(reading.calls(), 1);
    assert_eq!(second.movements[0].customer_name, "Asda York");
    assert_eq!(second.movements[0].source_image_ref, first.movements[0].source_image_ref);
}

#[tokio::test]
async fn note_read_after_placeholder_is_not_applied_again() {
    let db = test_utils::setup_test_db().await.unwrap();
    let policy = AlertPolicy::default();
    let failing = test_utils::StubExtractor::failing();
    let reading = test_utils::StubExtractor::returning(Extraction {
        customer_name: "Asda York".to_string(),
        movements: vec![ExtractedMovement {
            equipment_type: EquipmentType::Dolly,
            quantity: 6,
            direction: Direction::In,
        }],
        date: None,
        notes: None,
        confidence: 0.8,
    });

    ingest_delivery_note(&db, policy, &failing, NOTE_IMAGE, "image/jpeg", None)
        .await
        .unwrap();
    let read = ingest_delivery_note(&db, policy, &reading, NOTE_IMAGE, "image/jpeg", None)
        .await
        .unwrap();
    let again = ingest_delivery_note(&db, policy, &reading, NOTE_IMAGE, "image/jpeg", None)
        .await
        .unwrap();

    assert!(!read.replayed);
    assert!(again.replayed);
    assert_eq!(reading.calls(), 1);
    assert_eq!(again.movements.len(), 1);
    assert_eq!(again.movements[0].id, read.movements[0].id);

    let balances = BalanceReconciler::new(&db, policy)
        .get_balance("Asda York", Some(EquipmentType::Dolly))
        .await
        .unwrap();
    assert_eq!(balances[0].current_balance, 6);
}

#[tokio::test]
async fn concurrent_uploads_of_one_note_apply_once() {
    let db = test_utils::setup_test_db().await.unwrap();
    let policy = AlertPolicy::default();
    let reading = test_utils::StubExtractor::returning(Extraction {
        customer_name: "Tesco Leeds".to_string(),
        movements: vec![
            ExtractedMovement {
                equipment_type: EquipmentType::Pallet,
                quantity: 4,
                direction: Direction::In,
            },
            ExtractedMovement {
                equipment_type: EquipmentType::Cage,
                quantity: 2,
                direction: Direction::Out,
            },
        ],
        date: None,
        notes: None,
        confidence: 0.9,
    });

    let (a, b) = tokio::join!(
        ingest_delivery_note(&db, policy, &reading, NOTE_IMAGE, "image/jpeg", None),
        ingest_delivery_note(&db, policy, &reading, NOTE_IMAGE, "image/jpeg", None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!([a.replayed, b.replayed].iter().filter(|replayed| !**replayed).count(), 1);
    let ledger = BalanceReconciler::new(&db, policy);
    let pallets = ledger
        .get_balance("Tesco Leeds", Some(EquipmentType::Pallet))
        .await
        .unwrap();
    let cages = ledger
        .get_balance("Tesco Leeds", Some(EquipmentType::Cage))
        .await
        .unwrap();
    assert_eq!(pallets[0].current_balance, 4);
    assert_eq!(cages[0].current_balance, -2);
}
