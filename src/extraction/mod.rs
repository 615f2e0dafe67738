//! # Delivery-note extraction
//!
//! Turns a photographed delivery note into movement records. The vision
//! backend sits behind [`ImageExtractor`]; any failure degrades to a
//! low-confidence placeholder so ingestion never errors on a bad read.

pub mod ingest;
pub mod vision;

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::{Direction, EquipmentType};

pub use ingest::{IngestOutcome, ingest_delivery_note};
pub use vision::VisionExtractor;

/// Customer name recorded when a note could not be read.
pub const PLACEHOLDER_CUSTOMER: &str = "Unidentified delivery note";

/// Confidence assumed when the model omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

static JSON_OBJECT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}"));

/// One line of a delivery note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedMovement {
    pub equipment_type: EquipmentType,
    pub quantity: i32,
    pub direction: Direction,
}

/// Structured reading of a delivery note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Extraction {
    pub customer_name: String,
    pub movements: Vec<ExtractedMovement>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// In [0.0, 1.0]
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("vision API key is not configured")]
    NotConfigured,
    #[error("vision request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vision API returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("could not parse extraction: {0}")]
    Malformed(String),
}

/// Reads structured movement data out of an image.
#[async_trait]
pub trait ImageExtractor: Send + Sync {
    async fn extract(&self, image: &[u8], media_type: &str)
    -> Result<Extraction, ExtractionError>;
}

/// Stable reference for an uploaded image, used to detect replays.
pub fn image_ref(image: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(image)))
}

/// Placeholder reading recorded when extraction fails: one `other` item
/// delivered to [`PLACEHOLDER_CUSTOMER`], zero confidence, reason in notes.
pub fn fallback_extraction(error: &ExtractionError) -> Extraction {
    Extraction {
        customer_name: PLACEHOLDER_CUSTOMER.to_string(),
        movements: vec![ExtractedMovement {
            equipment_type: EquipmentType::Other,
            quantity: 1,
            direction: Direction::In,
        }],
        date: None,
        notes: Some(format!("Automatic extraction failed: {error}")),
        confidence: 0.0,
    }
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    movements: Vec<RawMovement>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMovement {
    equipment_type: String,
    quantity: i64,
    direction: String,
}

/// Parses model output that contains a JSON object, possibly wrapped in prose
/// or a markdown fence.
pub fn parse_extraction(text: &str) -> Result<Extraction, ExtractionError> {
    let pattern = JSON_OBJECT
        .as_ref()
        .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    let json = pattern
        .find(text)
        .ok_or_else(|| ExtractionError::Malformed("no JSON object in response".into()))?;
    let raw: RawExtraction = serde_json::from_str(json.as_str())
        .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    let customer_name = raw
        .customer_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ExtractionError::Malformed("customer_name is missing".into()))?;

    if raw.movements.is_empty() {
        return Err(ExtractionError::Malformed("no movements found".into()));
    }

    let movements = raw
        .movements
        .into_iter()
        .map(|m| {
            let equipment_type = parse_equipment_type(&m.equipment_type).ok_or_else(|| {
                ExtractionError::Malformed(format!("unknown equipment type '{}'", m.equipment_type))
            })?;
            let direction = Direction::parse(&m.direction).ok_or_else(|| {
                ExtractionError::Malformed(format!("unknown direction '{}'", m.direction))
            })?;
            let quantity = i32::try_from(m.quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    ExtractionError::Malformed(format!("invalid quantity {}", m.quantity))
                })?;
            Ok(ExtractedMovement {
                equipment_type,
                quantity,
                direction,
            })
        })
        .collect::<Result<Vec<_>, ExtractionError>>()?;

    let date = raw
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());

    let confidence = raw
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    Ok(Extraction {
        customer_name,
        movements,
        date,
        notes: raw.notes.filter(|n| !n.trim().is_empty()),
        confidence,
    })
}

/// Accepts singular or plural names ("pallets").
fn parse_equipment_type(value: &str) -> Option<EquipmentType> {
    EquipmentType::parse(value).or_else(|| {
        value
            .trim()
            .strip_suffix('s')
            .and_then(EquipmentType::parse)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let text = r#"Here is what I found:
```json
{
  "customer_name": "Tesco Depot",
  "movements": [
    {"equipment_type": "pallet", "quantity": 12, "direction": "in"},
    {"equipment_type": "Cages", "quantity": 3, "direction": "OUT"}
  ],
  "date": "2024-03-01",
  "notes": "signed by J. Smith",
  "confidence": 0.92
}
```"#;
        let extraction = parse_extraction(text).unwrap();
        assert_eq!(extraction.customer_name, "Tesco Depot");
        assert_eq!(extraction.movements.len(), 2);
        assert_eq!(extraction.movements[1].equipment_type, EquipmentType::Cage);
        assert_eq!(extraction.movements[1].direction, Direction::Out);
        assert_eq!(extraction.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(extraction.confidence, 0.92);
    }

    #[test]
    fn missing_confidence_defaults_and_large_values_clamp() {
        let text = r#"{"customer_name":"A","movements":[{"equipment_type":"dolly","quantity":1,"direction":"in"}]}"#;
        assert_eq!(parse_extraction(text).unwrap().confidence, DEFAULT_CONFIDENCE);

        let text = r#"{"customer_name":"A","movements":[{"equipment_type":"dolly","quantity":1,"direction":"in"}],"confidence":7}"#;
        assert_eq!(parse_extraction(text).unwrap().confidence, 1.0);
    }

    #[test]
    fn rejects_unusable_output() {
        assert!(parse_extraction("I cannot read this image").is_err());
        assert!(parse_extraction(r#"{"customer_name":"A","movements":[]}"#).is_err());
        assert!(
            parse_extraction(
                r#"{"customer_name":"A","movements":[{"equipment_type":"crate","quantity":1,"direction":"in"}]}"#
            )
            .is_err()
        );
        assert!(
            parse_extraction(
                r#"{"customer_name":"A","movements":[{"equipment_type":"pallet","quantity":0,"direction":"in"}]}"#
            )
            .is_err()
        );
        assert!(
            parse_extraction(
                r#"{"customer_name":"  ","movements":[{"equipment_type":"pallet","quantity":2,"direction":"in"}]}"#
            )
            .is_err()
        );
    }

    #[test]
    fn fallback_is_a_single_zero_confidence_item() {
        let fallback = fallback_extraction(&ExtractionError::NotConfigured);
        assert_eq!(fallback.customer_name, PLACEHOLDER_CUSTOMER);
        assert_eq!(fallback.confidence, 0.0);
        assert_eq!(
            fallback.movements,
            vec![ExtractedMovement {
                equipment_type: EquipmentType::Other,
                quantity: 1,
                direction: Direction::In,
            }]
        );
        assert!(fallback.notes.unwrap().contains("not configured"));
    }

    #[test]
    fn image_ref_is_stable_sha256() {
        let a = image_ref(b"note");
        assert_eq!(a, image_ref(b"note"));
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), "sha256:".len() + 64);
        assert_ne!(a, image_ref(b"other note"));
    }
}
