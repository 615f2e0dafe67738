//! Delivery-note ingestion: extraction, replay detection and recording.

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    Extraction, ImageExtractor, PLACEHOLDER_CUSTOMER, fallback_extraction, image_ref,
};
use crate::error::{RepositoryError, is_unique_violation};
use crate::ledger::reconciler::{log_applied, record_in};
use crate::ledger::{AlertPolicy, NewMovement};
use crate::models::{Movement, movement};
use crate::telemetry;

/// Result of ingesting one delivery-note image.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// `sha256:<hex>` of the uploaded bytes
    pub source_image_ref: String,
    pub movements: Vec<movement::Model>,
    /// Extraction error text when the placeholder was recorded
    pub extraction_error: Option<String>,
    /// True when these movements were recorded by an earlier upload of the same image
    pub replayed: bool,
    pub extraction: Option<Extraction>,
}

impl IngestOutcome {
    fn replayed(source_image_ref: String, movements: Vec<movement::Model>) -> Self {
        Self {
            source_image_ref,
            movements,
            extraction_error: None,
            replayed: true,
            extraction: None,
        }
    }
}

fn is_placeholder(movement: &movement::Model) -> bool {
    movement.customer_name == PLACEHOLDER_CUSTOMER && movement.confidence_score == Some(0.0)
}

/// Stable id for line `line` of a successfully extracted note. Two uploads of
/// the same image collide on the primary key instead of applying twice.
fn line_id(source_image_ref: &str, line: usize) -> Uuid {
    let digest = Sha256::digest(format!("{source_image_ref}#{line}"));
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Movements already applied from this image, placeholders excluded.
async fn extracted_movements<C: ConnectionTrait>(
    conn: &C,
    source_image_ref: &str,
) -> Result<Vec<movement::Model>, RepositoryError> {
    let rows = Movement::find()
        .filter(movement::Column::SourceImageRef.eq(source_image_ref))
        .order_by_asc(movement::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok(rows.into_iter().filter(|m| !is_placeholder(m)).collect())
}

fn lost_race(error: &RepositoryError) -> bool {
    match error {
        RepositoryError::Database(err) => is_unique_violation(err),
        RepositoryError::Conflict { .. } => true,
        _ => false,
    }
}

/// Extracts movements from an image and records them in one transaction.
///
/// Once any non-placeholder movement carries the image's reference the note
/// counts as ingested: later uploads return the stored movements and apply
/// nothing. An image that so far only produced placeholders is extracted again.
pub async fn ingest_delivery_note(
    db: &DatabaseConnection,
    policy: AlertPolicy,
    extractor: &dyn ImageExtractor,
    image: &[u8],
    media_type: &str,
    driver_name: Option<String>,
) -> Result<IngestOutcome, RepositoryError> {
    let source_image_ref = image_ref(image);

    let previous = extracted_movements(db, &source_image_ref).await?;
    if !previous.is_empty() {
        info!(%source_image_ref, count = previous.len(), "delivery note already ingested");
        return Ok(IngestOutcome::replayed(source_image_ref, previous));
    }

    let (extraction, extraction_error) = match extractor.extract(image, media_type).await {
        Ok(extraction) => (extraction, None),
        Err(error) => {
            warn!(%source_image_ref, %error, "extraction failed, recording placeholder");
            telemetry::record_extraction_fallback();
            (fallback_extraction(&error), Some(error.to_string()))
        }
    };

    let batch: Vec<NewMovement> = extraction
        .movements
        .iter()
        .enumerate()
        .map(|(line, item)| NewMovement {
            // Placeholders keep random ids so a later successful read is never blocked.
            id: extraction_error
                .is_none()
                .then(|| line_id(&source_image_ref, line)),
            driver_name: driver_name.clone(),
            confidence_score: Some(extraction.confidence),
            notes: extraction.notes.clone(),
            source_image_ref: Some(source_image_ref.clone()),
            ..NewMovement::new(
                extraction.customer_name.clone(),
                item.equipment_type,
                item.quantity,
                item.direction,
            )
        })
        .collect();
    for new in &batch {
        new.validate()?;
    }

    let txn = db.begin().await?;
    if extraction_error.is_none() {
        let concurrent = extracted_movements(&txn, &source_image_ref).await?;
        if !concurrent.is_empty() {
            txn.rollback().await?;
            info!(%source_image_ref, "delivery note ingested by a concurrent upload");
            return Ok(IngestOutcome::replayed(source_image_ref, concurrent));
        }
    }

    let mut recorded = Vec::with_capacity(batch.len());
    for new in batch {
        match record_in(&txn, policy, new).await {
            Ok(result) if result.replayed => {
                txn.rollback().await?;
                return replay_after_race(db, source_image_ref).await;
            }
            Ok(result) => recorded.push(result),
            Err(error) if lost_race(&error) => {
                txn.rollback().await?;
                return replay_after_race(db, source_image_ref).await;
            }
            Err(error) => return Err(error),
        }
    }
    txn.commit().await?;
    log_applied(&recorded);

    Ok(IngestOutcome {
        source_image_ref,
        movements: recorded.into_iter().map(|r| r.movement).collect(),
        extraction_error,
        replayed: false,
        extraction: Some(extraction),
    })
}

async fn replay_after_race(
    db: &DatabaseConnection,
    source_image_ref: String,
) -> Result<IngestOutcome, RepositoryError> {
    info!(%source_image_ref, "delivery note ingested by a concurrent upload");
    let movements = extracted_movements(db, &source_image_ref).await?;
    Ok(IngestOutcome::replayed(source_image_ref, movements))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_ids_are_stable_per_image_and_line() {
        let image = image_ref(b"note");
        assert_eq!(line_id(&image, 0), line_id(&image, 0));
        assert_ne!(line_id(&image, 0), line_id(&image, 1));
        assert_ne!(line_id(&image, 0), line_id(&image_ref(b"other note"), 0));
    }
}
