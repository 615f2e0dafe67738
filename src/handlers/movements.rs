//! # Movement API Handlers
//!
//! Ledger listing, manual entry, verification and delivery-note photo upload.

use axum::{
    extract::{Multipart, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, field_error};
use crate::extraction::ingest_delivery_note;
use crate::ledger::{BalanceReconciler, NewMovement, RecordedMovement};
use crate::models::equipment_specification::EquipmentType;
use crate::models::movement::{self, Direction};
use crate::models::user::Role;
use crate::models::{alert, customer_balance};
use crate::repositories::MovementRepository;
use crate::repositories::movement::MovementFilter;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListMovementsQuery {
    /// Case-insensitive substring of the customer name
    pub customer_name: Option<String>,
    pub equipment_type: Option<EquipmentType>,
    pub skip: Option<u64>,
    /// Page size (default 100, max 1000)
    pub limit: Option<u64>,
}

/// Manual movement entry
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMovementRequest {
    /// Optional client-chosen id; resubmitting the same id is a no-op
    pub id: Option<Uuid>,
    pub customer_name: String,
    pub equipment_type: EquipmentType,
    pub equipment_spec_id: Option<Uuid>,
    pub quantity: i32,
    pub direction: Direction,
    /// Defaults to now
    pub timestamp: Option<DateTime<Utc>>,
    pub driver_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementRecordedResponse {
    pub movement: movement::Model,
    pub balance: customer_balance::Model,
    /// Open alert for the pair after the movement
    pub alert: Option<alert::Model>,
    /// True when this id was recorded earlier and nothing was applied
    pub replayed: bool,
}

impl From<RecordedMovement> for MovementRecordedResponse {
    fn from(recorded: RecordedMovement) -> Self {
        Self {
            movement: recorded.movement,
            balance: recorded.balance,
            alert: recorded.alert,
            replayed: recorded.replayed,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UploadQuery {
    pub driver_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// False when extraction failed and a placeholder was recorded
    pub success: bool,
    pub source_image_ref: String,
    pub movements: Vec<movement::Model>,
    pub error: Option<String>,
    /// True when this image was already processed
    pub replayed: bool,
    /// Date printed on the note, when one was read
    pub note_date: Option<NaiveDate>,
    pub confidence: Option<f64>,
}

/// Multipart form for `/upload-photo`
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[utoipa::path(
    get,
    path = "/movements",
    security(("bearer_auth" = [])),
    params(ListMovementsQuery),
    responses(
        (status = 200, description = "Movements, newest first", body = [movement::Model]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "movements"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListMovementsQuery>,
) -> Result<Json<Vec<movement::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    let filter = MovementFilter {
        customer_name: query.customer_name,
        equipment_type: query.equipment_type,
        skip: query.skip,
        limit: query.limit,
    };
    Ok(Json(MovementRepository::new(&state.db).list(&filter).await?))
}

/// Records a movement and applies it to the customer's balance
#[utoipa::path(
    post,
    path = "/movements",
    security(("bearer_auth" = [])),
    request_body = CreateMovementRequest,
    responses(
        (status = 201, description = "Movement recorded", body = MovementRecordedResponse),
        (status = 200, description = "Movement id already recorded; nothing applied", body = MovementRecordedResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Driver role required", body = ApiError)
    ),
    tag = "movements"
)]
pub async fn create_movement(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<CreateMovementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MovementRecordedResponse>), ApiError> {
    caller.require(Role::Driver)?;
    let Json(request) = payload?;

    let new = NewMovement {
        id: request.id,
        equipment_spec_id: request.equipment_spec_id,
        timestamp: request.timestamp.map(|t| t.fixed_offset()),
        driver_name: request
            .driver_name
            .or_else(|| Some(caller.username.clone())),
        notes: request.notes,
        ..NewMovement::new(
            request.customer_name,
            request.equipment_type,
            request.quantity,
            request.direction,
        )
    };
    let recorded = BalanceReconciler::new(&state.db, state.alert_policy())
        .record(new)
        .await?;

    let status = if recorded.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(recorded.into())))
}

#[utoipa::path(
    post,
    path = "/movements/{id}/verify",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Movement verified", body = movement::Model),
        (status = 403, description = "Manager role required", body = ApiError),
        (status = 404, description = "Unknown movement", body = ApiError)
    ),
    tag = "movements"
)]
pub async fn verify_movement(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<movement::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let verified = MovementRepository::new(&state.db).verify(id).await?;
    tracing::info!(movement_id = %id, verified_by = %caller.username, "movement verified");
    Ok(Json(verified))
}

/// Reads a delivery-note photo and records the movements on it
#[utoipa::path(
    post,
    path = "/upload-photo",
    security(("bearer_auth" = [])),
    params(UploadQuery),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Movements recorded from the photo", body = UploadResponse),
        (status = 400, description = "Missing or non-image file", body = ApiError),
        (status = 413, description = "File too large", body = ApiError)
    ),
    tag = "movements"
)]
pub async fn upload_photo(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    caller.require(Role::Driver)?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let media_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_default();
        if !media_type.starts_with("image/") {
            return Err(field_error("file", "File must be an image"));
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((bytes, media_type));
        break;
    }
    let Some((image, media_type)) = upload else {
        return Err(field_error("file", "Multipart field 'file' is required"));
    };
    if image.is_empty() {
        return Err(field_error("file", "File is empty"));
    }
    if image.len() > state.config.max_upload_bytes() {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            format!("File exceeds {} MB", state.config.max_upload_mb),
        ));
    }

    let driver_name = query.driver_name.or_else(|| Some(caller.username.clone()));
    let outcome = ingest_delivery_note(
        &state.db,
        state.alert_policy(),
        state.extractor.as_ref(),
        &image,
        &media_type,
        driver_name,
    )
    .await?;

    Ok(Json(UploadResponse {
        success: outcome.extraction_error.is_none(),
        source_image_ref: outcome.source_image_ref,
        movements: outcome.movements,
        error: outcome.extraction_error,
        replayed: outcome.replayed,
        note_date: outcome.extraction.as_ref().and_then(|e| e.date),
        confidence: outcome.extraction.as_ref().map(|e| e.confidence),
    }))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    let status = err.status();
    ApiError::new(
        status,
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            "PAYLOAD_TOO_LARGE"
        } else {
            "VALIDATION_FAILED"
        },
        err.body_text(),
    )
}
