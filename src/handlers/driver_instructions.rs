//! # Driver Instruction API Handlers
//!
//! Stored instructions, the derived collection list and the status
//! transitions drivers report from the road.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, forbidden};
use crate::handlers::MessageResponse;
use crate::models::driver_instruction::{self, InstructionPriority, InstructionStatus};
use crate::models::user::Role;
use crate::repositories::DriverInstructionRepository;
use crate::repositories::driver_instruction::{
    AutoInstruction, DriverInstructionPatch, InstructionFilter, NewDriverInstruction,
};
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListInstructionsQuery {
    /// Assigned driver username
    pub driver_name: Option<String>,
    pub status: Option<InstructionStatus>,
    pub priority: Option<InstructionPriority>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AutoGeneratedQuery {
    pub driver_name: Option<String>,
    pub status: Option<InstructionStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    pub status: InstructionStatus,
}

#[utoipa::path(
    get,
    path = "/driver-instructions",
    security(("bearer_auth" = [])),
    params(ListInstructionsQuery),
    responses(
        (status = 200, description = "Instructions, newest first", body = [driver_instruction::Model])
    ),
    tag = "instructions"
)]
pub async fn list_instructions(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListInstructionsQuery>,
) -> Result<Json<Vec<driver_instruction::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    let filter = InstructionFilter {
        driver_name: query.driver_name,
        status: query.status,
        priority: query.priority,
        is_active: query.is_active,
    };
    Ok(Json(
        DriverInstructionRepository::new(&state.db)
            .list(&filter)
            .await?,
    ))
}

/// Collection tasks derived from over-threshold balances
#[utoipa::path(
    get,
    path = "/driver-instructions/auto-generated",
    security(("bearer_auth" = [])),
    params(AutoGeneratedQuery),
    responses(
        (status = 200, description = "Derived collection tasks", body = [AutoInstruction])
    ),
    tag = "instructions"
)]
pub async fn auto_generated_instructions(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<AutoGeneratedQuery>,
) -> Result<Json<Vec<AutoInstruction>>, ApiError> {
    caller.require(Role::Viewer)?;
    let tasks = DriverInstructionRepository::new(&state.db)
        .auto_generated(
            &state.alert_policy(),
            query.driver_name.as_deref(),
            query.status,
        )
        .await?;
    Ok(Json(tasks))
}

#[utoipa::path(
    get,
    path = "/driver-instructions/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Instruction id")),
    responses(
        (status = 200, description = "Instruction", body = driver_instruction::Model),
        (status = 404, description = "Unknown instruction", body = ApiError)
    ),
    tag = "instructions"
)]
pub async fn get_instruction(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<driver_instruction::Model>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(
        DriverInstructionRepository::new(&state.db).get(id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/driver-instructions",
    security(("bearer_auth" = [])),
    request_body = NewDriverInstruction,
    responses(
        (status = 201, description = "Instruction created", body = driver_instruction::Model),
        (status = 403, description = "Manager role required", body = ApiError)
    ),
    tag = "instructions"
)]
pub async fn create_instruction(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<NewDriverInstruction>, JsonRejection>,
) -> Result<(StatusCode, Json<driver_instruction::Model>), ApiError> {
    caller.require(Role::Manager)?;
    let Json(request) = payload?;
    let created = DriverInstructionRepository::new(&state.db)
        .create(request, &caller.username)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/driver-instructions/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Instruction id")),
    request_body = DriverInstructionPatch,
    responses(
        (status = 200, description = "Instruction updated", body = driver_instruction::Model),
        (status = 404, description = "Unknown instruction", body = ApiError)
    ),
    tag = "instructions"
)]
pub async fn update_instruction(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<DriverInstructionPatch>, JsonRejection>,
) -> Result<Json<driver_instruction::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let Json(patch) = payload?;
    Ok(Json(
        DriverInstructionRepository::new(&state.db)
            .update(id, patch)
            .await?,
    ))
}

/// Moves an instruction through its lifecycle. Drivers may only update
/// instructions assigned to them.
#[utoipa::path(
    patch,
    path = "/driver-instructions/{id}/status",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Instruction id")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status updated", body = driver_instruction::Model),
        (status = 403, description = "Not assigned to the calling driver", body = ApiError),
        (status = 404, description = "Unknown instruction", body = ApiError)
    ),
    tag = "instructions"
)]
pub async fn update_instruction_status(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<driver_instruction::Model>, ApiError> {
    caller.require(Role::Driver)?;
    let Json(request) = payload?;
    let repo = DriverInstructionRepository::new(&state.db);

    if caller.role == Role::Driver {
        let instruction = repo.get(id).await?;
        if instruction.assigned_driver.as_deref() != Some(caller.username.as_str()) {
            return Err(forbidden(Some(
                "Drivers can only update their own instructions",
            )));
        }
    }

    Ok(Json(repo.update_status(id, request.status).await?))
}

#[utoipa::path(
    delete,
    path = "/driver-instructions/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Instruction id")),
    responses(
        (status = 200, description = "Instruction deleted", body = MessageResponse),
        (status = 404, description = "Unknown instruction", body = ApiError)
    ),
    tag = "instructions"
)]
pub async fn delete_instruction(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(Role::Manager)?;
    DriverInstructionRepository::new(&state.db)
        .delete(id)
        .await?;
    Ok(MessageResponse::new("Driver instruction deleted successfully"))
}
