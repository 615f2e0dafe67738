//! # Equipment Specification API Handlers

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::equipment_specification::{self, EquipmentType};
use crate::models::user::Role;
use crate::repositories::EquipmentSpecificationRepository;
use crate::repositories::equipment_specification::{
    EquipmentSpecificationPatch, NewEquipmentSpecification,
};
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListSpecificationsQuery {
    pub equipment_type: Option<EquipmentType>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/equipment-specifications",
    security(("bearer_auth" = [])),
    params(ListSpecificationsQuery),
    responses(
        (status = 200, description = "Specifications", body = [equipment_specification::Model]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "equipment"
)]
pub async fn list_specifications(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListSpecificationsQuery>,
) -> Result<Json<Vec<equipment_specification::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    let specs = EquipmentSpecificationRepository::new(&state.db)
        .list(query.equipment_type, query.is_active)
        .await?;
    Ok(Json(specs))
}

#[utoipa::path(
    get,
    path = "/equipment-specifications/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Specification id")),
    responses(
        (status = 200, description = "Specification", body = equipment_specification::Model),
        (status = 404, description = "Unknown specification", body = ApiError)
    ),
    tag = "equipment"
)]
pub async fn get_specification(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<equipment_specification::Model>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(
        EquipmentSpecificationRepository::new(&state.db)
            .get(id)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/equipment-specifications",
    security(("bearer_auth" = [])),
    request_body = NewEquipmentSpecification,
    responses(
        (status = 201, description = "Specification created", body = equipment_specification::Model),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Manager role required", body = ApiError)
    ),
    tag = "equipment"
)]
pub async fn create_specification(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<NewEquipmentSpecification>, JsonRejection>,
) -> Result<(StatusCode, Json<equipment_specification::Model>), ApiError> {
    caller.require(Role::Manager)?;
    let Json(request) = payload?;
    let created = EquipmentSpecificationRepository::new(&state.db)
        .create(request)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/equipment-specifications/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Specification id")),
    request_body = EquipmentSpecificationPatch,
    responses(
        (status = 200, description = "Specification updated", body = equipment_specification::Model),
        (status = 404, description = "Unknown specification", body = ApiError)
    ),
    tag = "equipment"
)]
pub async fn update_specification(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<EquipmentSpecificationPatch>, JsonRejection>,
) -> Result<Json<equipment_specification::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let Json(patch) = payload?;
    Ok(Json(
        EquipmentSpecificationRepository::new(&state.db)
            .update(id, patch)
            .await?,
    ))
}

/// Deactivates a specification; refused while recorded movements reference it
#[utoipa::path(
    delete,
    path = "/equipment-specifications/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Specification id")),
    responses(
        (status = 200, description = "Specification deactivated", body = equipment_specification::Model),
        (status = 404, description = "Unknown specification", body = ApiError),
        (status = 409, description = "Movements reference the specification", body = ApiError)
    ),
    tag = "equipment"
)]
pub async fn delete_specification(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<equipment_specification::Model>, ApiError> {
    caller.require(Role::Manager)?;
    Ok(Json(
        EquipmentSpecificationRepository::new(&state.db)
            .delete(id)
            .await?,
    ))
}
