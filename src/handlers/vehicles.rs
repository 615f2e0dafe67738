//! # Vehicle API Handlers

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
use crate::models::user::Role;
use crate::models::vehicle::{self, VehicleStatus};
use crate::repositories::VehicleRepository;
use crate::repositories::vehicle::{NewVehicle, VehiclePatch};
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListVehiclesQuery {
    pub status: Option<VehicleStatus>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/vehicles",
    security(("bearer_auth" = [])),
    params(ListVehiclesQuery),
    responses(
        (status = 200, description = "Vehicles ordered by fleet number", body = [vehicle::Model])
    ),
    tag = "fleet"
)]
pub async fn list_vehicles(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListVehiclesQuery>,
) -> Result<Json<Vec<vehicle::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(
        VehicleRepository::new(&state.db)
            .list(query.status, query.is_active)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/vehicles/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Vehicle id")),
    responses(
        (status = 200, description = "Vehicle", body = vehicle::Model),
        (status = 404, description = "Unknown vehicle", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn get_vehicle(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<vehicle::Model>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(VehicleRepository::new(&state.db).get(id).await?))
}

#[utoipa::path(
    post,
    path = "/vehicles",
    security(("bearer_auth" = [])),
    request_body = NewVehicle,
    responses(
        (status = 201, description = "Vehicle created", body = vehicle::Model),
        (status = 409, description = "Fleet number or registration already exists", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn create_vehicle(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<NewVehicle>, JsonRejection>,
) -> Result<(StatusCode, Json<vehicle::Model>), ApiError> {
    caller.require(Role::Manager)?;
    let Json(request) = payload?;
    let created = VehicleRepository::new(&state.db).create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/vehicles/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Vehicle id")),
    request_body = VehiclePatch,
    responses(
        (status = 200, description = "Vehicle updated", body = vehicle::Model),
        (status = 404, description = "Unknown vehicle", body = ApiError),
        (status = 409, description = "Fleet number or registration already exists", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn update_vehicle(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<VehiclePatch>, JsonRejection>,
) -> Result<Json<vehicle::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let Json(patch) = payload?;
    Ok(Json(VehicleRepository::new(&state.db).update(id, patch).await?))
}

/// Deactivates a vehicle and marks it out of service
#[utoipa::path(
    delete,
    path = "/vehicles/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Vehicle id")),
    responses(
        (status = 200, description = "Vehicle deactivated", body = vehicle::Model),
        (status = 404, description = "Unknown vehicle", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn delete_vehicle(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<vehicle::Model>, ApiError> {
    caller.require(Role::Manager)?;
    Ok(Json(VehicleRepository::new(&state.db).delete(id).await?))
}
