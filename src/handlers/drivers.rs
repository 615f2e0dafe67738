//! # Driver API Handlers

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
use crate::models::driver::{self, DriverStatus};
use crate::models::user::Role;
use crate::repositories::DriverRepository;
use crate::repositories::driver::{DriverPatch, NewDriver};
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDriversQuery {
    pub status: Option<DriverStatus>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/drivers",
    security(("bearer_auth" = [])),
    params(ListDriversQuery),
    responses(
        (status = 200, description = "Drivers ordered by name", body = [driver::Model])
    ),
    tag = "fleet"
)]
pub async fn list_drivers(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListDriversQuery>,
) -> Result<Json<Vec<driver::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(
        DriverRepository::new(&state.db)
            .list(query.status, query.is_active)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/drivers/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Driver id")),
    responses(
        (status = 200, description = "Driver", body = driver::Model),
        (status = 404, description = "Unknown driver", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn get_driver(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<driver::Model>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(DriverRepository::new(&state.db).get(id).await?))
}

#[utoipa::path(
    post,
    path = "/drivers",
    security(("bearer_auth" = [])),
    request_body = NewDriver,
    responses(
        (status = 201, description = "Driver created", body = driver::Model),
        (status = 409, description = "Employee id already exists", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn create_driver(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<NewDriver>, JsonRejection>,
) -> Result<(StatusCode, Json<driver::Model>), ApiError> {
    caller.require(Role::Manager)?;
    let Json(request) = payload?;
    let created = DriverRepository::new(&state.db).create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/drivers/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Driver id")),
    request_body = DriverPatch,
    responses(
        (status = 200, description = "Driver updated", body = driver::Model),
        (status = 404, description = "Unknown driver", body = ApiError),
        (status = 409, description = "Employee id already exists", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn update_driver(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<DriverPatch>, JsonRejection>,
) -> Result<Json<driver::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let Json(patch) = payload?;
    Ok(Json(DriverRepository::new(&state.db).update(id, patch).await?))
}

/// Deactivates a driver
#[utoipa::path(
    delete,
    path = "/drivers/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Driver id")),
    responses(
        (status = 200, description = "Driver deactivated", body = driver::Model),
        (status = 404, description = "Unknown driver", body = ApiError)
    ),
    tag = "fleet"
)]
pub async fn delete_driver(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<driver::Model>, ApiError> {
    caller.require(Role::Manager)?;
    Ok(Json(DriverRepository::new(&state.db).delete(id).await?))
}
