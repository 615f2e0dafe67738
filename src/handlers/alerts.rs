//! # Alert API Handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::AlertManager;
use crate::models::alert;
use crate::models::user::Role;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListAlertsQuery {
    /// Defaults to unresolved alerts only
    pub resolved: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/alerts",
    security(("bearer_auth" = [])),
    params(ListAlertsQuery),
    responses(
        (status = 200, description = "Alerts, newest first", body = [alert::Model]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListAlertsQuery>,
) -> Result<Json<Vec<alert::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(AlertManager::new(&state.db).list(query.resolved).await?))
}

/// Closes an alert. Resolving a resolved alert returns it unchanged.
#[utoipa::path(
    post,
    path = "/alerts/{id}/resolve",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Resolved alert", body = alert::Model),
        (status = 403, description = "Manager role required", body = ApiError),
        (status = 404, description = "Unknown alert", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn resolve_alert(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<alert::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let resolved = AlertManager::new(&state.db).resolve(id).await?;
    tracing::info!(alert_id = %id, resolved_by = %caller.username, "alert resolved");
    Ok(Json(resolved))
}
