//! # Balance API Handlers

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::BalanceReconciler;
use crate::models::customer_balance::{self, BalanceStatus};
use crate::models::user::Role;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListBalancesQuery {
    /// `normal`, `over_threshold` or `negative`
    pub status: Option<BalanceStatus>,
}

#[utoipa::path(
    get,
    path = "/balances",
    security(("bearer_auth" = [])),
    params(ListBalancesQuery),
    responses(
        (status = 200, description = "All balances, optionally by status", body = [customer_balance::Model]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "balances"
)]
pub async fn list_balances(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListBalancesQuery>,
) -> Result<Json<Vec<customer_balance::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    let balances = BalanceReconciler::new(&state.db, state.alert_policy())
        .list_balances(query.status)
        .await?;
    Ok(Json(balances))
}
