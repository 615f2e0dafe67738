//! # Customer API Handlers
//!
//! Customer directory CRUD plus the per-customer balance and threshold views.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, not_found};
use crate::handlers::MessageResponse;
use crate::ledger::BalanceReconciler;
use crate::models::customer::{self, CustomerStatus};
use crate::models::customer_balance;
use crate::models::equipment_specification::EquipmentType;
use crate::models::user::Role;
use crate::repositories::CustomerRepository;
use crate::repositories::customer::{CustomerPatch, NewCustomer};
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListCustomersQuery {
    pub status: Option<CustomerStatus>,
    /// Case-insensitive match on name, contact person or city
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BalanceQuery {
    pub equipment_type: Option<EquipmentType>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ThresholdQuery {
    /// New non-negative threshold
    pub threshold: i32,
}

#[utoipa::path(
    get,
    path = "/customers",
    security(("bearer_auth" = [])),
    params(ListCustomersQuery),
    responses(
        (status = 200, description = "Customers ordered by name", body = [customer::Model]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Json<Vec<customer::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    let customers = CustomerRepository::new(&state.db)
        .list(query.status, query.search.as_deref())
        .await?;
    Ok(Json(customers))
}

#[utoipa::path(
    get,
    path = "/customers/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer", body = customer::Model),
        (status = 404, description = "Unknown customer", body = ApiError)
    ),
    tag = "customers"
)]
pub async fn get_customer(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<customer::Model>, ApiError> {
    caller.require(Role::Viewer)?;
    Ok(Json(CustomerRepository::new(&state.db).get(id).await?))
}

#[utoipa::path(
    post,
    path = "/customers",
    security(("bearer_auth" = [])),
    request_body = NewCustomer,
    responses(
        (status = 201, description = "Customer created", body = customer::Model),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Manager role required", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError)
    ),
    tag = "customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<NewCustomer>, JsonRejection>,
) -> Result<(StatusCode, Json<customer::Model>), ApiError> {
    caller.require(Role::Manager)?;
    let Json(request) = payload?;
    let created = CustomerRepository::new(&state.db).create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Partial update. A rename carries the customer's balances and alerts along.
#[utoipa::path(
    put,
    path = "/customers/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = CustomerPatch,
    responses(
        (status = 200, description = "Customer updated", body = customer::Model),
        (status = 404, description = "Unknown customer", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError)
    ),
    tag = "customers"
)]
pub async fn update_customer(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<CustomerPatch>, JsonRejection>,
) -> Result<Json<customer::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let Json(patch) = payload?;
    Ok(Json(CustomerRepository::new(&state.db).update(id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/customers/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer deleted", body = MessageResponse),
        (status = 404, description = "Unknown customer", body = ApiError),
        (status = 409, description = "Customer has balances or movements", body = ApiError)
    ),
    tag = "customers"
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(Role::Manager)?;
    CustomerRepository::new(&state.db).delete(id).await?;
    Ok(MessageResponse::new("Customer deleted successfully"))
}

/// Balances whose customer name contains the given fragment
#[utoipa::path(
    get,
    path = "/customers/{id}/balance",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Customer name or fragment, matched case-insensitively"),
        BalanceQuery
    ),
    responses(
        (status = 200, description = "Matching balances", body = [customer_balance::Model]),
        (status = 404, description = "No balance matches", body = ApiError)
    ),
    tag = "balances"
)]
pub async fn get_customer_balance(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(customer_name): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<Vec<customer_balance::Model>>, ApiError> {
    caller.require(Role::Viewer)?;
    let balances = BalanceReconciler::new(&state.db, state.alert_policy())
        .get_balance(&customer_name, query.equipment_type)
        .await?;
    if balances.is_empty() {
        return Err(not_found(format!(
            "No balances found for customer '{customer_name}'"
        )));
    }
    Ok(Json(balances))
}

/// Sets the threshold of one balance. Open alerts are left as they are.
#[utoipa::path(
    put,
    path = "/customers/{id}/thresholds/{equipment_type}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Exact customer name"),
        ("equipment_type" = EquipmentType, Path, description = "Equipment type"),
        ThresholdQuery
    ),
    responses(
        (status = 200, description = "Balance with the new threshold", body = customer_balance::Model),
        (status = 400, description = "Negative threshold", body = ApiError),
        (status = 404, description = "No balance for the pair", body = ApiError)
    ),
    tag = "balances"
)]
pub async fn set_threshold(
    State(state): State<AppState>,
    caller: AuthUser,
    Path((customer_name, equipment_type)): Path<(String, EquipmentType)>,
    Query(query): Query<ThresholdQuery>,
) -> Result<Json<customer_balance::Model>, ApiError> {
    caller.require(Role::Manager)?;
    let balance = BalanceReconciler::new(&state.db, state.alert_policy())
        .set_threshold(&customer_name, equipment_type, query.threshold)
        .await?;
    Ok(Json(balance))
}
