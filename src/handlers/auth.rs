//! # Authentication API Handlers
//!
//! Registration, login/logout, self-service profile and admin user management.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthUser, hash_password, issue_token, validate_password, verify_password};
use crate::error::{ApiError, forbidden, unauthorized};
use crate::handlers::MessageResponse;
use crate::models::user::{self, Role};
use crate::repositories::UserRepository;
use crate::repositories::user::{NewUser, UserPatch};
use crate::server::AppState;

/// Public view of an account
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            full_name: model.full_name,
            role: model.role,
            is_active: model.is_active,
            phone_number: model.phone_number,
            company: model.company,
            last_login: model.last_login.map(|t| t.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Creates an account. Self-registered accounts always start as viewers.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Username or email taken", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(request) = payload?;
    validate_password(&request.password)?;
    let password_hash = hash_password(&state.config, request.password).await?;

    let created = UserRepository::new(&state.db)
        .create(NewUser {
            username: request.username,
            email: request.email,
            password_hash,
            full_name: request.full_name,
            role: Role::Viewer,
            phone_number: request.phone_number,
            company: request.company,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Exchanges credentials for a bearer token and opens a session
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 401, description = "Bad credentials or inactive account", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let users = UserRepository::new(&state.db);
    let Some(account) = users.find_by_username(request.username.trim()).await? else {
        return Err(unauthorized(Some("Incorrect username or password")));
    };
    if !verify_password(request.password, account.password_hash.clone()).await? {
        tracing::info!(username = %account.username, "failed login");
        return Err(unauthorized(Some("Incorrect username or password")));
    }
    if !account.is_active {
        return Err(unauthorized(Some("Account is inactive")));
    }

    let session = users
        .start_session(
            account.id,
            Duration::hours(state.config.jwt_expiration_hours),
            client_ip(&headers),
            user_agent(&headers),
        )
        .await?;
    let (access_token, expires_in) = issue_token(&state.config, &account, session.id)?;

    tracing::info!(username = %account.username, session_id = %session.id, "user logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in,
        user: account.into(),
    }))
}

/// Revokes every session of the caller
#[utoipa::path(
    post,
    path = "/auth/logout",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sessions revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let revoked = UserRepository::new(&state.db)
        .revoke_all_sessions(caller.user_id)
        .await?;
    Ok(MessageResponse::new(format!(
        "Logged out successfully. {revoked} sessions revoked."
    )))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current account", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let account = UserRepository::new(&state.db).get(caller.user_id).await?;
    Ok(Json(account.into()))
}

/// Updates the caller's profile. Only admins may change their own role or
/// activation flag.
#[utoipa::path(
    put,
    path = "/auth/me",
    security(("bearer_auth" = [])),
    request_body = UserPatch,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 403, description = "Role change not allowed", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn update_me(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(mut patch) = payload?;
    if !caller.is_admin() {
        if patch.role.is_some_and(|role| role != caller.role) {
            return Err(forbidden(Some("Cannot change your own role")));
        }
        patch.role = None;
        patch.is_active = None;
    }
    let updated = UserRepository::new(&state.db)
        .update(caller.user_id, patch)
        .await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password incorrect or new password too weak", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    let users = UserRepository::new(&state.db);
    let account = users.get(caller.user_id).await?;
    if !verify_password(request.current_password, account.password_hash).await? {
        return Err(crate::error::field_error(
            "current_password",
            "Current password is incorrect",
        ));
    }
    validate_password(&request.new_password)?;
    let password_hash = hash_password(&state.config, request.new_password).await?;
    users.set_password_hash(caller.user_id, password_hash).await?;

    tracing::info!(username = %caller.username, "password changed");
    Ok(MessageResponse::new("Password changed successfully"))
}

#[utoipa::path(
    get,
    path = "/auth/users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All accounts", body = [UserResponse]),
        (status = 403, description = "Admin only", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn list_users(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    caller.require(Role::Admin)?;
    let users = UserRepository::new(&state.db).list().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/auth/users/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserPatch,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 403, description = "Admin only", body = ApiError),
        (status = 404, description = "Unknown user", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(patch) = payload?;
    caller.require(Role::Admin)?;
    let updated = UserRepository::new(&state.db).update(id, patch).await?;
    Ok(Json(updated.into()))
}

/// Deactivates an account and revokes its sessions
#[utoipa::path(
    delete,
    path = "/auth/users/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Account deactivated", body = MessageResponse),
        (status = 400, description = "Cannot deactivate yourself", body = ApiError),
        (status = 403, description = "Admin only", body = ApiError),
        (status = 404, description = "Unknown user", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(Role::Admin)?;
    if id == caller.user_id {
        return Err(crate::error::field_error(
            "id",
            "Cannot deactivate your own account",
        ));
    }
    UserRepository::new(&state.db).set_active(id, false).await?;
    Ok(MessageResponse::new("User deactivated successfully"))
}

#[utoipa::path(
    post,
    path = "/auth/users/{id}/activate",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Account activated", body = MessageResponse),
        (status = 403, description = "Admin only", body = ApiError),
        (status = 404, description = "Unknown user", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn activate_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(Role::Admin)?;
    UserRepository::new(&state.db).set_active(id, true).await?;
    Ok(MessageResponse::new("User activated successfully"))
}
