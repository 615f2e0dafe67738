//! # Authentication and Authorization
//!
//! Bearer JWTs bound to a login session, bcrypt password hashes and the
//! role checks applied by handlers.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, RepositoryError, field_error, forbidden, unauthorized};
use crate::models::user::{self, Role};
use crate::repositories::UserRepository;
use crate::server::AppState;

/// Signing secret used by the `local` and `test` profiles when none is configured.
const DEVELOPMENT_JWT_SECRET: &str = "equipment-ledger-development-secret-not-for-production";

const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt ignores input past 72 bytes.
const MAX_PASSWORD_LEN: usize = 72;
const TEST_BCRYPT_COST: u32 = 4;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Username
    pub sub: String,
    pub user_id: Uuid,
    pub role: Role,
    /// Session the token was issued for
    pub sid: Uuid,
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated caller, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub session_id: Uuid,
}

impl AuthUser {
    /// Fails with 403 unless the caller's role is at least `required`.
    pub fn require(&self, required: Role) -> Result<(), ApiError> {
        if self.role.has_permission(required) {
            Ok(())
        } else {
            tracing::debug!(
                username = %self.username,
                role = self.role.as_str(),
                required = required.as_str(),
                "role check failed"
            );
            Err(forbidden(Some(&format!(
                "Requires {} role or higher",
                required.as_str()
            ))))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn signing_secret(config: &AppConfig) -> &str {
    if config.jwt_secret.is_empty() && config.is_development() {
        DEVELOPMENT_JWT_SECRET
    } else {
        &config.jwt_secret
    }
}

/// Issues a token for `user` bound to `session_id`. Returns the token and its
/// lifetime in seconds.
pub fn issue_token(
    config: &AppConfig,
    user: &user::Model,
    session_id: Uuid,
) -> Result<(String, i64), ApiError> {
    let now = Utc::now();
    let ttl = Duration::hours(config.jwt_expiration_hours);
    let claims = Claims {
        sub: user.username.clone(),
        user_id: user.id,
        role: user.role,
        sid: session_id,
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_secret(config).as_bytes()),
    )
    .map_err(|e| ApiError::from(anyhow::Error::from(e)))?;
    Ok((token, ttl.num_seconds()))
}

/// Verifies signature and expiry.
pub fn decode_token(config: &AppConfig, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_secret(config).as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        unauthorized(Some("Invalid or expired token"))
    })
}

/// 8 to 72 characters with at least one upper-case letter, one lower-case
/// letter and one digit.
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.len();
    if len < MIN_PASSWORD_LEN {
        return Err(field_error(
            "password",
            "Password must be at least 8 characters long",
        ));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(field_error(
            "password",
            "Password must be at most 72 bytes long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(field_error(
            "password",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(field_error(
            "password",
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(field_error(
            "password",
            "Password must contain at least one digit",
        ));
    }
    Ok(())
}

/// Hashes on the blocking pool.
pub async fn hash_password(config: &AppConfig, password: String) -> Result<String, ApiError> {
    let cost = if config.profile == "test" {
        TEST_BCRYPT_COST
    } else {
        bcrypt::DEFAULT_COST
    };
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(|e| ApiError::from(anyhow::Error::from(e)))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(anyhow::Error::from)?;
    // A malformed stored hash is a failed login, not a server error.
    Ok(verified.unwrap_or(false))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

/// A vanished account is a 401; storage failures keep their own status.
fn account_lookup_error(error: RepositoryError) -> ApiError {
    match error {
        RepositoryError::NotFound(_) => unauthorized(Some("User no longer exists")),
        other => other.into(),
    }
}

/// Validates the bearer token, its session and the account, then exposes the
/// caller as [`AuthUser`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?;
    let claims = decode_token(&state.config, token)?;

    let users = UserRepository::new(&state.db);
    if users
        .live_session(claims.sid, claims.user_id)
        .await?
        .is_none()
    {
        return Err(unauthorized(Some("Session expired or revoked")));
    }

    let account = users
        .get(claims.user_id)
        .await
        .map_err(account_lookup_error)?;
    if !account.is_active {
        return Err(unauthorized(Some("Account is inactive")));
    }

    tracing::debug!(username = %account.username, role = account.role.as_str(), "authenticated request");
    request.extensions_mut().insert(AuthUser {
        user_id: account.id,
        username: account.username,
        // Roles are read fresh so admin changes apply to live tokens.
        role: account.role,
        session_id: claims.sid,
    });

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            profile: "test".into(),
            ..Default::default()
        }
    }

    fn account(role: Role) -> user::Model {
        let now = Utc::now().fixed_offset();
        user::Model {
            id: Uuid::new_v4(),
            username: "dispatcher".into(),
            email: "dispatch@example.com".into(),
            password_hash: String::new(),
            full_name: None,
            role,
            is_active: true,
            phone_number: None,
            company: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn missing_account_is_unauthorized_but_outage_is_not() {
        let gone = account_lookup_error(RepositoryError::not_found("User not found"));
        assert_eq!(gone.status, axum::http::StatusCode::UNAUTHORIZED);

        let outage = account_lookup_error(RepositoryError::Database(sea_orm::DbErr::Conn(
            sea_orm::RuntimeErr::Internal("connection refused".into()),
        )));
        assert_eq!(outage.status, axum::http::StatusCode::SERVICE_UNAVAILABLE);

        let broken = account_lookup_error(RepositoryError::Database(sea_orm::DbErr::Custom(
            "bad row".into(),
        )));
        assert_eq!(broken.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn token_round_trip_keeps_claims() {
        let cfg = config();
        let user = account(Role::Manager);
        let sid = Uuid::new_v4();
        let (token, expires_in) = issue_token(&cfg, &user, sid).unwrap();
        assert_eq!(expires_in, 24 * 3600);

        let claims = decode_token(&cfg, &token).unwrap();
        assert_eq!(claims.sub, "dispatcher");
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.sid, sid);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let cfg = config();
        let (token, _) = issue_token(&cfg, &account(Role::Admin), Uuid::new_v4()).unwrap();
        let other = AppConfig {
            jwt_secret: "a-completely-different-secret-of-sufficient-length".into(),
            ..config()
        };
        let err = decode_token(&other, &token).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = AppConfig {
            jwt_expiration_hours: -1,
            ..config()
        };
        let (token, _) = issue_token(&cfg, &account(Role::Viewer), Uuid::new_v4()).unwrap();
        assert!(decode_token(&config(), &token).is_err());
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("Pallets2024").is_ok());
        assert!(validate_password("Short1A").is_err());
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("ALLUPPERCASE1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
        assert!(validate_password(&format!("Aa1{}", "x".repeat(70))).is_err());
    }

    #[test]
    fn role_requirement() {
        let caller = AuthUser {
            user_id: Uuid::new_v4(),
            username: "d".into(),
            role: Role::Driver,
            session_id: Uuid::new_v4(),
        };
        assert!(caller.require(Role::Viewer).is_ok());
        assert!(caller.require(Role::Driver).is_ok());
        let err = caller.require(Role::Manager).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn bearer_scheme_is_required() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());
        headers.insert(AUTHORIZATION, "Basic Zm9vOmJhcg==".parse().unwrap());
        assert!(bearer_token(&headers).is_err());
        headers.insert(AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[tokio::test]
    async fn hash_and_verify() {
        let cfg = config();
        let hash = hash_password(&cfg, "Pallets2024".into()).await.unwrap();
        assert!(verify_password("Pallets2024".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("pallets2024".into(), hash).await.unwrap());
        assert!(!verify_password("x".into(), "not-a-hash".into()).await.unwrap());
    }
}
