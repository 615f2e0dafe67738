//! Bootstrap administrator

use anyhow::{Result, anyhow};
use sea_orm::DatabaseConnection;

use crate::auth::{hash_password, validate_password};
use crate::config::AppConfig;
use crate::models::Role;
use crate::repositories::UserRepository;
use crate::repositories::user::NewUser;

/// Creates the configured admin account unless the username is taken.
/// Returns `true` when an account was created.
pub async fn seed_bootstrap_admin(db: &DatabaseConnection, config: &AppConfig) -> Result<bool> {
    let (Some(username), Some(email), Some(password)) = (
        config.bootstrap_admin_username.as_deref(),
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(false);
    };

    let users = UserRepository::new(db);
    if users.find_by_username(username).await?.is_some() {
        tracing::debug!(%username, "bootstrap admin already exists");
        return Ok(false);
    }

    validate_password(password)
        .map_err(|e| anyhow!("bootstrap admin password rejected: {}", e.message))?;
    let password_hash = hash_password(config, password.to_string())
        .await
        .map_err(|e| anyhow!("failed to hash bootstrap admin password: {}", e.message))?;

    users
        .create(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            full_name: Some("Administrator".to_string()),
            role: Role::Admin,
            phone_number: None,
            company: None,
        })
        .await?;

    tracing::info!(%username, "bootstrap admin created");
    Ok(true)
}
