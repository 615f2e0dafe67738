//! Test utilities for database and API testing.
//!
//! Sets up in-memory SQLite databases with migrations applied, plus account
//! and token helpers for exercising the HTTP layer.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use equipment_ledger::auth::{hash_password, issue_token};
use equipment_ledger::config::AppConfig;
use equipment_ledger::extraction::{Extraction, ExtractionError, ImageExtractor};
use equipment_ledger::models::{Role, user};
use equipment_ledger::repositories::UserRepository;
use equipment_ledger::repositories::user::NewUser;
use equipment_ledger::server::AppState;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

pub const TEST_PASSWORD: &str = "Passw0rdTest";

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// The pool holds a single connection; every new connection to
/// `sqlite::memory:` would otherwise open its own empty database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        ..AppConfig::default()
    }
}

/// Extractor returning a canned reading, counting how often it was asked.
pub struct StubExtractor {
    reading: Mutex<Option<Extraction>>,
    calls: Mutex<usize>,
}

impl StubExtractor {
    pub fn returning(extraction: Extraction) -> Self {
        Self {
            reading: Mutex::new(Some(extraction)),
            calls: Mutex::new(0),
        }
    }

    /// Always fails as if no API key were configured.
    pub fn failing() -> Self {
        Self {
            reading: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ImageExtractor for StubExtractor {
    async fn extract(&self, _image: &[u8], _media_type: &str) -> Result<Extraction, ExtractionError> {
        *self.calls.lock().unwrap() += 1;
        self.reading
            .lock()
            .unwrap()
            .clone()
            .ok_or(ExtractionError::NotConfigured)
    }
}

pub fn test_state(db: DatabaseConnection, extractor: Arc<dyn ImageExtractor>) -> AppState {
    AppState::new(db, test_config(), extractor)
}

/// Creates an active account with [`TEST_PASSWORD`].
pub async fn create_user(db: &DatabaseConnection, username: &str, role: Role) -> Result<user::Model> {
    let password_hash = hash_password(&test_config(), TEST_PASSWORD.to_string())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.message))?;
    let user = UserRepository::new(db)
        .create(NewUser {
            username: username.to_string(),
            email: format!("{username}@ledger.test"),
            password_hash,
            full_name: None,
            role,
            phone_number: None,
            company: None,
        })
        .await?;
    Ok(user)
}

/// Opens a session for `user` and returns a bearer token for it.
pub async fn token_for(db: &DatabaseConnection, user: &user::Model) -> Result<String> {
    let config = test_config();
    let session = UserRepository::new(db)
        .start_session(
            user.id,
            chrono::Duration::hours(config.jwt_expiration_hours),
            None,
            None,
        )
        .await?;
    let (token, _) = issue_token(&config, user, session.id)
        .map_err(|e| anyhow::anyhow!("{}", e.message))?;
    Ok(token)
}

/// Creates a user with `role` and returns its bearer token.
pub async fn user_token(db: &DatabaseConnection, username: &str, role: Role) -> Result<String> {
    let user = create_user(db, username, role).await?;
    token_for(db, &user).await
}
