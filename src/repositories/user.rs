//! # User Repository
//!
//! Accounts and login sessions. Password hashing happens in [`crate::auth`];
//! this layer only stores hashes.

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::user::{self, Role};
use crate::models::{User, UserSession, user_session};

/// Fields for a new account; `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub phone_number: Option<String>,
    pub company: Option<String>,
}

/// Profile changes. `role` and `is_active` are honoured only when the
/// caller is allowed to set them.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UserPatch {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
}

pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<user::Model>, RepositoryError> {
        Ok(User::find()
            .order_by_asc(user::Column::Username)
            .all(self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<user::Model, RepositoryError> {
        User::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("User not found"))
    }

    pub async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<user::Model>, RepositoryError> {
        Ok(User::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db)
            .await?)
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(User::find().count(self.db).await?)
    }

    pub async fn create(&self, new: NewUser) -> Result<user::Model, RepositoryError> {
        let username = new.username.trim().to_string();
        let email = new.email.trim().to_lowercase();
        if username.is_empty() {
            return Err(RepositoryError::validation("username must not be empty"));
        }
        validate_email(&email)?;

        for (field, column, value) in [
            ("username", user::Column::Username, username.as_str()),
            ("email", user::Column::Email, email.as_str()),
        ] {
            if User::find().filter(column.eq(value)).count(self.db).await? > 0 {
                return Err(RepositoryError::duplicate(field));
            }
        }

        let now = Utc::now().fixed_offset();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            email: Set(email),
            password_hash: Set(new.password_hash),
            full_name: Set(new.full_name),
            role: Set(new.role),
            is_active: Set(true),
            phone_number: Set(new.phone_number),
            company: Set(new.company),
            last_login: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
        .map_err(|e| RepositoryError::unique_or_database(e, "username"))?;

        info!(user_id = %model.id, username = %model.username, role = model.role.as_str(), "user created");
        Ok(model)
    }

    pub async fn update(&self, id: Uuid, patch: UserPatch) -> Result<user::Model, RepositoryError> {
        let existing = self.get(id).await?;
        let mut active = existing.into_active_model();

        if let Some(email) = patch.email {
            let email = email.trim().to_lowercase();
            validate_email(&email)?;
            let taken = User::find()
                .filter(user::Column::Email.eq(email.as_str()))
                .filter(user::Column::Id.ne(id))
                .count(self.db)
                .await?;
            if taken > 0 {
                return Err(RepositoryError::duplicate("email"));
            }
            active.email = Set(email);
        }
        if let Some(v) = patch.full_name {
            active.full_name = Set(Some(v));
        }
        if let Some(v) = patch.role {
            active.role = Set(v);
        }
        if let Some(v) = patch.is_active {
            active.is_active = Set(v);
        }
        if let Some(v) = patch.phone_number {
            active.phone_number = Set(Some(v));
        }
        if let Some(v) = patch.company {
            active.company = Set(Some(v));
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        active
            .update(self.db)
            .await
            .map_err(|e| RepositoryError::unique_or_database(e, "email"))
    }

    pub async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> Result<(), RepositoryError> {
        let mut active = self.get(id).await?.into_active_model();
        active.password_hash = Set(password_hash);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(self.db).await?;
        Ok(())
    }

    /// Flips `is_active`. Deactivation also revokes every session.
    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<user::Model, RepositoryError> {
        let txn = self.db.begin().await?;
        let existing = User::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| RepositoryError::not_found("User not found"))?;

        let mut active = existing.into_active_model();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().fixed_offset());
        let model = active.update(&txn).await?;

        if !is_active {
            revoke_sessions(&txn, id).await?;
        }
        txn.commit().await?;

        info!(user_id = %id, is_active, "user activation changed");
        Ok(model)
    }

    /// Opens a session and stamps `last_login`.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        ttl: Duration,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<user_session::Model, RepositoryError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let session = user_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            expires_at: Set((now + ttl).fixed_offset()),
            is_active: Set(true),
            ip_address: Set(ip_address),
            user_agent: Set(user_agent),
            created_at: Set(now.fixed_offset()),
        }
        .insert(&txn)
        .await?;

        User::update_many()
            .col_expr(user::Column::LastLogin, Expr::value(now.fixed_offset()))
            .filter(user::Column::Id.eq(user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(session)
    }

    /// The session when it is active and unexpired.
    pub async fn live_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<user_session::Model>, RepositoryError> {
        Ok(UserSession::find_by_id(session_id)
            .filter(
                Condition::all()
                    .add(user_session::Column::UserId.eq(user_id))
                    .add(user_session::Column::IsActive.eq(true))
                    .add(user_session::Column::ExpiresAt.gt(Utc::now().fixed_offset())),
            )
            .one(self.db)
            .await?)
    }

    /// Revokes every active session of the user, returning how many.
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let revoked = revoke_sessions(self.db, user_id).await?;
        info!(user_id = %user_id, revoked, "sessions revoked");
        Ok(revoked)
    }
}

async fn revoke_sessions<C: sea_orm::ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<u64, RepositoryError> {
    let result = UserSession::update_many()
        .col_expr(user_session::Column::IsActive, Expr::value(false))
        .filter(user_session::Column::UserId.eq(user_id))
        .filter(user_session::Column::IsActive.eq(true))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

fn validate_email(email: &str) -> Result<(), RepositoryError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(RepositoryError::validation("email must be a valid address"));
    }
    Ok(())
}
