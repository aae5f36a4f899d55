use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::users;

/// User data returned from the repository. Deliberately omits the
/// password hash and the stored refresh token — no caller above this
/// layer ever sees either.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            full_name: model.full_name,
            avatar: model.avatar,
            cover_image: model.cover_image,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Registration input. `password` is the clear text; the repository
/// hashes it before anything touches the database.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create a user. The username is lowercased before storage so that
    /// channel lookups are case-insensitive.
    pub async fn create(&self, new: NewUser, config: &SecurityConfig) -> Result<User> {
        let password = new.password;
        let config = config.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            username: Set(new.username.to_lowercase()),
            email: Set(new.email),
            password_hash: Set(password_hash),
            full_name: Set(new.full_name),
            avatar: Set(new.avatar),
            cover_image: Set(new.cover_image),
            refresh_token: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    /// True if any user already holds the username or the email.
    pub async fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool> {
        let existing = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(username.to_lowercase()))
                    .add(users::Column::Email.eq(email)),
            )
            .one(&self.conn)
            .await
            .context("Failed to query user for uniqueness check")?;

        Ok(existing.is_some())
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Case-insensitive username lookup (usernames are stored lowercased).
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username.to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    /// Login lookup: the identifier may be a username or an email.
    pub async fn get_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(identifier.to_lowercase()))
                    .add(users::Column::Email.eq(identifier)),
            )
            .one(&self.conn)
            .await
            .context("Failed to query user by identifier")?;

        Ok(user.map(User::from))
    }

    /// Verify a password for a user.
    /// Note: This uses `spawn_blocking` because Argon2 verification is
    /// CPU-intensive and would block the async runtime if run directly.
    /// The record load and the verification hold no lock in between.
    pub async fn verify_password(&self, id: i32, password: &str) -> Result<bool> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            // Argon2 verification is a constant-time comparison.
            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    /// Overwrite the stored password hash with a hash of `new_password`.
    /// Callers must have re-verified the old password first.
    pub async fn update_password(
        &self,
        id: i32,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let password = new_password.to_string();
        let config = config.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Read the stored refresh-token value. Outer `None` means the user
    /// does not exist; inner `None` means no active session.
    pub async fn get_refresh_token(&self, id: i32) -> Result<Option<Option<String>>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for refresh token")?;

        Ok(user.map(|u| u.refresh_token))
    }

    /// Blind overwrite of the stored refresh-token value. Used by login
    /// (a fresh login intentionally supersedes any prior session) and by
    /// revoke (`value = None`).
    pub async fn set_refresh_token(&self, id: i32, value: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = users::Entity::update_many()
            .col_expr(
                users::Column::RefreshToken,
                sea_orm::sea_query::Expr::value(value.map(ToString::to_string)),
            )
            .col_expr(users::Column::UpdatedAt, sea_orm::sea_query::Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update refresh token")?;

        if result.rows_affected == 0 {
            anyhow::bail!("User not found: {id}");
        }

        Ok(())
    }

    /// Conditional rotation: replaces the stored refresh token only if
    /// it still equals `expected`. Returns false when another rotation,
    /// login, or revoke got there first — the caller must treat that as
    /// a revoked token, not retry.
    pub async fn swap_refresh_token(&self, id: i32, expected: &str, new: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = users::Entity::update_many()
            .col_expr(
                users::Column::RefreshToken,
                sea_orm::sea_query::Expr::value(Some(new.to_string())),
            )
            .col_expr(users::Column::UpdatedAt, sea_orm::sea_query::Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::RefreshToken.eq(expected))
            .exec(&self.conn)
            .await
            .context("Failed to rotate refresh token")?;

        Ok(result.rows_affected > 0)
    }
}

/// Hash a password using Argon2id with the configured params.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
