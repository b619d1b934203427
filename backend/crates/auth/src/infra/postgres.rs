//! PostgreSQL Store Implementations

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::entity::{
    blacklisted_token::BlacklistedToken,
    refresh_token::RefreshTokenEntry,
    user::{User, UserPatch},
};
use crate::domain::repository::{TokenBlacklistStore, UserStore};
use crate::domain::value_object::{Email, UserId, UserRole};
use crate::error::{AuthError, AuthResult};

macro_rules! user_columns {
    () => {
        r#"
            id,
            email,
            password_hash,
            first_name,
            last_name,
            role,
            is_active,
            password_reset_token,
            password_reset_expires,
            created_at,
            updated_at
        "#
    };
}

/// PostgreSQL-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach refresh entries to already-loaded users, in insertion order.
    async fn with_tokens(&self, rows: Vec<UserRow>) -> AuthResult<Vec<User>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let tokens = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT user_id, token, expires_at
            FROM refresh_tokens
            WHERE user_id = ANY($1)
            ORDER BY seq
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut users = rows
            .into_iter()
            .map(UserRow::into_user)
            .collect::<AuthResult<Vec<_>>>()?;
        for token in tokens {
            if let Some(user) = users.iter_mut().find(|u| *u.id.as_uuid() == token.user_id) {
                user.refresh_tokens
                    .push(RefreshTokenEntry::new(token.token, token.expires_at));
            }
        }
        Ok(users)
    }

    async fn with_tokens_one(&self, row: Option<UserRow>) -> AuthResult<Option<User>> {
        match row {
            Some(row) => Ok(self.with_tokens(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn lock_user(
        tx: &mut Transaction<'_, Postgres>,
        id: &UserId,
    ) -> AuthResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT",
            user_columns!(),
            "FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

// ============================================================================
// User Store Implementation
// ============================================================================

impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT",
            user_columns!(),
            "FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        self.with_tokens_one(row).await
    }

    async fn find_by_id(&self, id: &UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT",
            user_columns!(),
            "FROM users WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        self.with_tokens_one(row).await
    }

    async fn find_by_refresh_token(&self, token: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT",
            user_columns!(),
            "FROM users WHERE id = (SELECT user_id FROM refresh_tokens WHERE token = $1)"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        self.with_tokens_one(row).await
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id,
                email,
                password_hash,
                first_name,
                last_name,
                role,
                is_active,
                password_reset_token,
                password_reset_expires,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.email.as_str())
        .bind(user.password_hash.as_phc_string())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.id())
        .bind(user.is_active)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::EmailTaken
            } else {
                AuthError::Database(e)
            }
        })?;

        for entry in &user.refresh_tokens {
            sqlx::query("INSERT INTO refresh_tokens (user_id, token, expires_at) VALUES ($1, $2, $3)")
                .bind(user.id.as_uuid())
                .bind(&entry.token)
                .bind(entry.expires)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_fields(&self, id: &UserId, patch: UserPatch) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                role = COALESCE($4, role),
                is_active = COALESCE($5, is_active),
                password_hash = COALESCE($6, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING"#,
            user_columns!()
        ))
        .bind(id.as_uuid())
        .bind(patch.first_name)
        .bind(patch.last_name)
        .bind(patch.role.map(|r| r.id()))
        .bind(patch.is_active)
        .bind(patch.password_hash.as_ref().map(|h| h.as_phc_string()))
        .fetch_optional(&self.pool)
        .await?;

        self.with_tokens_one(row).await
    }

    async fn append_refresh_token(&self, id: &UserId, entry: RefreshTokenEntry) -> AuthResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token, expires_at)
            SELECT id, $2, $3 FROM users WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&entry.token)
        .bind(entry.expires)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn replace_refresh_token(
        &self,
        id: &UserId,
        old_token: &str,
        new_entry: RefreshTokenEntry,
    ) -> AuthResult<bool> {
        // Same row (and so the same `seq`), so the entry keeps its slot.
        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens SET
                token = $3,
                expires_at = $4
            WHERE user_id = $1 AND token = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(old_token)
        .bind(&new_entry.token)
        .bind(new_entry.expires)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn remove_refresh_token(&self, id: &UserId, token: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND token = $2")
            .bind(id.as_uuid())
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_refresh_tokens(&self, id: &UserId) -> AuthResult<()> {
        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!(user_id = %id, tokens_deleted = deleted, "Cleared refresh tokens");
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: &UserId,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> AuthResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE users SET
                password_reset_token = $2,
                password_reset_expires = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(token_hash)
        .bind(expires)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn find_by_reset_token_hash(&self, token_hash: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT",
            user_columns!(),
            "FROM users WHERE password_reset_token = $1 AND password_reset_expires > NOW()"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        self.with_tokens_one(row).await
    }

    async fn complete_password_reset(
        &self,
        id: &UserId,
        token_hash: &str,
        new_hash: &HashedPassword,
    ) -> AuthResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE users SET
                password_hash = $3,
                password_reset_token = NULL,
                password_reset_expires = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND password_reset_token = $2
              AND password_reset_expires > NOW()
            "#,
        )
        .bind(id.as_uuid())
        .bind(token_hash)
        .bind(new_hash.as_phc_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn delete(&self, id: &UserId) -> AuthResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = Self::lock_user(&mut tx, id).await? else {
            return Ok(None);
        };
        // refresh_tokens rows go with it (ON DELETE CASCADE)
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(row.into_user()?))
    }

    async fn list(&self, offset: u64, limit: u64) -> AuthResult<(Vec<User>, u64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT",
            user_columns!(),
            "FROM users ORDER BY created_at, id OFFSET $1 LIMIT $2"
        ))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let users = self.with_tokens(rows).await?;
        Ok((users, u64::try_from(total).unwrap_or_default()))
    }
}

// ============================================================================
// Token Blacklist Store Implementation
// ============================================================================

#[derive(Clone)]
pub struct PgTokenBlacklistStore {
    pool: PgPool,
}

impl PgTokenBlacklistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Remove lapsed entries
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(tokens_deleted = deleted, "Purged expired blacklist entries");

        Ok(deleted)
    }
}

impl TokenBlacklistStore for PgTokenBlacklistStore {
    async fn insert(&self, entry: &BlacklistedToken) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO token_blacklist (token, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&entry.token)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists(&self, token: &str) -> AuthResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE token = $1 AND expires_at > NOW())",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: i16,
    is_active: bool,
    password_reset_token: Option<String>,
    password_reset_expires: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        let password_hash = HashedPassword::from_phc_string(self.password_hash)
            .map_err(|e| AuthError::Internal(format!("Invalid password hash: {}", e)))?;
        let role = UserRole::from_id(self.role)
            .ok_or_else(|| AuthError::Internal(format!("Invalid role id: {}", self.role)))?;

        Ok(User {
            id: UserId::from_uuid(self.id),
            email: Email::from_db(self.email),
            password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            role,
            is_active: self.is_active,
            refresh_tokens: Vec::new(),
            password_reset_token: self.password_reset_token,
            password_reset_expires: self.password_reset_expires,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    user_id: Uuid,
    token: String,
    expires_at: DateTime<Utc>,
}
