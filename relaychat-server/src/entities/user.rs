use std::future::Future;

use argon2::Argon2;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use tracing::warn;
use uuid::Uuid;

use crate::entities::{SqliteStore, UserRecord, decode_ts, encode_ts};

pub trait UserStore: Send + Sync + 'static {
    /// Fails with a UNIQUE violation when the email is taken.
    fn create_user(&self, user: UserRecord) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;

    fn create_auth_session(
        &self,
        token: &str,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// The user a live bearer token belongs to.
    fn find_user_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;

    /// Returns `true` if the token existed.
    fn delete_auth_session(&self, token: &str) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

type UserRow = (String, String, String, String);

fn user_from_row((id, email, password_hash, created_at): UserRow) -> UserRecord {
    UserRecord {
        id,
        email,
        password_hash,
        created_at: decode_ts(&created_at, "users.created_at"),
    }
}

impl UserStore for SqliteStore {
    async fn create_user(&self, user: UserRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(encode_ts(user.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, created_at \
             FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO auth_sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(token)
            .bind(user_id)
            .bind(encode_ts(created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT u.id, u.email, u.password_hash, u.created_at \
             FROM auth_sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn delete_auth_session(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Passwords ─────────────────────────────────────────────────────────────────

impl UserRecord {
    /// New user with a fresh id. The password is stored as an Argon2id PHC
    /// string carrying its own random salt.
    pub fn new(email: &str, password: &str) -> Result<Self, password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)?
            .to_string();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            password_hash,
            created_at: Utc::now(),
        })
    }

    pub fn verify_password(&self, password: &str) -> bool {
        let parsed = match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(user_id = %self.id, error = %e, "stored password hash is unreadable");
                return false;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
