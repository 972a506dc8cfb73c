//! Registered user accounts.
//!
//! Emails are unique. Both backends normalize the address with
//! [`normalize_email`] before storing or looking it up, so `Alice@X.org`
//! and `alice@x.org` name the same account.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::AccountError;
use crate::models::{monotonic_now, UserRecord};

/// Fields of an account about to be created. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an account; a taken email fails with [`AccountError::EmailTaken`].
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AccountError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AccountError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AccountError>;
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============ In-memory ============

/// Accounts keyed by normalized email. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> AccountError {
    AccountError::Storage(anyhow::anyhow!("user map lock poisoned"))
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AccountError> {
        let email = normalize_email(&user.email);
        let mut users = self.users.write().map_err(|_| poisoned())?;
        if users.contains_key(&email) {
            return Err(AccountError::EmailTaken);
        }
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: email.clone(),
            password_hash: user.password_hash,
        };
        users.insert(email, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AccountError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.get(&normalize_email(email)).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AccountError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.values().find(|u| u.id == id).cloned())
    }
}

// ============ SQLite ============

/// Accounts in the `users` table created by [`crate::migrate::apply_schema`].
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn storage(err: sqlx::Error) -> AccountError {
    AccountError::Storage(err.into())
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AccountError> {
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: normalize_email(&user.email),
            password_hash: user.password_hash,
        };

        let result = sqlx::query(
            "INSERT INTO users (id, first_name, last_name, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(monotonic_now().timestamp_micros())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AccountError::EmailTaken)
            }
            Err(e) => Err(storage(e)),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AccountError> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, password_hash FROM users WHERE email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AccountError> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, password_hash FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.as_ref().map(record_from_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use tempfile::TempDir;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: Some("Ada".into()),
            last_name: None,
            email: email.into(),
            password_hash: "$2b$04$hash".into(),
        }
    }

    async fn create_then_find(store: &dyn UserStore) {
        let created = store.create_user(new_user(" Ada@Example.org ")).await.unwrap();
        assert_eq!(created.email, "ada@example.org");

        let by_email = store.find_by_email("ADA@example.org").await.unwrap().unwrap();
        assert_eq!(by_email, created);
        let by_id = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.first_name.as_deref(), Some("Ada"));
        assert!(store.find_by_email("nobody@example.org").await.unwrap().is_none());
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    async fn duplicate_email_rejected(store: &dyn UserStore) {
        store.create_user(new_user("ada@example.org")).await.unwrap();
        assert!(matches!(
            store.create_user(new_user("ADA@example.org")).await,
            Err(AccountError::EmailTaken)
        ));
    }

    async fn sqlite_store() -> (TempDir, SqliteUserStore) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("users.sqlite"))
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        (tmp, SqliteUserStore::new(pool))
    }

    #[tokio::test]
    async fn test_memory_create_then_find() {
        create_then_find(&InMemoryUserStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_duplicate_email_rejected() {
        duplicate_email_rejected(&InMemoryUserStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_create_then_find() {
        let (_tmp, store) = sqlite_store().await;
        create_then_find(&store).await;
    }

    #[tokio::test]
    async fn test_sqlite_duplicate_email_rejected() {
        let (_tmp, store) = sqlite_store().await;
        duplicate_email_rejected(&store).await;
    }
}
