//! SQLite-backed [`SessionStore`].
//!
//! Sessions live in `chat_sessions`, messages in `chat_messages` keyed by
//! `(session_id, position)`. Appends run in a transaction so a turn's
//! messages and the session's `updated_at` change together.

use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{
    derive_title, micros_to_datetime, monotonic_now, ChatSession, Message, Role, SessionSummary,
};

use super::{check_owner, require_first, stamp, SessionStore};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, ChatError> {
        let rows = sqlx::query(
            "SELECT role, content, timestamp FROM chat_messages WHERE session_id = ? ORDER BY position ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let role: String = row.get("role");
                let role: Role = role
                    .parse()
                    .map_err(|e: String| ChatError::Storage(anyhow::anyhow!(e)))?;
                Ok(Message {
                    role,
                    content: row.get("content"),
                    timestamp: micros_to_datetime(row.get("timestamp")),
                })
            })
            .collect()
    }
}

fn storage(err: sqlx::Error) -> ChatError {
    ChatError::Storage(err.into())
}

/// Owner of `session_id`, or `NotFound`.
async fn owner_of(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<String, ChatError> {
    sqlx::query_scalar::<_, String>("SELECT user_id FROM chat_sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage)?
        .ok_or_else(|| ChatError::NotFound(session_id.to_string()))
}

async fn insert_messages(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
    start: i64,
    messages: &[Message],
) -> Result<(), ChatError> {
    for (offset, message) in messages.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chat_messages (session_id, position, role, content, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(start + offset as i64)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.timestamp.timestamp_micros())
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    }
    Ok(())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session_with(
        &self,
        user_id: &str,
        messages: Vec<Message>,
    ) -> Result<ChatSession, ChatError> {
        let title = derive_title(&require_first(&messages)?.content);
        let messages = stamp(messages);
        let id = Uuid::new_v4().to_string();
        let now = monotonic_now();

        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query(
            "INSERT INTO chat_sessions (id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&title)
        .bind(now.timestamp_micros())
        .bind(now.timestamp_micros())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        insert_messages(&mut tx, &id, 0, &messages).await?;
        tx.commit().await.map_err(storage)?;

        Ok(ChatSession {
            id,
            user_id: user_id.to_string(),
            title,
            messages,
            updated_at: now,
        })
    }

    async fn append_messages(
        &self,
        user_id: &str,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<ChatSession, ChatError> {
        let messages = stamp(messages);
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let owner = owner_of(&mut tx, session_id).await?;
        check_owner(session_id, &owner, user_id)?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM chat_messages WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;

        insert_messages(&mut tx, session_id, next, &messages).await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
            .bind(monotonic_now().timestamp_micros())
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        self.get_session(user_id, session_id).await
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<ChatSession, ChatError> {
        let row = sqlx::query("SELECT id, user_id, title, updated_at FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;

        let owner: String = row.get("user_id");
        check_owner(session_id, &owner, user_id)?;

        Ok(ChatSession {
            id: row.get("id"),
            user_id: owner,
            title: row.get("title"),
            messages: self.load_messages(session_id).await?,
            updated_at: micros_to_datetime(row.get("updated_at")),
        })
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ChatError> {
        let rows = sqlx::query(
            "SELECT id, title, updated_at FROM chat_sessions WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .iter()
            .map(|row| SessionSummary {
                id: row.get("id"),
                title: row.get("title"),
                updated_at: micros_to_datetime(row.get("updated_at")),
            })
            .collect())
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), ChatError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let owner = owner_of(&mut tx, session_id).await?;
        check_owner(session_id, &owner, user_id)?;

        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }
}
