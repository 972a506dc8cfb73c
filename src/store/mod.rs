//! Chat session persistence.
//!
//! The [`SessionStore`] trait defines the operations the orchestration and
//! HTTP layers need, with two backends:
//!
//! - [`sqlite::SqliteSessionStore`] — durable storage on the service database.
//! - [`memory::InMemorySessionStore`] — process-local, for tests and ephemeral runs.
//!
//! Every operation is scoped to the requesting user. Reading, appending to
//! or deleting another user's session fails with [`ChatError::Forbidden`];
//! an unknown id fails with [`ChatError::NotFound`].
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_session`](SessionStore::create_session) | Start a session from its first message |
//! | [`create_session_with`](SessionStore::create_session_with) | Start a session seeded with several messages |
//! | [`append_messages`](SessionStore::append_messages) | Append a batch of messages atomically |
//! | [`get_session`](SessionStore::get_session) | Full session including messages |
//! | [`list_sessions`](SessionStore::list_sessions) | Summaries, most recently updated first |
//! | [`get_messages`](SessionStore::get_messages) | Ordered message list |
//! | [`delete_session`](SessionStore::delete_session) | Remove a session and its messages |
//!
//! Registered accounts live behind the separate [`users::UserStore`] trait.

pub mod memory;
pub mod sqlite;
pub mod users;

use async_trait::async_trait;

use crate::error::ChatError;
use crate::models::{monotonic_now, ChatSession, Message, SessionSummary};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session owned by `user_id` holding `messages` in order.
    ///
    /// The title is derived from the first message. Message timestamps and
    /// `updated_at` are assigned by the store.
    async fn create_session_with(
        &self,
        user_id: &str,
        messages: Vec<Message>,
    ) -> Result<ChatSession, ChatError>;

    /// Append `messages` to the end of a session and refresh `updated_at`.
    async fn append_messages(
        &self,
        user_id: &str,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<ChatSession, ChatError>;

    async fn get_session(&self, user_id: &str, session_id: &str)
        -> Result<ChatSession, ChatError>;

    /// Summaries of the user's sessions, most recently updated first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ChatError>;

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), ChatError>;

    async fn create_session(
        &self,
        user_id: &str,
        first_message: Message,
    ) -> Result<ChatSession, ChatError> {
        self.create_session_with(user_id, vec![first_message]).await
    }

    async fn append_message(
        &self,
        user_id: &str,
        session_id: &str,
        message: Message,
    ) -> Result<ChatSession, ChatError> {
        self.append_messages(user_id, session_id, vec![message])
            .await
    }

    async fn get_messages(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        Ok(self.get_session(user_id, session_id).await?.messages)
    }
}

/// Reject an empty seed list before touching storage.
fn require_first(messages: &[Message]) -> Result<&Message, ChatError> {
    messages
        .first()
        .ok_or_else(|| ChatError::bad_request("a session needs at least one message"))
}

/// Give each message a fresh, strictly increasing persistence timestamp.
fn stamp(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|m| Message {
            timestamp: monotonic_now(),
            ..m
        })
        .collect()
}

/// Ownership precondition shared by both backends.
fn check_owner(session_id: &str, owner: &str, requester: &str) -> Result<(), ChatError> {
    if owner == requester {
        Ok(())
    } else {
        Err(ChatError::Forbidden(session_id.to_string()))
    }
}
