//! In-memory [`SessionStore`] for tests and ephemeral runs.
//!
//! Sessions live in a `HashMap` behind `std::sync::RwLock`. Nothing
//! survives a restart.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{derive_title, monotonic_now, ChatSession, Message, SessionSummary};

use super::{check_owner, require_first, stamp, SessionStore};

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> ChatError {
    ChatError::Storage(anyhow::anyhow!("session map lock poisoned"))
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session_with(
        &self,
        user_id: &str,
        messages: Vec<Message>,
    ) -> Result<ChatSession, ChatError> {
        let title = derive_title(&require_first(&messages)?.content);
        let messages = stamp(messages);
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title,
            messages,
            updated_at: monotonic_now(),
        };
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn append_messages(
        &self,
        user_id: &str,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<ChatSession, ChatError> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;
        check_owner(session_id, &session.user_id, user_id)?;

        session.messages.extend(stamp(messages));
        session.updated_at = monotonic_now();
        Ok(session.clone())
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<ChatSession, ChatError> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;
        check_owner(session_id, &session.user_id, user_id)?;
        Ok(session.clone())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ChatError> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(SessionSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), ChatError> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let owner = sessions
            .get(session_id)
            .map(|s| s.user_id.clone())
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;
        check_owner(session_id, &owner, user_id)?;
        sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn test_create_and_read() {
        contract::create_and_read(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_long_title_truncated() {
        contract::long_title_truncated(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        contract::append_preserves_order(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_list_sorted_most_recent_first() {
        contract::list_sorted_most_recent_first(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        contract::unknown_session_not_found(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_other_user_forbidden() {
        contract::other_user_forbidden(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let store = InMemorySessionStore::new();
        contract::delete_then_not_found(&store).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_seed_rejected() {
        contract::empty_seed_rejected(&InMemorySessionStore::new()).await;
    }
}
