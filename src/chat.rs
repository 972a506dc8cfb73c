//! Chat turn orchestration.
//!
//! A turn takes a user message addressed to a new or existing session,
//! retrieves grounding context, generates the assistant reply, and
//! persists both messages in one store operation. The caller gets the
//! whole updated session back from a single call.
//!
//! ```text
//! validate → load session → retrieve context → generate → persist (user + assistant) → session
//! ```
//!
//! Turns against the same session are serialized: at most one is in
//! flight per session id at any time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument};

use crate::completion::Completer;
use crate::embedding::Embedder;
use crate::error::ChatError;
use crate::generation::generate_response;
use crate::models::{ChatSession, Message, Role, SessionSummary, TurnTarget};
use crate::retrieval::ContextRetriever;
use crate::store::SessionStore;
use crate::vector_store::VectorIndex;

/// The remote services a turn depends on.
#[derive(Clone)]
pub struct RagPipeline {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub completer: Arc<dyn Completer>,
    pub top_k: usize,
}

impl RagPipeline {
    /// Retrieve context for `query` and produce the assistant reply.
    ///
    /// Always yields text: failures become a refusal or an apology.
    pub async fn answer(&self, query: &str) -> String {
        let retriever = ContextRetriever::new(self.embedder.as_ref(), self.index.as_ref(), self.top_k);
        let context = retriever.get_context(query).await;
        generate_response(self.completer.as_ref(), query, &context).await
    }
}

/// Per-session turn locks.
#[derive(Default)]
struct SessionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Held for the duration of a turn; releases the map entry when last out.
struct TurnGuard {
    session_id: String,
    map: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> TurnGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        TurnGuard {
            session_id: session_id.to_string(),
            map: self.inner.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = map.get(&self.session_id) {
            // Only the map itself still references the lock: nobody is waiting.
            if Arc::strong_count(lock) == 1 {
                map.remove(&self.session_id);
            }
        }
    }
}

/// Session operations and chat turns for authenticated users.
pub struct ChatService {
    store: Arc<dyn SessionStore>,
    pipeline: RagPipeline,
    locks: SessionLocks,
}

impl ChatService {
    pub fn new(store: Arc<dyn SessionStore>, pipeline: RagPipeline) -> Self {
        Self {
            store,
            pipeline,
            locks: SessionLocks::default(),
        }
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Run one chat turn and return the updated session.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if `role` is not `"user"` or `content` is blank.
    /// - `NotFound` / `Forbidden` for an unknown or foreign session.
    /// - `Storage` if persisting fails.
    ///
    /// Retrieval and generation failures are not errors; they shape the
    /// assistant's reply instead.
    #[instrument(skip(self, user_id, content), fields(user = %user_id))]
    pub async fn send_turn(
        &self,
        user_id: &str,
        target: TurnTarget,
        role: &str,
        content: &str,
    ) -> Result<ChatSession, ChatError> {
        validate_turn(role, content)?;

        match target {
            TurnTarget::New => {
                let reply = self.pipeline.answer(content).await;
                let session = self
                    .store
                    .create_session_with(
                        user_id,
                        vec![Message::user(content), Message::assistant(reply)],
                    )
                    .await?;
                info!(session = %session.id, "created chat session");
                Ok(session)
            }
            TurnTarget::Continue(session_id) => {
                let _turn = self.locks.acquire(&session_id).await;

                // Fail fast on unknown or foreign sessions before any remote call.
                self.store.get_session(user_id, &session_id).await?;

                let reply = self.pipeline.answer(content).await;
                let session = self
                    .store
                    .append_messages(
                        user_id,
                        &session_id,
                        vec![Message::user(content), Message::assistant(reply)],
                    )
                    .await?;
                info!(session = %session.id, messages = session.messages.len(), "continued chat session");
                Ok(session)
            }
        }
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ChatError> {
        self.store.list_sessions(user_id).await
    }

    pub async fn get_messages(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        self.store.get_messages(user_id, session_id).await
    }

    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), ChatError> {
        let _turn = self.locks.acquire(session_id).await;
        self.store.delete_session(user_id, session_id).await?;
        info!(session = %session_id, "deleted chat session");
        Ok(())
    }
}

fn validate_turn(role: &str, content: &str) -> Result<(), ChatError> {
    if role.trim().is_empty() || content.trim().is_empty() {
        return Err(ChatError::bad_request(
            "Role, content and sessions are required",
        ));
    }
    match role.parse::<Role>() {
        Ok(Role::User) => Ok(()),
        Ok(Role::Assistant) => Err(ChatError::bad_request(
            "only user messages can be sent to a chat session",
        )),
        Err(e) => Err(ChatError::bad_request(e)),
    }
}
