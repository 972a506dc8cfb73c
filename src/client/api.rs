//! Typed access to the chat endpoints.
//!
//! [`HttpChatApi`] holds its bearer token explicitly; there is no ambient
//! credential store. Swap it for a fake in tests via the [`ChatApi`] trait.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::models::{ChatSession, Message, Role, SessionSummary, TurnTarget};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("no message at index {0}")]
    NoSuchMessage(usize),
    #[error("message at index {0} is not a user message")]
    NotUserMessage(usize),
    #[error("a reply is still being generated")]
    Busy,
    #[error("server returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Send a user turn; the server replies with the whole updated session.
    async fn send_turn(
        &self,
        target: &TurnTarget,
        content: &str,
    ) -> Result<ChatSession, ClientError>;

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ClientError>;

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, ClientError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), ClientError>;
}

pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/chat/{segment}` with the segment percent-encoded.
    fn chat_url(&self, segment: &str) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Transport(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Transport(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["chat", segment]);
        Ok(url)
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Body {
        error: Detail,
    }
    #[derive(Deserialize)]
    struct Detail {
        message: String,
    }
    serde_json::from_str::<Body>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_turn(
        &self,
        target: &TurnTarget,
        content: &str,
    ) -> Result<ChatSession, ClientError> {
        let response = self
            .client
            .post(self.chat_url(target.path_segment())?)
            .bearer_auth(&self.token)
            .json(&json!({ "role": Role::User.as_str(), "content": content }))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ClientError> {
        let response = self
            .client
            .get(self.url("/chat/user/all"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, ClientError> {
        let response = self
            .client
            .get(self.chat_url(session_id)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.chat_url(session_id)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        let _: serde_json::Value = Self::decode(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_structured_body() {
        assert_eq!(
            error_message(r#"{"error":{"code":"not_found","message":"Session not found: x"}}"#),
            "Session not found: x"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = HttpChatApi::new(reqwest::Client::new(), "http://localhost:7000/", "t");
        assert_eq!(api.url("/chat/user/all"), "http://localhost:7000/chat/user/all");
    }

    #[test]
    fn test_session_id_is_percent_encoded() {
        let api = HttpChatApi::new(reqwest::Client::new(), "http://localhost:7000", "t");
        assert_eq!(
            api.chat_url("a/b c?d").unwrap().as_str(),
            "http://localhost:7000/chat/a%2Fb%20c%3Fd"
        );
        assert_eq!(
            api.chat_url("new").unwrap().as_str(),
            "http://localhost:7000/chat/new"
        );
    }

    #[test]
    fn test_chat_url_keeps_base_path() {
        let api = HttpChatApi::new(reqwest::Client::new(), "http://localhost:7000/api/", "t");
        assert_eq!(
            api.chat_url("s1").unwrap().as_str(),
            "http://localhost:7000/api/chat/s1"
        );
    }
}
