//! Error types for the chat service.
//!
//! [`ChatError`] and [`AccountError`] are the taxonomies surfaced to HTTP
//! callers. AI pipeline failures are [`RemoteServiceError`]s and never
//! reach the caller: the retrieval and generation layers absorb them into
//! the conversation.

use thiserror::Error;

/// Errors from chat session operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    BadRequest(String),

    /// No session with the given id.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session exists but belongs to another user.
    #[error("Session {0} does not belong to the requesting user")]
    Forbidden(String),

    /// Persistence failure; the only condition reported as a 500.
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ChatError::BadRequest(message.into())
    }
}

/// Errors from account registration and login.
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("All fields are required")]
    MissingFields,

    #[error("User already exists")]
    EmailTaken,

    /// Unknown email or wrong password; the two are not distinguished.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The token names a user with no account record.
    #[error("User not found")]
    UnknownUser,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Failure of an outbound call to an embedding, vector or completion service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteServiceError {
    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Connection-level failure before a response arrived.
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// The request exceeded the configured timeout.
    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    /// The response body did not have the expected shape.
    #[error("{service} returned an unexpected payload: {message}")]
    InvalidPayload {
        service: &'static str,
        message: String,
    },
}

impl RemoteServiceError {
    pub fn service(&self) -> &'static str {
        match self {
            RemoteServiceError::Http { service, .. }
            | RemoteServiceError::Transport { service, .. }
            | RemoteServiceError::Timeout { service }
            | RemoteServiceError::InvalidPayload { service, .. } => service,
        }
    }

    /// Classify a `reqwest` failure for the named service.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteServiceError::Timeout { service }
        } else if err.is_decode() {
            RemoteServiceError::InvalidPayload {
                service,
                message: err.to_string(),
            }
        } else {
            RemoteServiceError::Transport {
                service,
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_messages_name_the_service() {
        let err = RemoteServiceError::Http {
            service: "pinecone",
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.service(), "pinecone");
        assert_eq!(err.to_string(), "pinecone returned HTTP 503: unavailable");

        let err = RemoteServiceError::Timeout {
            service: "huggingface-completion",
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_account_errors_keep_public_messages() {
        assert_eq!(AccountError::EmailTaken.to_string(), "User already exists");
        assert_eq!(AccountError::MissingFields.to_string(), "All fields are required");
    }

    #[test]
    fn test_storage_wraps_anyhow() {
        let err: ChatError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: disk full");
    }
}
