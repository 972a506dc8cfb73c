//! Core data models for chat sessions and user accounts.
//!
//! These types represent the sessions and messages that flow between the
//! HTTP layer, the orchestration service, and the session store. Field
//! names serialize in the camelCase shape the browser client expects
//! (`_id`, `userId`, `updatedAt`).

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters taken from the first message for a title.
pub const TITLE_MAX_CHARS: usize = 20;

/// Path sentinel the browser uses to ask for a brand-new session.
pub const NEW_SESSION_SENTINEL: &str = "new";

/// Author of a persisted message.
///
/// Only `user` and `assistant` are ever stored. The browser's `bot`
/// spelling is accepted on input and mapped to [`Role::Assistant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "bot")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" | "bot" => Ok(Role::Assistant),
            other => Err(format!("unknown role: '{}'", other)),
        }
    }
}

/// A single message within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Assigned when the message is persisted.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: monotonic_now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: monotonic_now(),
        }
    }
}

/// A persisted conversation thread owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

/// List projection of a session: id, title and last activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&ChatSession> for SessionSummary {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            updated_at: session.updated_at,
        }
    }
}

/// Which session a chat turn is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTarget {
    /// Lazily create a session seeded with this turn.
    New,
    /// Append to an existing session.
    Continue(String),
}

impl TurnTarget {
    /// Parse the `:sessionId` path segment, where `"new"` selects [`TurnTarget::New`].
    pub fn from_path(segment: &str) -> Option<Self> {
        let segment = segment.trim();
        if segment.is_empty() {
            None
        } else if segment == NEW_SESSION_SENTINEL {
            Some(TurnTarget::New)
        } else {
            Some(TurnTarget::Continue(segment.to_string()))
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            TurnTarget::New => None,
            TurnTarget::Continue(id) => Some(id),
        }
    }

    /// The path segment a client sends for this target.
    pub fn path_segment(&self) -> &str {
        match self {
            TurnTarget::New => NEW_SESSION_SENTINEL,
            TurnTarget::Continue(id) => id,
        }
    }
}

/// A registered account as stored, including the bcrypt hash.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Trimmed and lowercased; unique across accounts.
    pub email: String,
    pub password_hash: String,
}

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Derive a session title from the first user message.
pub fn derive_title(content: &str) -> String {
    content.chars().take(TITLE_MAX_CHARS).collect()
}

static LAST_TICK_MICROS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock time that never repeats or goes backwards within the process.
///
/// Session ordering is by `updated_at`, so two touches in the same
/// microsecond must still produce distinct, increasing values.
pub fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_TICK_MICROS.load(Ordering::Relaxed);
    loop {
        let next = if now > prev { now } else { prev + 1 };
        match LAST_TICK_MICROS.compare_exchange_weak(
            prev,
            next,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return micros_to_datetime(next),
            Err(actual) => prev = actual,
        }
    }
}

pub(crate) fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_truncates_to_twenty_chars() {
        assert_eq!(derive_title("Hello"), "Hello");
        assert_eq!(
            derive_title("What are the symptoms of type 2 diabetes?"),
            "What are the symptom"
        );
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        let title = derive_title("ÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉÉ");
        assert_eq!(title.chars().count(), 20);
    }

    #[test]
    fn test_role_accepts_bot_alias() {
        let role: Role = serde_json::from_str("\"bot\"").unwrap();
        assert_eq!(role, Role::Assistant);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"assistant\"");
        assert_eq!("bot".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_turn_target_from_path() {
        assert_eq!(TurnTarget::from_path("new"), Some(TurnTarget::New));
        assert_eq!(
            TurnTarget::from_path("abc"),
            Some(TurnTarget::Continue("abc".into()))
        );
        assert_eq!(TurnTarget::from_path("  "), None);
        assert_eq!(TurnTarget::New.path_segment(), "new");
        assert_eq!(TurnTarget::Continue("abc".into()).path_segment(), "abc");
    }

    #[test]
    fn test_monotonic_now_strictly_increases() {
        let mut last = monotonic_now();
        for _ in 0..1000 {
            let next = monotonic_now();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_session_serializes_with_client_field_names() {
        let session = ChatSession {
            id: "s1".into(),
            user_id: "u1".into(),
            title: "Hello".into(),
            messages: vec![Message::user("Hello")],
            updated_at: monotonic_now(),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["_id"], "s1");
        assert_eq!(json["userId"], "u1");
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
