//! Client-side synchronization of chat sessions.
//!
//! Mirrors what a chat front end keeps in memory: the user's session
//! list, the active session and its messages, plus the transient UI
//! bits (typing placeholders, edit marks, checkbox selection, search
//! filter). Everything here talks to the server through [`ChatApi`] and
//! announces changes on an [`EventBus`] so independent views stay
//! consistent without polling.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`api`] | `ChatApi` trait and its HTTP implementation |
//! | [`events`] | Typed pub/sub of session changes |
//! | [`state`] | The `ChatClient` state machine |

pub mod api;
pub mod events;
pub mod state;

pub use api::{ChatApi, ClientError, HttpChatApi};
pub use events::{EventBus, SyncEvent};
pub use state::{ChatClient, PendingTurn, SessionEntry, TurnOutcome, UiMessage, UiRole};
