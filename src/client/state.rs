//! The client-side chat state machine.
//!
//! [`ChatClient`] owns the local view of one user's chats. Sending and
//! regenerating are split into a synchronous `begin_*` step that updates
//! the UI optimistically and a `complete_turn` step that applies the
//! server's answer. Between the two the user may switch sessions; every
//! switch bumps a generation counter, and a response whose generation no
//! longer matches is discarded instead of landing in the wrong thread.
//!
//! Persisted roles are `user`/`assistant`; the UI speaks of `Bot`, and the
//! translation happens only in [`UiRole`]'s conversions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::api::{ChatApi, ClientError};
use super::events::{EventBus, SyncEvent};
use crate::models::{ChatSession, Message, Role, SessionSummary, TurnTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiRole {
    User,
    Bot,
}

impl From<Role> for UiRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => UiRole::User,
            Role::Assistant => UiRole::Bot,
        }
    }
}

impl From<UiRole> for Role {
    fn from(role: UiRole) -> Self {
        match role {
            UiRole::User => Role::User,
            UiRole::Bot => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiMessage {
    pub role: UiRole,
    pub text: String,
    /// Placeholder shown while the reply is being generated.
    pub typing: bool,
    pub edited: bool,
}

impl UiMessage {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: UiRole::User,
            text: text.into(),
            typing: false,
            edited: false,
        }
    }

    fn typing() -> Self {
        Self {
            role: UiRole::Bot,
            text: String::new(),
            typing: true,
            edited: false,
        }
    }
}

impl From<&Message> for UiMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.into(),
            text: message.content.clone(),
            typing: false,
            edited: false,
        }
    }
}

/// One row of the session list.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub summary: SessionSummary,
    /// Latest message text, when known locally.
    pub preview: Option<String>,
    pub checked: bool,
}

impl SessionEntry {
    fn new(summary: SessionSummary, preview: Option<String>) -> Self {
        Self {
            summary,
            preview,
            checked: false,
        }
    }

    /// Case-insensitive match against title and preview. `needle` must be lowercase.
    fn matches(&self, needle: &str) -> bool {
        self.summary.title.to_lowercase().contains(needle)
            || self
                .preview
                .as_deref()
                .is_some_and(|p| p.to_lowercase().contains(needle))
    }

    pub fn time_label(&self, now: DateTime<Utc>) -> String {
        relative_time(now, self.summary.updated_at)
    }
}

/// Human label for the age of `then`: "just now", "5 minutes ago", "2 days ago", ...
pub fn relative_time(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let (n, unit) = match secs {
        s if s < 60 => return "just now".to_string(),
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 7 * 86_400 => (s / 86_400, "day"),
        s if s < 30 * 86_400 => (s / (7 * 86_400), "week"),
        s if s < 365 * 86_400 => (s / (30 * 86_400), "month"),
        s => (s / (365 * 86_400), "year"),
    };
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PendingKind {
    Send,
    /// Regenerating an existing reply; `previous` is restored on failure.
    Regenerate { previous: String },
}

/// A turn whose request is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTurn {
    id: u64,
    target: TurnTarget,
    content: String,
    generation: u64,
    slot: usize,
    kind: PendingKind,
}

impl PendingTurn {
    pub fn target(&self) -> &TurnTarget {
        &self.target
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply replaced its placeholder in the active thread.
    Applied,
    /// The user had moved on; only the session list was updated.
    Discarded,
}

pub struct ChatClient {
    api: Arc<dyn ChatApi>,
    bus: EventBus,
    sessions: Vec<SessionEntry>,
    active: Option<String>,
    messages: Vec<UiMessage>,
    filter: String,
    narrow: bool,
    list_open: bool,
    generation: u64,
    next_turn_id: u64,
    in_flight: Option<u64>,
}

impl ChatClient {
    pub fn new(api: Arc<dyn ChatApi>, bus: EventBus) -> Self {
        Self {
            api,
            bus,
            sessions: Vec::new(),
            active: None,
            messages: Vec::new(),
            filter: String::new(),
            narrow: false,
            list_open: true,
            generation: 0,
            next_turn_id: 0,
            in_flight: None,
        }
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn messages(&self) -> &[UiMessage] {
        &self.messages
    }

    pub fn sessions(&self) -> &[SessionEntry] {
        &self.sessions
    }

    /// No active session: the welcome screen is showing.
    pub fn is_welcome(&self) -> bool {
        self.active.is_none() && self.messages.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    // ---- session list ----

    /// Fetch the session list and, if nothing is open yet, open the most recent.
    pub async fn load(&mut self) -> Result<(), ClientError> {
        let mut summaries = self.api.list_sessions().await?;
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut previous: HashMap<String, SessionEntry> = self
            .sessions
            .drain(..)
            .map(|e| (e.summary.id.clone(), e))
            .collect();
        self.sessions = summaries
            .into_iter()
            .map(|summary| match previous.remove(&summary.id) {
                Some(old) => SessionEntry {
                    summary,
                    preview: old.preview,
                    checked: old.checked,
                },
                None => SessionEntry::new(summary, None),
            })
            .collect();

        if self.active.is_none() {
            if let Some(id) = self.sessions.first().map(|e| e.summary.id.clone()) {
                self.open_session(&id).await?;
            }
        }
        Ok(())
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.to_string();
    }

    /// Sessions matching the current filter, in list order.
    pub fn visible_sessions(&self) -> Vec<&SessionEntry> {
        let needle = self.filter.trim().to_lowercase();
        self.sessions
            .iter()
            .filter(|e| needle.is_empty() || e.matches(&needle))
            .collect()
    }

    pub fn toggle_checked(&mut self, session_id: &str) {
        if let Some(entry) = self.entry_mut(session_id) {
            entry.checked = !entry.checked;
        }
    }

    /// Delete every checked session. Returns how many were deleted.
    ///
    /// Stops at the first server error; sessions deleted before it stay deleted.
    pub async fn delete_selected(&mut self) -> Result<usize, ClientError> {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.checked)
            .map(|e| e.summary.id.clone())
            .collect();

        let mut deleted = 0;
        for id in ids {
            self.api.delete_session(&id).await?;
            self.forget_session(&id);
            self.bus.publish(SyncEvent::ChatDeleted { session_id: id });
            deleted += 1;
        }
        Ok(deleted)
    }

    // ---- viewport ----

    pub fn set_narrow_viewport(&mut self, narrow: bool) {
        self.narrow = narrow;
        if !narrow {
            self.list_open = true;
        }
    }

    pub fn is_list_open(&self) -> bool {
        self.list_open
    }

    pub fn toggle_list(&mut self) {
        self.list_open = !self.list_open;
    }

    // ---- active session ----

    /// Back to the welcome screen. No server session exists until the
    /// first message is sent.
    pub fn new_chat(&mut self) {
        self.reset_to_welcome();
        self.bus.publish(SyncEvent::NewChat);
    }

    pub async fn open_session(&mut self, session_id: &str) -> Result<(), ClientError> {
        self.switch_to(Some(session_id.to_string()));

        let messages = match self.api.get_messages(session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                self.reset_to_welcome();
                return Err(e);
            }
        };
        self.messages = messages.iter().map(UiMessage::from).collect();
        if let Some(last) = messages.last() {
            let preview = last.content.clone();
            if let Some(entry) = self.entry_mut(session_id) {
                entry.preview = Some(preview);
            }
        }

        if self.narrow {
            self.list_open = false;
        }
        self.bus.publish(SyncEvent::ChatOpened {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    // ---- turns ----

    /// Append the user's message and a typing placeholder.
    pub fn begin_send(&mut self, content: &str) -> Result<PendingTurn, ClientError> {
        if content.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if self.is_busy() {
            return Err(ClientError::Busy);
        }
        self.messages.push(UiMessage::user(content));
        self.messages.push(UiMessage::typing());
        let slot = self.messages.len() - 1;
        Ok(self.pending(content, slot, PendingKind::Send))
    }

    /// Rewrite user message `index`. If a reply follows it, that reply
    /// becomes a placeholder and the returned turn regenerates it.
    pub fn begin_edit(
        &mut self,
        index: usize,
        text: &str,
    ) -> Result<Option<PendingTurn>, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let message = self
            .messages
            .get(index)
            .ok_or(ClientError::NoSuchMessage(index))?;
        if message.role != UiRole::User {
            return Err(ClientError::NotUserMessage(index));
        }
        let has_reply = matches!(
            self.messages.get(index + 1),
            Some(m) if m.role == UiRole::Bot && !m.typing
        );
        if has_reply && self.is_busy() {
            return Err(ClientError::Busy);
        }

        let message = &mut self.messages[index];
        message.text = text.to_string();
        message.edited = true;

        if !has_reply {
            return Ok(None);
        }
        let reply = &mut self.messages[index + 1];
        let previous = std::mem::take(&mut reply.text);
        reply.typing = true;
        Ok(Some(self.pending(
            text,
            index + 1,
            PendingKind::Regenerate { previous },
        )))
    }

    /// Apply the server's answer to a pending turn.
    ///
    /// Failures restore the thread (placeholder removed, or the previous
    /// reply put back) and are returned as errors. Answers for a thread
    /// the user has since left only update the session list.
    pub fn complete_turn(
        &mut self,
        pending: PendingTurn,
        result: Result<ChatSession, ClientError>,
    ) -> Result<TurnOutcome, ClientError> {
        if self.in_flight == Some(pending.id) {
            self.in_flight = None;
        }
        let current = pending.generation == self.generation;

        let session = match result {
            Ok(session) => session,
            Err(e) if current => {
                self.rollback(&pending);
                return Err(e);
            }
            Err(_) => return Ok(TurnOutcome::Discarded),
        };

        let reply = session
            .messages
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.record_activity(&pending.target, SessionSummary::from(&session), &reply);

        if !current {
            return Ok(TurnOutcome::Discarded);
        }
        if pending.target == TurnTarget::New {
            self.active = Some(session.id.clone());
        }
        if let Some(slot) = self.messages.get_mut(pending.slot) {
            slot.text = reply;
            slot.typing = false;
        }
        Ok(TurnOutcome::Applied)
    }

    /// Send a message and wait for the reply.
    pub async fn send(&mut self, content: &str) -> Result<TurnOutcome, ClientError> {
        let pending = self.begin_send(content)?;
        let result = self.api.send_turn(&pending.target, &pending.content).await;
        self.complete_turn(pending, result)
    }

    /// Edit user message `index` and regenerate the reply right after it.
    pub async fn edit_and_regenerate(
        &mut self,
        index: usize,
        text: &str,
    ) -> Result<Option<TurnOutcome>, ClientError> {
        let Some(pending) = self.begin_edit(index, text)? else {
            return Ok(None);
        };
        let result = self.api.send_turn(&pending.target, &pending.content).await;
        self.complete_turn(pending, result).map(Some)
    }

    // ---- events from other views ----

    /// Fold a change announced by another view into the local list.
    pub fn apply_event(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::ChatCreated(summary) => {
                if self.entry_mut(&summary.id).is_none() {
                    self.sessions
                        .insert(0, SessionEntry::new(summary.clone(), None));
                }
            }
            SyncEvent::ChatUpdated(summary) => self.bump(summary.clone(), None),
            SyncEvent::ChatDeleted { session_id } => self.forget_session(session_id),
            SyncEvent::ChatOpened { .. } | SyncEvent::NewChat => {}
        }
    }

    // ---- internals ----

    fn pending(&mut self, content: &str, slot: usize, kind: PendingKind) -> PendingTurn {
        self.next_turn_id += 1;
        self.in_flight = Some(self.next_turn_id);
        PendingTurn {
            id: self.next_turn_id,
            target: match &self.active {
                Some(id) => TurnTarget::Continue(id.clone()),
                None => TurnTarget::New,
            },
            content: content.to_string(),
            generation: self.generation,
            slot,
            kind,
        }
    }

    fn rollback(&mut self, pending: &PendingTurn) {
        match &pending.kind {
            PendingKind::Send => {
                if self.messages.get(pending.slot).is_some_and(|m| m.typing) {
                    self.messages.remove(pending.slot);
                }
            }
            PendingKind::Regenerate { previous } => {
                if let Some(slot) = self.messages.get_mut(pending.slot) {
                    slot.text = previous.clone();
                    slot.typing = false;
                }
            }
        }
    }

    fn record_activity(&mut self, target: &TurnTarget, summary: SessionSummary, reply: &str) {
        let preview = Some(reply.to_string()).filter(|r| !r.is_empty());
        match target {
            TurnTarget::New => {
                self.sessions
                    .insert(0, SessionEntry::new(summary.clone(), preview));
                self.bus.publish(SyncEvent::ChatCreated(summary));
            }
            TurnTarget::Continue(_) => {
                self.bump(summary.clone(), preview);
                self.bus.publish(SyncEvent::ChatUpdated(summary));
            }
        }
    }

    /// Move a session to the top of the list with fresh summary data.
    fn bump(&mut self, summary: SessionSummary, preview: Option<String>) {
        let mut entry = match self.sessions.iter().position(|e| e.summary.id == summary.id) {
            Some(pos) => self.sessions.remove(pos),
            None => SessionEntry::new(summary.clone(), None),
        };
        entry.summary = summary;
        if preview.is_some() {
            entry.preview = preview;
        }
        self.sessions.insert(0, entry);
    }

    fn forget_session(&mut self, session_id: &str) {
        self.sessions.retain(|e| e.summary.id != session_id);
        if self.active.as_deref() == Some(session_id) {
            self.reset_to_welcome();
        }
    }

    fn switch_to(&mut self, active: Option<String>) {
        self.generation += 1;
        self.in_flight = None;
        self.active = active;
        self.messages.clear();
    }

    fn reset_to_welcome(&mut self) {
        self.switch_to(None);
    }

    fn entry_mut(&mut self, session_id: &str) -> Option<&mut SessionEntry> {
        self.sessions
            .iter_mut()
            .find(|e| e.summary.id == session_id)
    }
}
