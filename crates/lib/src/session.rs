//! Conversation sessions and message history.
//!
//! Sessions are keyed by id and hold an append-only list of messages
//! (user/assistant). Held in memory only; nothing survives a restart.

use crate::pipeline::{AgentKind, Intent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Unique session identifier (opaque string).
pub type SessionId = String;

/// Pipeline annotations on an assistant message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<bool>,
}

/// A single message in a session. Assistant messages carry the agent that
/// produced them plus intent/escalation metadata; immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MessageMeta>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            agent: None,
            meta: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            agent: None,
            meta: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_agent(mut self, agent: AgentKind) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_meta(mut self, meta: MessageMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// A session: id and ordered message history.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub messages: Vec<SessionMessage>,
}

/// In-memory store for sessions (create, get, append, remove).
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a new session with a generated id; returns the session id.
    pub async fn create(&self) -> SessionId {
        let id = format!("sess-{}", uuid::Uuid::new_v4());
        let session = Session {
            id: id.clone(),
            messages: Vec::new(),
        };
        self.inner.write().await.insert(id.clone(), session);
        id
    }

    /// Create a session with the given id if it does not exist; returns the id.
    pub async fn get_or_create(&self, id: impl Into<SessionId>) -> SessionId {
        let id = id.into();
        if self.inner.read().await.contains_key(&id) {
            return id;
        }
        let session = Session {
            id: id.clone(),
            messages: Vec::new(),
        };
        self.inner.write().await.insert(id.clone(), session);
        id
    }

    /// Return a clone of the session if it exists.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().await.get(id).cloned()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Append a message to the session; returns error if session not found.
    pub async fn append(&self, id: &str, message: SessionMessage) -> Result<(), String> {
        let mut g = self.inner.write().await;
        let session = g.get_mut(id).ok_or_else(|| "session not found".to_string())?;
        session.messages.push(message);
        Ok(())
    }

    /// Drop a session and its history.
    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_append_get_roundtrip() {
        let store = SessionStore::new();
        let id = store.create().await;
        assert!(id.starts_with("sess-"));

        store
            .append(&id, SessionMessage::user("hello"))
            .await
            .expect("append");
        store
            .append(&id, SessionMessage::assistant("hi there"))
            .await
            .expect("append");

        let session = store.get(&id).await.expect("session exists");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, "user");
        assert_eq!(session.messages[1].role, "assistant");
    }

    #[tokio::test]
    async fn append_to_missing_session_fails() {
        let store = SessionStore::new();
        let err = store
            .append("sess-nope", SessionMessage::user("hello"))
            .await
            .expect_err("missing session");
        assert_eq!(err, "session not found");
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = SessionStore::new();
        let id = store.get_or_create("sess-fixed").await;
        store
            .append(&id, SessionMessage::user("hello"))
            .await
            .expect("append");
        let same = store.get_or_create("sess-fixed").await;
        assert_eq!(same, "sess-fixed");
        assert_eq!(store.get(&same).await.expect("session").messages.len(), 1);
    }
}
