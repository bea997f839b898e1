//! Pipeline orchestrator: runs classify → reply → escalate in order, reports
//! the active stage to the caller, and appends the results to the session.
//!
//! The stages are synchronous string functions; the only suspension points
//! are the per-stage delays (cosmetic, so a UI can show which agent is
//! "working"). One submit is processed at a time by construction — callers
//! disable input while a run is in flight.

use super::{canned_reply, should_escalate, Intent};
use crate::session::{MessageMeta, SessionMessage, SessionStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Labeled pipeline stage, as shown in the UI status panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Intent,
    Reply,
    Escalation,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Reply => "reply",
            Self::Escalation => "escalation",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Artificial per-stage delays, giving the status panel time to show each
/// agent. Tests run with [`StageDelays::none`].
#[derive(Debug, Clone, Copy)]
pub struct StageDelays {
    pub classify: Duration,
    pub reply: Duration,
    pub escalate: Duration,
}

impl Default for StageDelays {
    fn default() -> Self {
        Self {
            classify: Duration::from_millis(1000),
            reply: Duration::from_millis(1500),
            escalate: Duration::from_millis(800),
        }
    }
}

impl StageDelays {
    pub const fn none() -> Self {
        Self {
            classify: Duration::ZERO,
            reply: Duration::ZERO,
            escalate: Duration::ZERO,
        }
    }
}

/// Fixed notice appended when a conversation is flagged for human follow-up.
pub const ESCALATION_NOTICE: &str = "This conversation has been flagged for human review due to the urgency or complexity of your request. A specialist will follow up with you shortly.";

/// Run one pipeline pass for a user message that has already been appended
/// to the session. `on_stage` is called with `Some(stage)` before each stage
/// and `None` once the last stage finishes. Returns the 2–3 assistant
/// messages, in order, after appending them to the session.
pub async fn run_pipeline(
    store: &SessionStore,
    session_id: &str,
    user_text: &str,
    delays: StageDelays,
    mut on_stage: Option<&mut (dyn FnMut(Option<AgentKind>) + Send)>,
) -> Result<Vec<SessionMessage>, PipelineError> {
    if store.get(session_id).await.is_none() {
        return Err(PipelineError::SessionNotFound(session_id.to_string()));
    }
    let mut set_stage = |stage: Option<AgentKind>| {
        if let Some(cb) = on_stage.as_mut() {
            cb(stage);
        }
    };

    set_stage(Some(AgentKind::Intent));
    tokio::time::sleep(delays.classify).await;
    let intent = Intent::classify(user_text);

    set_stage(Some(AgentKind::Reply));
    tokio::time::sleep(delays.reply).await;
    let reply = canned_reply(intent);

    set_stage(Some(AgentKind::Escalation));
    tokio::time::sleep(delays.escalate).await;
    let escalation = should_escalate(intent, user_text);

    set_stage(None);
    log::info!(
        "pipeline: session {} intent {} escalation {}",
        session_id,
        intent,
        escalation
    );

    let mut messages = Vec::with_capacity(3);
    messages.push(
        SessionMessage::assistant(format!("Intent identified: {}", intent.display_name()))
            .with_agent(AgentKind::Intent)
            .with_meta(MessageMeta {
                intent: Some(intent),
                escalation: None,
            }),
    );
    messages.push(
        SessionMessage::assistant(reply)
            .with_agent(AgentKind::Reply)
            .with_meta(MessageMeta {
                intent: Some(intent),
                escalation: Some(escalation),
            }),
    );
    if escalation {
        messages.push(
            SessionMessage::assistant(ESCALATION_NOTICE)
                .with_agent(AgentKind::Escalation)
                .with_meta(MessageMeta {
                    intent: None,
                    escalation: Some(true),
                }),
        );
    }

    for msg in &messages {
        store
            .append(session_id, msg.clone())
            .await
            .map_err(|_| PipelineError::SessionNotFound(session_id.to_string()))?;
    }

    Ok(messages)
}
