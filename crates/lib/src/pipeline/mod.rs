//! Rule-based support pipeline: intent classification, canned reply,
//! escalation detection, and the orchestrator that runs them in order.
//!
//! Each stage is a pure function over the user's text; the orchestrator adds
//! the stage sequencing, artificial delays, and session bookkeeping.

mod escalate;
mod intent;
mod orchestrator;
mod reply;

pub use escalate::should_escalate;
pub use intent::Intent;
pub use orchestrator::{run_pipeline, AgentKind, PipelineError, StageDelays, ESCALATION_NOTICE};
pub use reply::canned_reply;
