//! Engine progress events
//!
//! The orchestrator emits progress events on an async channel so that a
//! relay bridge can forward them to the owning user's sockets. Emission is
//! non-blocking and lossy: if nobody is listening, events are dropped.

use serde::Serialize;

/// Progress events emitted during one plan execution
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StepStarted {
        plan_id: String,
        plan_name: String,
        user_id: Option<String>,
        step_id: String,
        step_name: String,
    },
    StepFinished {
        plan_id: String,
        plan_name: String,
        user_id: Option<String>,
        step_id: String,
        step_name: String,
        success: bool,
        error: Option<String>,
    },
    WorkflowFinished {
        plan_id: String,
        plan_name: String,
        user_id: Option<String>,
        success: bool,
        execution_time_ms: u64,
    },
}

impl WorkflowEvent {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::StepStarted { user_id, .. }
            | WorkflowEvent::StepFinished { user_id, .. }
            | WorkflowEvent::WorkflowFinished { user_id, .. } => user_id.as_deref(),
        }
    }
}

pub type EventSender = async_channel::Sender<WorkflowEvent>;
pub type EventReceiver = async_channel::Receiver<WorkflowEvent>;

/// Bounded channel for engine progress events
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    async_channel::bounded(capacity.max(1))
}
