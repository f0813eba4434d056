//! Relay wire messages

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names emitted to user rooms
pub mod events {
    pub const AUTHENTICATED: &str = "authenticated";
    pub const GENERATION_STATUS: &str = "generation:status";
    pub const GENERATION_PROGRESS: &str = "generation:progress";
    pub const GENERATION_COMPLETED: &str = "generation:completed";
    pub const GENERATION_ERROR: &str = "generation:error";
    pub const THINKING_STEP_UPDATE: &str = "thinking:step:update";
    pub const THINKING_ACTION_ADD: &str = "thinking:action:add";
    pub const SLIDE_PREVIEW_UPDATE: &str = "slide:preview:update";
    pub const TOPICS_GENERATED: &str = "topics:generated";
    pub const PRESENTATION_READY: &str = "presentation:ready";
    pub const PRESENTATION_ERROR: &str = "presentation:error";
}

/// Messages a client may send on the socket
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first message; carries a signed bearer token
    Authenticate { token: String },
    Ping,
}

/// Server-to-client event envelope. Every event is stamped with a
/// server-side ISO-8601 timestamp at emit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub data: Value,
    pub timestamp: String,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
