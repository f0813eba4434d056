//! Agent contract and built-in agents
//!
//! An agent executes one workflow step. Implementations return `Err` for
//! expected failure modes; the engine wraps every invocation with timing
//! and converts the outcome into the uniform `AgentResult` shape, so an
//! agent never constructs result envelopes itself.
//!
//! - `tool` - the finer-grained `Tool` contract and its tracking wrapper
//! - `builtin` - agents used by the presentation pipeline

use async_trait::async_trait;
use serde_json::Value;

pub mod builtin;
pub mod tool;

pub use builtin::{BriefAgent, DispatchAgent, OutlineAgent};
pub use tool::{Tool, ToolError, ToolInvocation, TrackedTool};

/// Errors an agent can return for expected failure modes
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Agent failed: {0}")]
    Failed(String),
}

/// A named, versioned unit that executes one workflow step
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry name; plans reference agents by this name
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Execute one step. The input is the step's input object with each
    /// dependency's output injected under the dependency step's name.
    async fn execute(&self, input: &Value) -> Result<Value, AgentError>;
}

/// Read a required string field from an agent input object
pub(crate) fn require_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, AgentError> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AgentError::InvalidInput(format!("missing required field '{}'", field)))
}
