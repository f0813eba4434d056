//! Execution result types

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::workflow::StepStatus;

/// Provenance attached by the engine to every agent invocation
#[derive(Debug, Clone, Serialize)]
pub struct ResultMetadata {
    pub agent: String,
    pub version: String,
    pub execution_time_ms: u64,
}

/// The uniform contract every step execution produces.
///
/// `success == false` implies `error` is populated; `data` is only
/// meaningful when `success == true`. Both are guaranteed by construction.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub metadata: ResultMetadata,
}

impl AgentResult {
    pub fn ok(data: Value, metadata: ResultMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub fn failure(error: impl Into<String>, metadata: ResultMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata,
        }
    }
}

/// Terminal record of one plan execution
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub plan_id: String,
    pub plan_name: String,
    pub success: bool,
    /// Step id -> result; exactly one entry per step for any valid plan
    pub step_results: HashMap<String, AgentResult>,
    /// Step id -> terminal status
    pub step_statuses: HashMap<String, StepStatus>,
    pub errors: Vec<String>,
    pub execution_time_ms: u64,
}

impl WorkflowResult {
    /// Result of a step, looked up by step id
    pub fn step_result(&self, step_id: &str) -> Option<&AgentResult> {
        self.step_results.get(step_id)
    }
}
