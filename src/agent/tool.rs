//! Tool contract and invocation tracking
//!
//! A tool is a named, versioned, single-purpose unit of async work. Tools
//! return typed errors for expected failure modes; the engine-facing
//! failure shape is produced by the tracking wrapper, never by callers
//! matching on panics.
//!
//! `TrackedTool` is the only entry point agents use to run a tool: it
//! measures wall time, emits structured log lines per invocation, and
//! records an in-memory invocation history (ring buffer, lost on restart).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::provider::ProviderError;
use crate::store::StoreError;

/// Errors a tool can return for expected failure modes
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tool failed: {0}")]
    Failed(String),
}

/// A single-purpose unit of async work
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Perform the work. Expected failures are returned as `Err`, never
    /// panicked on.
    async fn call(&self, input: Value) -> Result<Value, ToolError>;
}

/// Record of one tool invocation
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Default cap on the per-tool invocation history
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Tracking wrapper around a tool: timing, logging, bounded history
pub struct TrackedTool {
    inner: Arc<dyn Tool>,
    history: Mutex<VecDeque<ToolInvocation>>,
    history_limit: usize,
}

impl TrackedTool {
    pub fn new(inner: Arc<dyn Tool>) -> Self {
        Self::with_history_limit(inner, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(inner: Arc<dyn Tool>, history_limit: usize) -> Self {
        Self {
            inner,
            history: Mutex::new(VecDeque::new()),
            history_limit: history_limit.max(1),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Invoke the tool with timing, logging, and history recording.
    /// This is the only entry point agents should call.
    pub async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let tool = self.inner.name().to_string();
        let version = self.inner.version().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        debug!(tool = %tool, "Tool invocation started");
        let result = self.inner.call(input).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                info!(tool = %tool, elapsed_ms = execution_time_ms, "Tool invocation completed");
            }
            Err(e) => {
                error!(tool = %tool, elapsed_ms = execution_time_ms, error = %e, "Tool invocation failed");
            }
        }

        self.record(ToolInvocation {
            tool,
            version,
            started_at,
            execution_time_ms,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }

    fn record(&self, invocation: ToolInvocation) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(invocation);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Snapshot of the invocation history, oldest first
    pub fn history(&self) -> Vec<ToolInvocation> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        async fn call(&self, input: Value) -> Result<Value, ToolError> {
            Ok(input)
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "always-fails"
        }

        async fn call(&self, _input: Value) -> Result<Value, ToolError> {
            Err(ToolError::Failed("intentional failure".to_string()))
        }
    }

    #[tokio::test]
    async fn test_tracked_tool_records_success() {
        let tool = TrackedTool::new(Arc::new(EchoTool));
        let out = tool.invoke(json!({"hello": "world"})).await.unwrap();
        assert_eq!(out, json!({"hello": "world"}));

        let history = tool.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert!(history[0].error.is_none());
        assert_eq!(history[0].tool, "echo");
    }

    #[tokio::test]
    async fn test_tracked_tool_records_failure() {
        let tool = TrackedTool::new(Arc::new(FailingTool));
        let err = tool.invoke(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("intentional failure"));

        let history = tool.history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert!(history[0].error.as_deref().unwrap().contains("intentional"));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let tool = TrackedTool::with_history_limit(Arc::new(EchoTool), 3);
        for i in 0..10 {
            tool.invoke(json!({ "i": i })).await.unwrap();
        }
        assert_eq!(tool.history().len(), 3);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let tool = TrackedTool::new(Arc::new(EchoTool));
        tool.invoke(json!({})).await.unwrap();
        assert_eq!(tool.history().len(), 1);
        tool.clear_history();
        assert!(tool.history().is_empty());
    }
}
