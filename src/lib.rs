//! # Deckflow
//!
//! An orchestration service for AI-assisted presentation generation:
//! a workflow engine drives the local creation pipeline, an external
//! render service executes the long-running generation task, and a
//! webhook/poll protocol walks the presentation through its lifecycle
//! while a WebSocket relay streams progress to the owning user.
//!
//! ## Components
//!
//! - **Engine** - validates workflow plans (DAGs of agent steps) and runs
//!   them with bounded concurrency and a uniform result contract
//! - **Agents/Tools** - named, versioned units of async work with timing,
//!   logging, and bounded invocation history
//! - **Store** - SQLite-backed source of truth for presentations, render
//!   tasks, slides, and conversations
//! - **Protocol** - webhook ingestion and polling fallback feeding one
//!   idempotent apply path (the terminal transition is claimed exactly once)
//! - **Relay** - per-user rooms fanning events out to open sockets, joined
//!   only after token verification
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use deckflow::{AgentOrchestrator, BriefAgent, WorkflowPlan, WorkflowStep};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut orchestrator = AgentOrchestrator::new();
//!     orchestrator.register(Arc::new(BriefAgent));
//!
//!     let plan = WorkflowPlan::new("demo").with_step(
//!         WorkflowStep::new("b", "brief", "brief")
//!             .with_input(json!({"prompt": "Quarterly review deck"})),
//!     );
//!
//!     let result = orchestrator.execute(plan).await?;
//!     println!("success={}", result.success);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod auth;
pub mod config;
pub mod engine;
pub mod provider;
pub mod relay;
pub mod server;
pub mod store;
pub mod tasks;
pub mod workflow;

// Re-export main types
pub use agent::{
    Agent, AgentError, BriefAgent, DispatchAgent, OutlineAgent, Tool, ToolError, ToolInvocation,
    TrackedTool,
};
pub use config::{Config, ConfigError, DatabaseConfig};
pub use engine::{
    event_channel, AgentOrchestrator, AgentResult, EventReceiver, EventSender, PlanError,
    WorkflowEvent, WorkflowResult,
};
pub use provider::{
    CreateTaskRequest, ProviderClient, ProviderConfig, ProviderError, TaskHandle,
    TaskStatusResponse,
};
pub use relay::{Relay, RelayConfig, RelayError, RelayHandle};
pub use server::{router, spawn_event_bridge, start_server, AppState, ServerError};
pub use store::{
    ConversationExport, NewSlide, Presentation, PresentationStatus, RenderTask, Slide, Store,
    StoreError, TaskStatus,
};
pub use tasks::{
    apply_task_event, parse_slides, progress_for, spawn_poller, ApplyOutcome, PollerConfig,
    ProtocolError, StopReason, TaskEvent,
};
pub use workflow::{StepStatus, WorkflowPlan, WorkflowStep};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{Agent, AgentError, Tool, ToolError, TrackedTool};
    pub use crate::engine::{AgentOrchestrator, AgentResult, PlanError, WorkflowResult};
    pub use crate::relay::{Relay, RelayConfig, RelayHandle};
    pub use crate::store::{PresentationStatus, Store, TaskStatus};
    pub use crate::tasks::{ApplyOutcome, StopReason, TaskEvent};
    pub use crate::workflow::{StepStatus, WorkflowPlan, WorkflowStep};
}
