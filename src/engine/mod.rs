//! Workflow engine
//!
//! The engine validates workflow plans and executes them with bounded
//! concurrency:
//! - `plan_graph` - plan validation (duplicates, unknown references, cycles)
//! - `orchestrator` - the executor and agent registry
//! - `result` - AgentResult / WorkflowResult contracts
//! - `events` - lossy progress event stream
//! - `error` - validation error types

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod plan_graph;
pub mod result;

pub use error::PlanError;
pub use events::{event_channel, EventReceiver, EventSender, WorkflowEvent};
pub use orchestrator::AgentOrchestrator;
pub use plan_graph::PlanGraph;
pub use result::{AgentResult, ResultMetadata, WorkflowResult};
