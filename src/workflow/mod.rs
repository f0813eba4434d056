//! Workflow plan types
//!
//! This module contains the types for defining workflow plans:
//! - `plan` - WorkflowPlan, WorkflowStep, and StepStatus

pub mod plan;

pub use plan::{StepStatus, WorkflowPlan, WorkflowStep};
