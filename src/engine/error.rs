//! Engine error types

/// Errors raised while validating a plan, before any agent executes
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan has no steps")]
    EmptyPlan,

    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Duplicate step name: {0}")]
    DuplicateStepName(String),

    #[error("Step '{0}' input must be a JSON object")]
    StepInputNotObject(String),

    #[error("Step '{step}' references unregistered agent '{agent}'")]
    UnknownAgent { step: String, agent: String },

    #[error("Step '{step}' depends on unknown step id '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),
}
