//! Workflow plan and step definitions
//!
//! A plan is a named, immutable DAG of steps submitted to the engine as one
//! unit. Steps reference each other by opaque id; step names are human
//! labels and double as the key under which a dependency's output data is
//! injected into dependent steps. Both ids and names must be unique within
//! a plan (enforced at validation time).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A complete workflow plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPlan {
    /// Plan id (generated when not supplied)
    #[serde(default = "generate_id")]
    pub id: String,

    /// Plan name (for logging and history)
    pub name: String,

    /// Owning user, when the plan belongs to one (drives event routing)
    #[serde(default)]
    pub user_id: Option<String>,

    /// Steps to execute
    pub steps: Vec<WorkflowStep>,
}

/// A single step in a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Opaque id, unique within the plan. Dependencies reference this.
    pub id: String,

    /// Human label, unique within the plan. Dependency data is injected
    /// into dependent steps' input under this key.
    pub name: String,

    /// Name of the registered agent that executes this step
    pub agent: String,

    /// Input object handed to the agent (must be a JSON object)
    #[serde(default = "empty_object")]
    pub input: Value,

    /// Ids of steps that must complete successfully before this one runs
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Execution status of a step, set exclusively by the engine.
/// Terminal states are final; there is no per-step retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl WorkflowPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            user_id: None,
            steps: Vec::new(),
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up a step by id
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl WorkflowStep {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent: agent.into(),
            input: empty_object(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_builder() {
        let plan = WorkflowPlan::new("deck-pipeline")
            .for_user("user-1")
            .with_step(WorkflowStep::new("a", "brief", "brief-agent"))
            .with_step(
                WorkflowStep::new("b", "outline", "outline-agent")
                    .with_input(json!({"slides_count": 8}))
                    .depends_on("a"),
            );

        assert_eq!(plan.name, "deck-pipeline");
        assert_eq!(plan.user_id.as_deref(), Some("user-1"));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.step("b").unwrap().dependencies, vec!["a"]);
    }

    #[test]
    fn test_plan_deserialize_defaults() {
        let raw = json!({
            "name": "p",
            "steps": [
                {"id": "s1", "name": "first", "agent": "brief-agent"}
            ]
        });

        let plan: WorkflowPlan = serde_json::from_value(raw).unwrap();
        assert!(!plan.id.is_empty());
        assert!(plan.user_id.is_none());
        assert!(plan.steps[0].input.is_object());
        assert!(plan.steps[0].dependencies.is_empty());
    }

    #[test]
    fn test_step_status_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
    }
}
