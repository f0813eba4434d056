//! Plan validation
//!
//! Builds a validated view over a `WorkflowPlan` before execution starts.
//! All configuration errors (duplicate keys, unknown agents, unknown or
//! circular dependencies) are rejected here, so the executor can assume a
//! well-formed DAG and never invokes an agent for an invalid plan.

use std::collections::{HashMap, HashSet};

use crate::workflow::WorkflowPlan;

use super::error::PlanError;

/// Validated index over one plan
#[derive(Debug)]
pub struct PlanGraph {
    /// step id -> index into `plan.steps`
    index: HashMap<String, usize>,
    /// step id -> step name
    names: HashMap<String, String>,
}

impl PlanGraph {
    /// Validate a plan. `is_registered` answers whether an agent name is
    /// known to the orchestrator.
    pub fn build<F>(plan: &WorkflowPlan, is_registered: F) -> Result<Self, PlanError>
    where
        F: Fn(&str) -> bool,
    {
        if plan.steps.is_empty() {
            return Err(PlanError::EmptyPlan);
        }

        let mut index = HashMap::new();
        let mut seen_names = HashSet::new();
        for (i, step) in plan.steps.iter().enumerate() {
            if index.insert(step.id.clone(), i).is_some() {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
            if !seen_names.insert(step.name.clone()) {
                return Err(PlanError::DuplicateStepName(step.name.clone()));
            }
            if !step.input.is_object() {
                return Err(PlanError::StepInputNotObject(step.name.clone()));
            }
        }

        for step in &plan.steps {
            if !is_registered(&step.agent) {
                return Err(PlanError::UnknownAgent {
                    step: step.name.clone(),
                    agent: step.agent.clone(),
                });
            }
            for dep in &step.dependencies {
                if !index.contains_key(dep) {
                    return Err(PlanError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        check_cycles(plan, &index)?;

        let names = plan
            .steps
            .iter()
            .map(|s| (s.id.clone(), s.name.clone()))
            .collect();

        Ok(Self { index, names })
    }

    /// Name of a step, looked up by id
    pub fn step_name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// DFS with a recursion stack; the error names the offending cycle path.
fn check_cycles(plan: &WorkflowPlan, index: &HashMap<String, usize>) -> Result<(), PlanError> {
    fn visit(
        id: &str,
        plan: &WorkflowPlan,
        index: &HashMap<String, usize>,
        visited: &mut HashSet<String>,
        in_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Result<(), PlanError> {
        if in_stack.contains(id) {
            let mut cycle = path.clone();
            cycle.push(plan.steps[index[id]].name.clone());
            return Err(PlanError::CircularDependency(cycle));
        }
        if visited.contains(id) {
            return Ok(());
        }

        in_stack.insert(id.to_string());
        path.push(plan.steps[index[id]].name.clone());

        for dep in &plan.steps[index[id]].dependencies {
            visit(dep, plan, index, visited, in_stack, path)?;
        }

        path.pop();
        in_stack.remove(id);
        visited.insert(id.to_string());

        Ok(())
    }

    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    for step in &plan.steps {
        visit(
            &step.id,
            plan,
            index,
            &mut visited,
            &mut in_stack,
            &mut Vec::new(),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowStep;
    use serde_json::json;

    fn plan_with(steps: Vec<WorkflowStep>) -> WorkflowPlan {
        let mut plan = WorkflowPlan::new("test-plan");
        for step in steps {
            plan = plan.with_step(step);
        }
        plan
    }

    fn any_agent(_: &str) -> bool {
        true
    }

    #[test]
    fn test_valid_plan() {
        let plan = plan_with(vec![
            WorkflowStep::new("a", "first", "x"),
            WorkflowStep::new("b", "second", "x").depends_on("a"),
        ]);
        let graph = PlanGraph::build(&plan, any_agent).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.step_name("a"), Some("first"));
    }

    #[test]
    fn test_empty_plan() {
        let plan = WorkflowPlan::new("empty");
        assert!(matches!(
            PlanGraph::build(&plan, any_agent),
            Err(PlanError::EmptyPlan)
        ));
    }

    #[test]
    fn test_duplicate_step_id() {
        let plan = plan_with(vec![
            WorkflowStep::new("a", "first", "x"),
            WorkflowStep::new("a", "second", "x"),
        ]);
        assert!(matches!(
            PlanGraph::build(&plan, any_agent),
            Err(PlanError::DuplicateStepId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_duplicate_step_name() {
        let plan = plan_with(vec![
            WorkflowStep::new("a", "same", "x"),
            WorkflowStep::new("b", "same", "x"),
        ]);
        assert!(matches!(
            PlanGraph::build(&plan, any_agent),
            Err(PlanError::DuplicateStepName(name)) if name == "same"
        ));
    }

    #[test]
    fn test_input_must_be_object() {
        let plan = plan_with(vec![
            WorkflowStep::new("a", "first", "x").with_input(json!("not an object")),
        ]);
        assert!(matches!(
            PlanGraph::build(&plan, any_agent),
            Err(PlanError::StepInputNotObject(name)) if name == "first"
        ));
    }

    #[test]
    fn test_unknown_agent() {
        let plan = plan_with(vec![WorkflowStep::new("a", "first", "nope")]);
        let err = PlanGraph::build(&plan, |name| name != "nope").unwrap_err();
        match err {
            PlanError::UnknownAgent { step, agent } => {
                assert_eq!(step, "first");
                assert_eq!(agent, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let plan = plan_with(vec![WorkflowStep::new("a", "first", "x").depends_on("ghost")]);
        assert!(matches!(
            PlanGraph::build(&plan, any_agent),
            Err(PlanError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let plan = plan_with(vec![
            WorkflowStep::new("a", "first", "x").depends_on("c"),
            WorkflowStep::new("b", "second", "x").depends_on("a"),
            WorkflowStep::new("c", "third", "x").depends_on("b"),
        ]);
        match PlanGraph::build(&plan, any_agent) {
            Err(PlanError::CircularDependency(path)) => {
                assert!(path.len() >= 3);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let plan = plan_with(vec![WorkflowStep::new("a", "first", "x").depends_on("a")]);
        assert!(matches!(
            PlanGraph::build(&plan, any_agent),
            Err(PlanError::CircularDependency(_))
        ));
    }
}
