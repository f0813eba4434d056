//! Agent orchestrator - validates plans and runs them to completion
//!
//! This is the main engine that:
//! 1. Holds the agent registry
//! 2. Validates a submitted plan (fails fast, before any execution)
//! 3. Runs ready steps in bounded-concurrency batches
//! 4. Injects dependency outputs into dependent steps' inputs
//! 5. Aggregates results and records execution history

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::Agent;
use crate::workflow::{StepStatus, WorkflowPlan, WorkflowStep};

use super::error::PlanError;
use super::events::{EventSender, WorkflowEvent};
use super::plan_graph::PlanGraph;
use super::result::{AgentResult, ResultMetadata, WorkflowResult};

/// Default bound on concurrently running steps
const DEFAULT_MAX_PARALLEL_STEPS: usize = 3;

/// Default cap on retained workflow results
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Registers agents and executes workflow plans against them.
///
/// Concurrency here means concurrently scheduled futures on one runtime,
/// bounded by `max_parallel_steps`; a step is started only after every one
/// of its declared dependencies has a recorded, successful result.
pub struct AgentOrchestrator {
    agents: HashMap<String, Arc<dyn Agent>>,
    max_parallel_steps: usize,
    history: Mutex<VecDeque<WorkflowResult>>,
    history_limit: usize,
    events: Option<EventSender>,
}

impl AgentOrchestrator {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            max_parallel_steps: DEFAULT_MAX_PARALLEL_STEPS,
            history: Mutex::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            events: None,
        }
    }

    pub fn with_max_parallel_steps(mut self, max: usize) -> Self {
        self.max_parallel_steps = max.max(1);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Attach a progress event channel (lossy, non-blocking)
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Register an agent under its own name. Re-registering a name
    /// replaces the previous agent.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        if self.agents.insert(name.clone(), agent).is_some() {
            warn!(agent = %name, "Replacing previously registered agent");
        }
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.keys().map(|s| s.as_str()).collect()
    }

    /// Execute a plan to completion.
    ///
    /// Validation errors are returned as `Err` before any agent runs.
    /// Individual step failures do not abort independent branches; they
    /// are recorded in the returned `WorkflowResult`, whose `success` is
    /// false if any step failed.
    #[instrument(skip(self, plan), fields(plan_name = %plan.name))]
    pub async fn execute(&self, plan: WorkflowPlan) -> Result<WorkflowResult, PlanError> {
        let graph = PlanGraph::build(&plan, |name| self.agents.contains_key(name))?;
        let start = Instant::now();
        info!(steps = plan.len(), "Starting workflow");

        let mut results: HashMap<String, AgentResult> = HashMap::new();
        let mut statuses: HashMap<String, StepStatus> = plan
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepStatus::Pending))
            .collect();
        let mut errors: Vec<String> = Vec::new();
        let mut remaining: Vec<usize> = (0..plan.steps.len()).collect();

        while !remaining.is_empty() {
            let ready: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| self.dependencies_satisfied(&plan.steps[i], &results))
                .collect();

            if ready.is_empty() {
                // Nothing is runnable and nothing is in flight: every
                // remaining step is blocked by a failed dependency.
                let snapshot = results.clone();
                self.fail_blocked_steps(
                    &plan,
                    &graph,
                    &remaining,
                    &snapshot,
                    &mut results,
                    &mut statuses,
                    &mut errors,
                );
                errors.push(format!(
                    "workflow blocked: {} step(s) could not run",
                    remaining.len()
                ));
                remaining.clear();
                break;
            }

            let batch: Vec<usize> = ready.into_iter().take(self.max_parallel_steps).collect();

            let mut jobs = Vec::with_capacity(batch.len());
            for &i in &batch {
                let step = &plan.steps[i];
                statuses.insert(step.id.clone(), StepStatus::Running);
                self.emit(WorkflowEvent::StepStarted {
                    plan_id: plan.id.clone(),
                    plan_name: plan.name.clone(),
                    user_id: plan.user_id.clone(),
                    step_id: step.id.clone(),
                    step_name: step.name.clone(),
                });
                let input = inject_dependencies(step, &plan, &results);
                jobs.push(async move { (i, self.run_step(step, input).await) });
            }

            let outcomes = futures::future::join_all(jobs).await;

            for (i, result) in outcomes {
                let step = &plan.steps[i];
                let status = if result.success {
                    StepStatus::Completed
                } else {
                    StepStatus::Failed
                };
                if let Some(err) = &result.error {
                    errors.push(format!("step '{}' failed: {}", step.name, err));
                }
                self.emit(WorkflowEvent::StepFinished {
                    plan_id: plan.id.clone(),
                    plan_name: plan.name.clone(),
                    user_id: plan.user_id.clone(),
                    step_id: step.id.clone(),
                    step_name: step.name.clone(),
                    success: result.success,
                    error: result.error.clone(),
                });
                statuses.insert(step.id.clone(), status);
                results.insert(step.id.clone(), result);
            }

            remaining.retain(|i| !batch.contains(i));
        }

        let success = statuses.values().all(|s| *s == StepStatus::Completed);
        let execution_time_ms = start.elapsed().as_millis() as u64;

        if success {
            info!(elapsed_ms = execution_time_ms, "Workflow completed");
        } else {
            warn!(
                elapsed_ms = execution_time_ms,
                errors = errors.len(),
                "Workflow finished with failures"
            );
        }

        self.emit(WorkflowEvent::WorkflowFinished {
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            user_id: plan.user_id.clone(),
            success,
            execution_time_ms,
        });

        let result = WorkflowResult {
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            success,
            step_results: results,
            step_statuses: statuses,
            errors,
            execution_time_ms,
        };

        self.record(result.clone());
        Ok(result)
    }

    fn dependencies_satisfied(
        &self,
        step: &WorkflowStep,
        results: &HashMap<String, AgentResult>,
    ) -> bool {
        step.dependencies
            .iter()
            .all(|dep| results.get(dep).map(|r| r.success).unwrap_or(false))
    }

    #[allow(clippy::too_many_arguments)]
    fn fail_blocked_steps(
        &self,
        plan: &WorkflowPlan,
        graph: &PlanGraph,
        remaining: &[usize],
        snapshot: &HashMap<String, AgentResult>,
        results: &mut HashMap<String, AgentResult>,
        statuses: &mut HashMap<String, StepStatus>,
        errors: &mut Vec<String>,
    ) {
        for &i in remaining {
            let step = &plan.steps[i];
            let blocked_on = step
                .dependencies
                .iter()
                .find(|dep| !snapshot.get(*dep).map(|r| r.success).unwrap_or(false))
                .and_then(|dep| graph.step_name(dep))
                .unwrap_or("unknown");
            let message = format!(
                "blocked: dependency '{}' did not complete successfully",
                blocked_on
            );
            warn!(step = %step.name, "{}", message);
            errors.push(format!("step '{}' skipped: {}", step.name, message));

            let metadata = ResultMetadata {
                agent: step.agent.clone(),
                version: self
                    .agents
                    .get(&step.agent)
                    .map(|a| a.version().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                execution_time_ms: 0,
            };
            statuses.insert(step.id.clone(), StepStatus::Failed);
            results.insert(step.id.clone(), AgentResult::failure(message, metadata));
        }
    }

    /// Run one step through its agent with timing and logging. Failures
    /// are converted into the uniform failure shape, never propagated.
    async fn run_step(&self, step: &WorkflowStep, input: Value) -> AgentResult {
        let agent = match self.agents.get(&step.agent) {
            Some(agent) => Arc::clone(agent),
            // Unreachable for validated plans; recorded rather than panicked on.
            None => {
                return AgentResult::failure(
                    format!("agent '{}' is not registered", step.agent),
                    ResultMetadata {
                        agent: step.agent.clone(),
                        version: "unknown".to_string(),
                        execution_time_ms: 0,
                    },
                )
            }
        };

        debug!(step = %step.name, agent = %step.agent, "Step started");
        let start = Instant::now();
        let outcome = agent.execute(&input).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let metadata = ResultMetadata {
            agent: agent.name().to_string(),
            version: agent.version().to_string(),
            execution_time_ms,
        };

        match outcome {
            Ok(data) => {
                info!(step = %step.name, elapsed_ms = execution_time_ms, "Step completed");
                AgentResult::ok(data, metadata)
            }
            Err(e) => {
                error!(step = %step.name, elapsed_ms = execution_time_ms, error = %e, "Step failed");
                AgentResult::failure(e.to_string(), metadata)
            }
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    fn record(&self, result: WorkflowResult) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(result);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Snapshot of retained workflow results, oldest first
    pub fn history(&self) -> Vec<WorkflowResult> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.clear();
    }
}

impl Default for AgentOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the effective input for a step: the declared input object with
/// each dependency's output data inserted under the dependency's name.
fn inject_dependencies(
    step: &WorkflowStep,
    plan: &WorkflowPlan,
    results: &HashMap<String, AgentResult>,
) -> Value {
    let mut input = match &step.input {
        Value::Object(map) => map.clone(),
        // Validation guarantees an object; fall back defensively.
        _ => serde_json::Map::new(),
    };

    for dep in &step.dependencies {
        let key = plan
            .step(dep)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| dep.clone());
        let data = results
            .get(dep)
            .and_then(|r| r.data.clone())
            .unwrap_or(Value::Null);
        input.insert(key, data);
    }

    Value::Object(input)
}
