mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use deckflow::agent::{Agent, AgentError};
use deckflow::engine::{AgentOrchestrator, PlanError};
use deckflow::workflow::{StepStatus, WorkflowPlan, WorkflowStep};

/// Records every execution and echoes its input back as data
struct RecordingAgent {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Agent for RecordingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &Value) -> Result<Value, AgentError> {
        let step = input
            .get("step_label")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.name)
            .to_string();
        self.log.lock().unwrap().push(step);
        Ok(input.clone())
    }
}

struct FailingAgent;

#[async_trait]
impl Agent for FailingAgent {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _input: &Value) -> Result<Value, AgentError> {
        Err(AgentError::Failed("intentional failure".to_string()))
    }
}

/// Tracks how many executions overlap
struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Agent for ConcurrencyProbe {
    fn name(&self) -> &str {
        "probe"
    }

    async fn execute(&self, _input: &Value) -> Result<Value, AgentError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({}))
    }
}

fn orchestrator_with_recorder(log: Arc<Mutex<Vec<String>>>) -> AgentOrchestrator {
    let mut orchestrator = AgentOrchestrator::new();
    orchestrator.register(Arc::new(RecordingAgent {
        name: "recorder".to_string(),
        log,
    }));
    orchestrator.register(Arc::new(FailingAgent));
    orchestrator
}

fn step(id: &str, agent: &str) -> WorkflowStep {
    WorkflowStep::new(id, id, agent).with_input(json!({ "step_label": id }))
}

#[tokio::test]
async fn one_terminal_entry_per_step() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with_recorder(Arc::clone(&log));

    let plan = WorkflowPlan::new("fan-out")
        .with_step(step("a", "recorder"))
        .with_step(step("b", "recorder").depends_on("a"))
        .with_step(step("c", "recorder").depends_on("a"))
        .with_step(step("d", "recorder").depends_on("b").depends_on("c"));

    let result = orchestrator.execute(plan).await.unwrap();

    assert!(result.success);
    assert_eq!(result.step_results.len(), 4);
    assert_eq!(result.step_statuses.len(), 4);
    assert!(result
        .step_statuses
        .values()
        .all(|s| *s == StepStatus::Completed));
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn dependencies_run_before_dependents() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with_recorder(Arc::clone(&log));

    let plan = WorkflowPlan::new("chain")
        .with_step(step("first", "recorder"))
        .with_step(step("second", "recorder").depends_on("first"))
        .with_step(step("third", "recorder").depends_on("second"));

    let result = orchestrator.execute(plan).await.unwrap();
    assert!(result.success);

    let order = log.lock().unwrap().clone();
    assert_eq!(order, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn dependency_data_injected_under_step_name() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with_recorder(log);

    let plan = WorkflowPlan::new("injection")
        .with_step(
            WorkflowStep::new("src", "source", "recorder")
                .with_input(json!({ "payload": "from-source" })),
        )
        .with_step(WorkflowStep::new("dst", "sink", "recorder").depends_on("src"));

    let result = orchestrator.execute(plan).await.unwrap();
    assert!(result.success);

    // The sink's echoed input carries the source's data under its name.
    let sink = result.step_result("dst").unwrap();
    let injected = sink.data.as_ref().unwrap().get("source").unwrap();
    assert_eq!(injected["payload"], "from-source");
}

#[tokio::test]
async fn cycle_fails_before_any_agent_runs() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with_recorder(Arc::clone(&log));

    let plan = WorkflowPlan::new("cyclic")
        .with_step(step("a", "recorder").depends_on("b"))
        .with_step(step("b", "recorder").depends_on("a"));

    let err = orchestrator.execute(plan).await.unwrap_err();
    assert!(matches!(err, PlanError::CircularDependency(_)));
    assert!(log.lock().unwrap().is_empty());
    assert!(orchestrator.history().is_empty());
}

#[tokio::test]
async fn unknown_agent_fails_validation_and_nothing_executes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with_recorder(Arc::clone(&log));

    let plan = WorkflowPlan::new("bad-agent")
        .with_step(step("a", "recorder"))
        .with_step(step("b", "ghost-agent"));

    let err = orchestrator.execute(plan).await.unwrap_err();
    match err {
        PlanError::UnknownAgent { agent, .. } => assert_eq!(agent, "ghost-agent"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_step_name_rejected() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with_recorder(log);

    let plan = WorkflowPlan::new("dup")
        .with_step(WorkflowStep::new("a", "same", "recorder"))
        .with_step(WorkflowStep::new("b", "same", "recorder"));

    assert!(matches!(
        orchestrator.execute(plan).await,
        Err(PlanError::DuplicateStepName(_))
    ));
}

#[tokio::test]
async fn failed_dependency_blocks_dependent_but_not_siblings() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with_recorder(Arc::clone(&log));

    let plan = WorkflowPlan::new("partial-failure")
        .with_step(step("doomed", "failing"))
        .with_step(step("dependent", "recorder").depends_on("doomed"))
        .with_step(step("independent", "recorder"));

    let result = orchestrator.execute(plan).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.step_statuses["doomed"], StepStatus::Failed);
    assert_eq!(result.step_statuses["dependent"], StepStatus::Failed);
    assert_eq!(result.step_statuses["independent"], StepStatus::Completed);

    // The blocked step has a result naming the failed dependency and
    // never executed.
    let blocked = result.step_result("dependent").unwrap();
    assert!(blocked.error.as_deref().unwrap().contains("doomed"));
    let order = log.lock().unwrap().clone();
    assert!(order.contains(&"independent".to_string()));
    assert!(!order.contains(&"dependent".to_string()));

    // Errors name both the failure and the blocked step.
    assert!(result.errors.iter().any(|e| e.contains("doomed")));
    assert!(result.errors.iter().any(|e| e.contains("dependent")));
}

#[tokio::test]
async fn parallel_steps_bounded_by_configuration() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut orchestrator = AgentOrchestrator::new().with_max_parallel_steps(3);
    orchestrator.register(Arc::new(ConcurrencyProbe {
        current: Arc::clone(&current),
        peak: Arc::clone(&peak),
    }));

    let mut plan = WorkflowPlan::new("wide");
    for i in 0..8 {
        plan = plan.with_step(WorkflowStep::new(
            format!("s{i}"),
            format!("step-{i}"),
            "probe",
        ));
    }

    let result = orchestrator.execute(plan).await.unwrap();
    assert!(result.success);
    assert_eq!(result.step_results.len(), 8);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn history_is_recorded_and_bounded() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut orchestrator = AgentOrchestrator::new().with_history_limit(2);
    orchestrator.register(Arc::new(RecordingAgent {
        name: "recorder".to_string(),
        log,
    }));

    for i in 0..5 {
        let plan = WorkflowPlan::new(format!("run-{i}")).with_step(step("a", "recorder"));
        orchestrator.execute(plan).await.unwrap();
    }

    let history = orchestrator.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].plan_name, "run-3");
    assert_eq!(history[1].plan_name, "run-4");

    orchestrator.clear_history();
    assert!(orchestrator.history().is_empty());
}
