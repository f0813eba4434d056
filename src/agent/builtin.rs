//! Built-in agents for the presentation pipeline
//!
//! The creation endpoint runs a three-step plan through the orchestrator:
//! `brief` normalizes the raw user prompt, `outline` derives a deck
//! outline from it, and `dispatch` starts the external render task and
//! records the tracking rows. Everything after dispatch is driven by the
//! webhook/poll protocol.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::provider::{CreateTaskRequest, ProviderClient};
use crate::store::Store;
use crate::workflow::{WorkflowPlan, WorkflowStep};

use super::tool::{Tool, ToolError, TrackedTool};
use super::{require_str, Agent, AgentError};

const DEFAULT_SLIDES_COUNT: u32 = 8;
const MAX_SLIDES_COUNT: u32 = 30;
const MAX_TITLE_LEN: usize = 80;

/// Build the standard creation plan for one presentation
pub fn presentation_plan(
    presentation_id: &str,
    user_id: &str,
    prompt: &str,
    slides_count: Option<u32>,
) -> WorkflowPlan {
    let brief_input = json!({
        "prompt": prompt,
        "slides_count": slides_count,
    });
    let dispatch_input = json!({
        "presentation_id": presentation_id,
        "user_id": user_id,
    });

    WorkflowPlan::new("presentation-pipeline")
        .for_user(user_id)
        .with_step(WorkflowStep::new("brief", "brief", "brief").with_input(brief_input))
        .with_step(WorkflowStep::new("outline", "outline", "outline").depends_on("brief"))
        .with_step(
            WorkflowStep::new("dispatch", "dispatch", "dispatch")
                .with_input(dispatch_input)
                .depends_on("outline"),
        )
}

/// Normalizes a raw user prompt into a brief
pub struct BriefAgent;

#[async_trait]
impl Agent for BriefAgent {
    fn name(&self) -> &str {
        "brief"
    }

    async fn execute(&self, input: &Value) -> Result<Value, AgentError> {
        let prompt = require_str(input, "prompt")?.trim().to_string();

        let slides_count = input
            .get("slides_count")
            .and_then(|v| v.as_u64())
            .map(|n| (n as u32).clamp(1, MAX_SLIDES_COUNT))
            .unwrap_or(DEFAULT_SLIDES_COUNT);

        let title = derive_title(&prompt);

        Ok(json!({
            "title": title,
            "prompt": prompt,
            "slides_count": slides_count,
        }))
    }
}

/// First line of the prompt, truncated on a char boundary
fn derive_title(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or("").trim();
    let mut title: String = first_line.chars().take(MAX_TITLE_LEN).collect();
    if title.is_empty() {
        title = "Untitled presentation".to_string();
    }
    title
}

/// Derives a deck outline from a brief
pub struct OutlineAgent;

#[async_trait]
impl Agent for OutlineAgent {
    fn name(&self) -> &str {
        "outline"
    }

    async fn execute(&self, input: &Value) -> Result<Value, AgentError> {
        let brief = input
            .get("brief")
            .and_then(|v| v.as_object())
            .ok_or_else(|| AgentError::InvalidInput("missing brief data".to_string()))?;

        let prompt = brief
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::InvalidInput("brief has no prompt".to_string()))?;
        let title = brief.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let slides_count = brief
            .get("slides_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_SLIDES_COUNT as u64) as u32;

        let sections = derive_sections(prompt, slides_count);

        Ok(json!({
            "title": title,
            "prompt": prompt,
            "slides_count": slides_count,
            "sections": sections,
        }))
    }
}

/// Split the prompt into sentence fragments and shape them into a section
/// list of exactly `slides_count` entries, bookended by an intro and a
/// summary when there is room.
fn derive_sections(prompt: &str, slides_count: u32) -> Vec<Value> {
    let slides_count = slides_count.max(1) as usize;

    let fragments: Vec<String> = prompt
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let heading: String = s.chars().take(60).collect();
            capitalize(&heading)
        })
        .collect();

    let mut headings: Vec<String> = Vec::with_capacity(slides_count);
    if slides_count >= 3 {
        headings.push("Introduction".to_string());
        let middle = slides_count - 2;
        for i in 0..middle {
            let heading = fragments
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Section {}", i + 1));
            headings.push(heading);
        }
        headings.push("Summary".to_string());
    } else {
        for i in 0..slides_count {
            let heading = fragments
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Section {}", i + 1));
            headings.push(heading);
        }
    }

    headings
        .into_iter()
        .enumerate()
        .map(|(position, heading)| json!({ "position": position, "heading": heading }))
        .collect()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Tool that starts the external render task and records tracking rows
pub struct CreateTaskTool {
    provider: Arc<ProviderClient>,
    store: Arc<Store>,
    webhook_url: Option<String>,
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create-render-task"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let presentation_id = input
            .get("presentation_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing presentation_id".to_string()))?;
        let user_id = input
            .get("user_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing user_id".to_string()))?;
        let outline = input
            .get("outline")
            .and_then(|v| v.as_object())
            .ok_or_else(|| ToolError::InvalidInput("missing outline data".to_string()))?;

        let prompt = outline
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("outline has no prompt".to_string()))?;
        let slides_count = outline
            .get("slides_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_SLIDES_COUNT as u64) as u32;

        let request = CreateTaskRequest {
            prompt: prompt.to_string(),
            slides_count,
            outline: outline.get("sections").cloned(),
            webhook_url: self.webhook_url.clone(),
        };

        let handle = self.provider.create_task(&request).await?;
        self.store
            .set_presentation_task(presentation_id, &handle.task_id)?;
        self.store
            .create_render_task(&handle.task_id, presentation_id, user_id)?;

        Ok(json!({ "task_id": handle.task_id }))
    }
}

/// Starts the external render task via a tracked tool invocation
pub struct DispatchAgent {
    tool: TrackedTool,
}

impl DispatchAgent {
    pub fn new(
        provider: Arc<ProviderClient>,
        store: Arc<Store>,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            tool: TrackedTool::new(Arc::new(CreateTaskTool {
                provider,
                store,
                webhook_url,
            })),
        }
    }

    pub fn tool(&self) -> &TrackedTool {
        &self.tool
    }
}

#[async_trait]
impl Agent for DispatchAgent {
    fn name(&self) -> &str {
        "dispatch"
    }

    async fn execute(&self, input: &Value) -> Result<Value, AgentError> {
        let result = self.tool.invoke(input.clone()).await?;
        Ok(result)
    }
}
