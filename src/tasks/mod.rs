//! Render-task lifecycle protocol
//!
//! Observations about an external task arrive on two channels: webhook
//! delivery and the polling fallback. Both are normalized into a
//! `TaskEvent` and fed through one apply path, so the terminal transition
//! is claimed exactly once (conditional update on the task row) and the
//! losing channel performs no side effects.

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::provider::TaskStatusResponse;
use crate::relay::RelayHandle;
use crate::store::{
    NewSlide, Presentation, PresentationStatus, RenderTask, Store, StoreError, TaskStatus,
};

pub mod poller;

pub use poller::{spawn_poller, PollerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to parse slides: {0}")]
    SlideParse(String),
}

/// Why a task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Finish,
    Error,
    UserStopped,
    /// Synthesized by the poller when a task outlives its poll budget
    Timeout,
}

impl StopReason {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("finish") => StopReason::Finish,
            Some("user_stopped") => StopReason::UserStopped,
            // Anything else, including a missing reason, is a failure.
            _ => StopReason::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Finish => "finish",
            StopReason::Error => "error",
            StopReason::UserStopped => "user_stopped",
            StopReason::Timeout => "timeout",
        }
    }
}

/// One observation about a task, from either delivery channel
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Planning,
    TopicsGenerated {
        topics: Value,
    },
    Progress {
        progress: Option<u8>,
        current_step: Option<String>,
        thinking_steps: Option<Value>,
        thinking_action: Option<Value>,
        slide_preview: Option<Value>,
    },
    Stopped {
        reason: StopReason,
        result: Option<Value>,
    },
    Unknown {
        event_type: String,
    },
}

impl TaskEvent {
    /// Normalize a webhook body. Unknown event types are preserved so the
    /// handler can acknowledge them without acting.
    pub fn from_webhook(body: &Value) -> Self {
        let event_type = body
            .get("event_type")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        match event_type {
            "task_planning" => TaskEvent::Planning,
            "topics_generated" => TaskEvent::TopicsGenerated {
                topics: body.get("topics").cloned().unwrap_or(Value::Null),
            },
            "task_progress" => TaskEvent::Progress {
                progress: body
                    .get("progress")
                    .and_then(|v| v.as_u64())
                    .map(|p| p.min(100) as u8),
                current_step: body
                    .get("current_step")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                thinking_steps: body.get("thinking_steps").cloned(),
                thinking_action: body.get("thinking_action").cloned(),
                slide_preview: body.get("slide_preview").cloned(),
            },
            "task_stopped" => TaskEvent::Stopped {
                reason: StopReason::parse(body.get("stop_reason").and_then(|v| v.as_str())),
                result: body.get("result").cloned(),
            },
            other => TaskEvent::Unknown {
                event_type: other.to_string(),
            },
        }
    }

    /// Normalize a poll response from the render service
    pub fn from_poll(response: &TaskStatusResponse) -> Self {
        if response.is_stopped() {
            TaskEvent::Stopped {
                reason: StopReason::parse(response.stop_reason.as_deref()),
                result: response.result.clone(),
            }
        } else {
            TaskEvent::Progress {
                progress: response.progress,
                current_step: response.current_step.clone(),
                thinking_steps: None,
                thinking_action: None,
                slide_preview: None,
            }
        }
    }
}

/// What the apply path did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    PlanningRecorded,
    TopicsRecorded,
    ProgressRecorded,
    Completed { slides_count: usize },
    FailureRecorded,
    /// Lost the terminal race; no side effects were performed
    AlreadySettled,
    /// Unknown event type; acknowledged without any writes
    Acknowledged,
}

impl ApplyOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Completed { .. }
                | ApplyOutcome::FailureRecorded
                | ApplyOutcome::AlreadySettled
        )
    }
}

/// Apply one task observation to the durable rows and relay the outcome to
/// the owning user's room. The owner is resolved from the task row before
/// any emission.
pub async fn apply_task_event(
    store: &Store,
    relay: &RelayHandle,
    task: &RenderTask,
    event: TaskEvent,
) -> Result<ApplyOutcome, ProtocolError> {
    let presentation_id = task.presentation_id.as_str();
    let user_id = task.user_id.as_str();

    match event {
        TaskEvent::Planning => {
            store.set_presentation_status(presentation_id, PresentationStatus::Planning)?;
            relay
                .emit_generation_status(user_id, presentation_id, "planning", "Planning presentation...")
                .await;
            Ok(ApplyOutcome::PlanningRecorded)
        }

        TaskEvent::TopicsGenerated { topics } => {
            store.set_presentation_topics(presentation_id, &topics)?;
            relay
                .emit_topics_generated(user_id, presentation_id, topics)
                .await;
            Ok(ApplyOutcome::TopicsRecorded)
        }

        TaskEvent::Progress {
            progress,
            current_step,
            thinking_steps,
            thinking_action,
            slide_preview,
        } => {
            let mut merged = Map::new();
            if let Some(progress) = progress {
                merged.insert("progress".to_string(), json!(progress));
            }
            if let Some(step) = &current_step {
                merged.insert("current_step".to_string(), json!(step));
            }
            if !merged.is_empty() {
                store.merge_task_webhook_data(&task.task_id, &Value::Object(merged))?;
            }

            if progress.is_some() || current_step.is_some() {
                relay
                    .emit_generation_progress(
                        user_id,
                        presentation_id,
                        progress.unwrap_or(0),
                        current_step.as_deref().unwrap_or(""),
                    )
                    .await;
            }
            if let Some(steps) = thinking_steps {
                relay.emit_thinking_step(user_id, presentation_id, steps).await;
            }
            if let Some(action) = thinking_action {
                relay
                    .emit_thinking_action(user_id, presentation_id, action)
                    .await;
            }
            if let Some(preview) = slide_preview {
                relay
                    .emit_slide_preview(user_id, presentation_id, preview)
                    .await;
            }
            Ok(ApplyOutcome::ProgressRecorded)
        }

        TaskEvent::Stopped {
            reason: StopReason::Finish,
            result,
        } => {
            // Claim the terminal transition; the losing observer of a
            // webhook/poll race sees zero rows affected and stops here.
            if !store.transition_task_if_running(&task.task_id, TaskStatus::Completed)? {
                debug!(task_id = %task.task_id, "Terminal transition already applied");
                return Ok(ApplyOutcome::AlreadySettled);
            }

            match parse_slides(result.as_ref()) {
                Ok(slides) => {
                    let slides_count = store.finish_presentation(presentation_id, &slides)?;
                    info!(task_id = %task.task_id, slides_count, "Presentation ready");
                    relay
                        .emit_presentation_ready(user_id, presentation_id, slides_count)
                        .await;
                    Ok(ApplyOutcome::Completed { slides_count })
                }
                Err(reason) => {
                    warn!(task_id = %task.task_id, %reason, "Slide parse failed");
                    store.fail_generation(presentation_id, &task.task_id, &reason)?;
                    relay
                        .emit_presentation_error(user_id, presentation_id, &reason)
                        .await;
                    Err(ProtocolError::SlideParse(reason))
                }
            }
        }

        TaskEvent::Stopped { reason, .. } => {
            if !store.transition_task_if_running(&task.task_id, TaskStatus::Failed)? {
                debug!(task_id = %task.task_id, "Terminal transition already applied");
                return Ok(ApplyOutcome::AlreadySettled);
            }

            let reason_text = format!("task stopped: {}", reason.as_str());
            store.fail_generation(presentation_id, &task.task_id, &reason_text)?;
            info!(task_id = %task.task_id, reason = reason.as_str(), "Task failure recorded");
            relay
                .emit_presentation_error(user_id, presentation_id, &reason_text)
                .await;
            Ok(ApplyOutcome::FailureRecorded)
        }

        TaskEvent::Unknown { event_type } => {
            // Forward-compatibility policy: acknowledge and ignore.
            debug!(task_id = %task.task_id, event_type, "Unknown event type acknowledged");
            Ok(ApplyOutcome::Acknowledged)
        }
    }
}

/// Parse slides out of a task result payload.
///
/// Expected shape: `{"slides": [{"title": ..., ...}, ...]}` with a
/// non-empty array of objects. Anything else is a parse failure that
/// flips the presentation to `error`.
pub fn parse_slides(result: Option<&Value>) -> Result<Vec<NewSlide>, String> {
    let result = result.ok_or_else(|| "missing result payload".to_string())?;
    let slides = result
        .get("slides")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "missing slides array".to_string())?;
    if slides.is_empty() {
        return Err("empty slides array".to_string());
    }

    slides
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(format!("slide {} is not an object", i));
            }
            let title = item
                .get("title")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("Slide {}", i + 1));
            Ok(NewSlide {
                position: i as u32,
                title,
                body: item.clone(),
            })
        })
        .collect()
}

/// Effective progress/current-step for the status endpoint. Stored webhook
/// data wins; otherwise per-status defaults apply.
pub fn progress_for(presentation: &Presentation, webhook_data: Option<&Value>) -> (u8, String) {
    let (default_progress, default_step) = match presentation.status {
        PresentationStatus::Generating => (30, "Generating slides..."),
        PresentationStatus::Planning => (45, "Planning presentation..."),
        PresentationStatus::TopicsGenerated => (70, "Topics generated"),
        PresentationStatus::Ready => (100, "Completed"),
        PresentationStatus::Error => (0, "Error occurred"),
    };

    let progress = webhook_data
        .and_then(|d| d.get("progress"))
        .and_then(|v| v.as_u64())
        .map(|p| p.min(100) as u8)
        .unwrap_or(default_progress);
    let current_step = webhook_data
        .and_then(|d| d.get("current_step"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| default_step.to_string());

    (progress, current_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_stop_reason_parse() {
        assert_eq!(StopReason::parse(Some("finish")), StopReason::Finish);
        assert_eq!(
            StopReason::parse(Some("user_stopped")),
            StopReason::UserStopped
        );
        assert_eq!(StopReason::parse(Some("error")), StopReason::Error);
        assert_eq!(StopReason::parse(Some("whatever")), StopReason::Error);
        assert_eq!(StopReason::parse(None), StopReason::Error);
    }

    #[test]
    fn test_webhook_event_normalization() {
        let body = json!({
            "task_id": "t-1",
            "event_type": "task_stopped",
            "stop_reason": "finish",
            "result": {"slides": [{"title": "A"}]}
        });
        match TaskEvent::from_webhook(&body) {
            TaskEvent::Stopped { reason, result } => {
                assert_eq!(reason, StopReason::Finish);
                assert!(result.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let unknown = json!({"task_id": "t-1", "event_type": "billing_update"});
        assert!(matches!(
            TaskEvent::from_webhook(&unknown),
            TaskEvent::Unknown { event_type } if event_type == "billing_update"
        ));
    }

    #[test]
    fn test_parse_slides_happy_path() {
        let result = json!({"slides": [
            {"title": "Intro", "text": "hello"},
            {"text": "untitled content"},
        ]});
        let slides = parse_slides(Some(&result)).unwrap();
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[0].title, "Intro");
        assert_eq!(slides[0].position, 0);
        // Missing title falls back to a positional name.
        assert_eq!(slides[1].title, "Slide 2");
    }

    #[test]
    fn test_parse_slides_failures() {
        assert!(parse_slides(None).unwrap_err().contains("missing result"));
        assert!(parse_slides(Some(&json!({})))
            .unwrap_err()
            .contains("missing slides"));
        assert!(parse_slides(Some(&json!({"slides": []})))
            .unwrap_err()
            .contains("empty"));
        assert!(parse_slides(Some(&json!({"slides": ["not-an-object"]})))
            .unwrap_err()
            .contains("not an object"));
    }

    fn presentation_with_status(status: PresentationStatus) -> Presentation {
        let now = Utc::now();
        Presentation {
            id: "p-1".to_string(),
            user_id: "u-1".to_string(),
            title: "t".to_string(),
            prompt: "p".to_string(),
            status,
            task_id: None,
            topics: None,
            slides_count: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_progress_defaults() {
        let (progress, step) =
            progress_for(&presentation_with_status(PresentationStatus::Generating), None);
        assert_eq!((progress, step.as_str()), (30, "Generating slides..."));

        let (progress, step) =
            progress_for(&presentation_with_status(PresentationStatus::Ready), None);
        assert_eq!((progress, step.as_str()), (100, "Completed"));

        let (progress, step) =
            progress_for(&presentation_with_status(PresentationStatus::Error), None);
        assert_eq!((progress, step.as_str()), (0, "Error occurred"));
    }

    #[test]
    fn test_progress_prefers_webhook_data() {
        let data = json!({"progress": 62, "current_step": "Rendering slide 5"});
        let (progress, step) = progress_for(
            &presentation_with_status(PresentationStatus::Generating),
            Some(&data),
        );
        assert_eq!(progress, 62);
        assert_eq!(step, "Rendering slide 5");
    }
}
