//! Durable record types
//!
//! These rows are the source of truth for a presentation's lifecycle; all
//! in-memory engine state is ephemeral and reconstructable only by
//! re-running a plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a presentation.
///
/// `ready` is the canonical terminal success state. Legacy rows written as
/// `completed` are read back as `Ready` but never written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationStatus {
    Generating,
    Planning,
    TopicsGenerated,
    Ready,
    Error,
}

impl PresentationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresentationStatus::Generating => "generating",
            PresentationStatus::Planning => "planning",
            PresentationStatus::TopicsGenerated => "topics_generated",
            PresentationStatus::Ready => "ready",
            PresentationStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "generating" => Some(PresentationStatus::Generating),
            "planning" => Some(PresentationStatus::Planning),
            "topics_generated" => Some(PresentationStatus::TopicsGenerated),
            "ready" | "completed" => Some(PresentationStatus::Ready),
            "error" => Some(PresentationStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PresentationStatus::Ready | PresentationStatus::Error)
    }
}

/// Status of an external render task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Presentation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub prompt: String,
    pub status: PresentationStatus,
    pub task_id: Option<String>,
    pub topics: Option<Value>,
    pub slides_count: Option<u32>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Local tracking row for a long-running external render task
#[derive(Debug, Clone, Serialize)]
pub struct RenderTask {
    pub task_id: String,
    pub presentation_id: String,
    pub user_id: String,
    pub status: TaskStatus,
    pub webhook_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Slide {
    pub id: String,
    pub presentation_id: String,
    pub position: u32,
    pub title: String,
    pub body: Value,
    pub created_at: DateTime<Utc>,
}

/// Slide content pending insertion
#[derive(Debug, Clone)]
pub struct NewSlide {
    pub position: u32,
    pub title: String,
    pub body: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}

/// Portable form of a conversation: title plus ordered messages.
/// Importing an export reproduces order and content exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationExport {
    pub title: String,
    pub messages: Vec<ExportedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedMessage {
    pub role: String,
    pub content: String,
}
