//! SQLite persistence
//!
//! Single-connection store behind a mutex; critical sections are short and
//! never held across an await point. The terminal transition of a render
//! task is a conditional update so that concurrent observers (webhook
//! delivery racing a poll tick) resolve to exactly one winner; the success
//! path (slide inserts + status flip) runs inside one transaction so a
//! presentation can never be `ready` with zero slides.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

pub mod models;

pub use models::{
    ChatMessage, Conversation, ConversationExport, ExportedMessage, NewSlide, Presentation,
    PresentationStatus, RenderTask, Slide, TaskStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS presentations (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    title         TEXT NOT NULL,
    prompt        TEXT NOT NULL,
    status        TEXT NOT NULL,
    task_id       TEXT,
    topics        TEXT,
    slides_count  INTEGER,
    error         TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS render_tasks (
    task_id          TEXT PRIMARY KEY,
    presentation_id  TEXT NOT NULL,
    user_id          TEXT NOT NULL,
    status           TEXT NOT NULL,
    webhook_data     TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS slides (
    id               TEXT PRIMARY KEY,
    presentation_id  TEXT NOT NULL,
    position         INTEGER NOT NULL,
    title            TEXT NOT NULL,
    body             TEXT NOT NULL,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_slides_presentation ON slides(presentation_id, position);

CREATE TABLE IF NOT EXISTS conversations (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    title       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY,
    conversation_id  TEXT NOT NULL,
    role             TEXT NOT NULL,
    content          TEXT NOT NULL,
    position         INTEGER NOT NULL,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, position);
"#;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ------------------------------------------------------------------
    // Presentations
    // ------------------------------------------------------------------

    pub fn create_presentation(
        &self,
        user_id: &str,
        title: &str,
        prompt: &str,
    ) -> Result<Presentation, StoreError> {
        let now = Utc::now();
        let presentation = Presentation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            prompt: prompt.to_string(),
            status: PresentationStatus::Generating,
            task_id: None,
            topics: None,
            slides_count: None,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock();
        conn.execute(
            "INSERT INTO presentations
                 (id, user_id, title, prompt, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                presentation.id,
                presentation.user_id,
                presentation.title,
                presentation.prompt,
                presentation.status.as_str(),
                to_ts(&now),
                to_ts(&now),
            ],
        )?;
        debug!(presentation_id = %presentation.id, "Presentation created");
        Ok(presentation)
    }

    pub fn presentation(&self, id: &str) -> Result<Option<Presentation>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, user_id, title, prompt, status, task_id, topics,
                        slides_count, error, created_at, updated_at
                 FROM presentations WHERE id = ?1",
                params![id],
                map_presentation,
            )
            .optional()?;
        Ok(row)
    }

    pub fn presentation_owner(&self, id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock();
        let owner = conn
            .query_row(
                "SELECT user_id FROM presentations WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    pub fn user_presentations(&self, user_id: &str) -> Result<Vec<Presentation>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, prompt, status, task_id, topics,
                    slides_count, error, created_at, updated_at
             FROM presentations WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], map_presentation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_presentation_status(
        &self,
        id: &str,
        status: PresentationStatus,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE presentations SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), to_ts(&Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("presentation {id}")));
        }
        Ok(())
    }

    /// Flip a presentation to `error` with a reason
    pub fn set_presentation_error(&self, id: &str, reason: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE presentations SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                PresentationStatus::Error.as_str(),
                reason,
                to_ts(&Utc::now()),
                id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("presentation {id}")));
        }
        Ok(())
    }

    pub fn set_presentation_task(&self, id: &str, task_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE presentations SET task_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![task_id, to_ts(&Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("presentation {id}")));
        }
        Ok(())
    }

    /// Store generated topics and advance the status in one update.
    pub fn set_presentation_topics(&self, id: &str, topics: &Value) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE presentations
             SET topics = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(topics)?,
                PresentationStatus::TopicsGenerated.as_str(),
                to_ts(&Utc::now()),
                id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("presentation {id}")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Render tasks
    // ------------------------------------------------------------------

    pub fn create_render_task(
        &self,
        task_id: &str,
        presentation_id: &str,
        user_id: &str,
    ) -> Result<RenderTask, StoreError> {
        let now = Utc::now();
        let task = RenderTask {
            task_id: task_id.to_string(),
            presentation_id: presentation_id.to_string(),
            user_id: user_id.to_string(),
            status: TaskStatus::Running,
            webhook_data: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock();
        conn.execute(
            "INSERT INTO render_tasks
                 (task_id, presentation_id, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task.task_id,
                task.presentation_id,
                task.user_id,
                task.status.as_str(),
                to_ts(&now),
                to_ts(&now),
            ],
        )?;
        debug!(task_id = %task.task_id, "Render task created");
        Ok(task)
    }

    pub fn render_task(&self, task_id: &str) -> Result<Option<RenderTask>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT task_id, presentation_id, user_id, status, webhook_data,
                        created_at, updated_at
                 FROM render_tasks WHERE task_id = ?1",
                params![task_id],
                map_render_task,
            )
            .optional()?;
        Ok(row)
    }

    /// Merge progress fields from a webhook/poll payload onto the task row.
    pub fn merge_task_webhook_data(&self, task_id: &str, data: &Value) -> Result<(), StoreError> {
        let conn = self.lock();
        let existing: Option<Option<String>> = conn
            .query_row(
                "SELECT webhook_data FROM render_tasks WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;

        let existing = match existing {
            Some(raw) => raw,
            None => return Err(StoreError::NotFound(format!("render task {task_id}"))),
        };

        let mut merged = existing
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        if let Some(incoming) = data.as_object() {
            for (key, value) in incoming {
                merged.insert(key.clone(), value.clone());
            }
        }

        conn.execute(
            "UPDATE render_tasks SET webhook_data = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![
                serde_json::to_string(&Value::Object(merged))?,
                to_ts(&Utc::now()),
                task_id
            ],
        )?;
        Ok(())
    }

    /// Atomically claim the terminal transition of a running task.
    ///
    /// Returns true for the single winner; a false return means another
    /// observer already applied a terminal status and the caller must skip
    /// all side effects.
    pub fn transition_task_if_running(
        &self,
        task_id: &str,
        to: TaskStatus,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE render_tasks SET status = ?1, updated_at = ?2
             WHERE task_id = ?3 AND status = 'running'",
            params![to.as_str(), to_ts(&Utc::now()), task_id],
        )?;
        Ok(updated == 1)
    }

    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE render_tasks SET status = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![status.as_str(), to_ts(&Utc::now()), task_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("render task {task_id}")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Slides / terminal transitions
    // ------------------------------------------------------------------

    /// Success path: insert all slides and flip the presentation to
    /// `ready` in one transaction.
    pub fn finish_presentation(
        &self,
        presentation_id: &str,
        slides: &[NewSlide],
    ) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = to_ts(&Utc::now());

        for slide in slides {
            tx.execute(
                "INSERT INTO slides (id, presentation_id, position, title, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    presentation_id,
                    slide.position,
                    slide.title,
                    serde_json::to_string(&slide.body)?,
                    now,
                ],
            )?;
        }

        let updated = tx.execute(
            "UPDATE presentations
             SET status = ?1, slides_count = ?2, error = NULL, updated_at = ?3
             WHERE id = ?4",
            params![
                PresentationStatus::Ready.as_str(),
                slides.len() as u32,
                now,
                presentation_id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!(
                "presentation {presentation_id}"
            )));
        }

        tx.commit()?;
        debug!(presentation_id, slides = slides.len(), "Presentation ready");
        Ok(slides.len())
    }

    /// Failure path: mark the presentation errored and the task failed in
    /// one transaction.
    pub fn fail_generation(
        &self,
        presentation_id: &str,
        task_id: &str,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = to_ts(&Utc::now());

        tx.execute(
            "UPDATE presentations SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                PresentationStatus::Error.as_str(),
                reason,
                now,
                presentation_id
            ],
        )?;
        tx.execute(
            "UPDATE render_tasks SET status = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![TaskStatus::Failed.as_str(), now, task_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn slides(&self, presentation_id: &str) -> Result<Vec<Slide>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, presentation_id, position, title, body, created_at
             FROM slides WHERE presentation_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![presentation_id], map_slide)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    pub fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock();
        conn.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id,
                conversation.user_id,
                conversation.title,
                to_ts(&now),
                to_ts(&now),
            ],
        )?;
        Ok(conversation)
    }

    pub fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, user_id, title, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                params![id],
                map_conversation,
            )
            .optional()?;
        Ok(row)
    }

    pub fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let now = Utc::now();
        let conn = self.lock();

        let position: u32 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            position,
            created_at: now,
        };

        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.conversation_id,
                message.role,
                message.content,
                message.position,
                to_ts(&now),
            ],
        )?;
        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![to_ts(&now), conversation_id],
        )?;
        Ok(message)
    }

    pub fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, position, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![conversation_id], map_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn export_conversation(&self, id: &str) -> Result<ConversationExport, StoreError> {
        let conversation = self
            .conversation(id)?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))?;
        let messages = self
            .messages(id)?
            .into_iter()
            .map(|m| ExportedMessage {
                role: m.role,
                content: m.content,
            })
            .collect();
        Ok(ConversationExport {
            title: conversation.title,
            messages,
        })
    }

    /// Recreate a conversation from an export, preserving message order
    /// and content exactly.
    pub fn import_conversation(
        &self,
        user_id: &str,
        export: &ConversationExport,
    ) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: export.title.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id,
                conversation.user_id,
                conversation.title,
                to_ts(&now),
                to_ts(&now),
            ],
        )?;
        for (position, message) in export.messages.iter().enumerate() {
            tx.execute(
                "INSERT INTO messages (id, conversation_id, role, content, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    conversation.id,
                    message.role,
                    message.content,
                    position as u32,
                    to_ts(&now),
                ],
            )?;
        }
        tx.commit()?;
        Ok(conversation)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_json(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn map_presentation(row: &Row<'_>) -> rusqlite::Result<Presentation> {
    let status_raw: String = row.get(4)?;
    Ok(Presentation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        prompt: row.get(3)?,
        status: PresentationStatus::parse(&status_raw).unwrap_or(PresentationStatus::Error),
        task_id: row.get(5)?,
        topics: parse_json(row.get(6)?),
        slides_count: row.get(7)?,
        error: row.get(8)?,
        created_at: parse_ts(row.get(9)?)?,
        updated_at: parse_ts(row.get(10)?)?,
    })
}

fn map_render_task(row: &Row<'_>) -> rusqlite::Result<RenderTask> {
    let status_raw: String = row.get(3)?;
    Ok(RenderTask {
        task_id: row.get(0)?,
        presentation_id: row.get(1)?,
        user_id: row.get(2)?,
        status: TaskStatus::parse(&status_raw).unwrap_or(TaskStatus::Failed),
        webhook_data: parse_json(row.get(4)?),
        created_at: parse_ts(row.get(5)?)?,
        updated_at: parse_ts(row.get(6)?)?,
    })
}

fn map_slide(row: &Row<'_>) -> rusqlite::Result<Slide> {
    let body_raw: String = row.get(4)?;
    Ok(Slide {
        id: row.get(0)?,
        presentation_id: row.get(1)?,
        position: row.get(2)?,
        title: row.get(3)?,
        body: serde_json::from_str(&body_raw).unwrap_or(Value::Null),
        created_at: parse_ts(row.get(5)?)?,
    })
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_ts(row.get(3)?)?,
        updated_at: parse_ts(row.get(4)?)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        position: row.get(4)?,
        created_at: parse_ts(row.get(5)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    #[test]
    fn test_presentation_roundtrip() {
        let store = store();
        let created = store
            .create_presentation("user-1", "Quarterly review", "make me a deck")
            .unwrap();

        let loaded = store.presentation(&created.id).unwrap().unwrap();
        assert_eq!(loaded.status, PresentationStatus::Generating);
        assert_eq!(loaded.user_id, "user-1");
        assert_eq!(store.presentation_owner(&created.id).unwrap().unwrap(), "user-1");
    }

    #[test]
    fn test_terminal_cas_single_winner() {
        let store = store();
        let p = store.create_presentation("u", "t", "p").unwrap();
        store.create_render_task("task-1", &p.id, "u").unwrap();

        assert!(store
            .transition_task_if_running("task-1", TaskStatus::Completed)
            .unwrap());
        // A racing observer loses and must skip side effects.
        assert!(!store
            .transition_task_if_running("task-1", TaskStatus::Completed)
            .unwrap());
        assert!(!store
            .transition_task_if_running("task-1", TaskStatus::Failed)
            .unwrap());

        let task = store.render_task("task-1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_finish_presentation_transactional() {
        let store = store();
        let p = store.create_presentation("u", "t", "p").unwrap();

        let slides = vec![
            NewSlide {
                position: 0,
                title: "Intro".to_string(),
                body: json!({"text": "hello"}),
            },
            NewSlide {
                position: 1,
                title: "Numbers".to_string(),
                body: json!({"text": "42"}),
            },
        ];
        let count = store.finish_presentation(&p.id, &slides).unwrap();
        assert_eq!(count, 2);

        let loaded = store.presentation(&p.id).unwrap().unwrap();
        assert_eq!(loaded.status, PresentationStatus::Ready);
        assert_eq!(loaded.slides_count, Some(2));

        let stored = store.slides(&p.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].title, "Intro");
        assert_eq!(stored[1].position, 1);
    }

    #[test]
    fn test_fail_generation_updates_both_rows() {
        let store = store();
        let p = store.create_presentation("u", "t", "p").unwrap();
        store.create_render_task("task-1", &p.id, "u").unwrap();

        store.fail_generation(&p.id, "task-1", "render exploded").unwrap();

        let loaded = store.presentation(&p.id).unwrap().unwrap();
        assert_eq!(loaded.status, PresentationStatus::Error);
        assert_eq!(loaded.error.as_deref(), Some("render exploded"));

        let task = store.render_task("task-1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_webhook_data_merge() {
        let store = store();
        let p = store.create_presentation("u", "t", "p").unwrap();
        store.create_render_task("task-1", &p.id, "u").unwrap();

        store
            .merge_task_webhook_data("task-1", &json!({"progress": 40}))
            .unwrap();
        store
            .merge_task_webhook_data("task-1", &json!({"current_step": "Rendering"}))
            .unwrap();

        let task = store.render_task("task-1").unwrap().unwrap();
        let data = task.webhook_data.unwrap();
        assert_eq!(data["progress"], 40);
        assert_eq!(data["current_step"], "Rendering");
    }

    #[test]
    fn test_legacy_completed_status_reads_as_ready() {
        let store = store();
        let p = store.create_presentation("u", "t", "p").unwrap();
        {
            let conn = store.lock();
            conn.execute(
                "UPDATE presentations SET status = 'completed' WHERE id = ?1",
                params![p.id],
            )
            .unwrap();
        }
        let loaded = store.presentation(&p.id).unwrap().unwrap();
        assert_eq!(loaded.status, PresentationStatus::Ready);
    }

    #[test]
    fn test_conversation_export_import_roundtrip() {
        let store = store();
        let conversation = store.create_conversation("u", "Design chat").unwrap();
        store
            .append_message(&conversation.id, "user", "hello")
            .unwrap();
        store
            .append_message(&conversation.id, "assistant", "hi there")
            .unwrap();
        store
            .append_message(&conversation.id, "user", "make a deck")
            .unwrap();

        let export = store.export_conversation(&conversation.id).unwrap();
        let imported = store.import_conversation("u2", &export).unwrap();
        let reexport = store.export_conversation(&imported.id).unwrap();

        assert_eq!(export, reexport);
        assert_eq!(reexport.messages.len(), 3);
        assert_eq!(reexport.messages[1].role, "assistant");
        assert_eq!(reexport.messages[2].content, "make a deck");
    }
}
