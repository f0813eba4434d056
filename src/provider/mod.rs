//! Render-service client
//!
//! Typed HTTP client for the external render service that executes
//! long-running generation tasks. The service is treated as an opaque,
//! fallible, rate-limited collaborator: requests carry bearer auth, retry
//! with exponential backoff on retryable status codes, and surface typed
//! errors otherwise.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Retry policy for retryable upstream responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,

    /// Initial delay in milliseconds; doubles per attempt
    #[serde(default = "default_initial_delay")]
    pub initial_delay: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay: u64,

    #[serde(default = "default_retry_on_status")]
    pub retry_on_status: Vec<u16>,
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    10000
}

fn default_retry_on_status() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            retry_on_status: default_retry_on_status(),
        }
    }
}

/// Connection settings for the render service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,

    /// Bearer token; omitted means unauthenticated (local stub)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_timeout() -> u64 {
    30000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9400".to_string(),
            api_key: None,
            timeout: default_timeout(),
            retry: Some(RetryConfig::default()),
        }
    }
}

/// Request to start one generation task
#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskRequest {
    pub prompt: String,
    pub slides_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outline: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Handle returned by the render service for a created task
#[derive(Debug, Clone, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Poll response for a task
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    /// Service-side status, e.g. "running" or "stopped"
    pub status: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl TaskStatusResponse {
    pub fn is_stopped(&self) -> bool {
        self.status == "stopped"
    }
}

#[derive(Debug)]
pub struct ProviderClient {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout))
            .build()?;
        Ok(Self { config, client })
    }

    fn build_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        format!("{}{}", base, path)
    }

    fn should_retry(&self, status: u16, attempt: u32) -> bool {
        if let Some(ref retry) = self.config.retry {
            if attempt + 1 < retry.max_attempts {
                return retry.retry_on_status.contains(&status);
            }
        }
        false
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        if let Some(ref retry) = self.config.retry {
            let delay = retry.initial_delay * 2u64.pow(attempt.saturating_sub(1));
            Duration::from_millis(delay.min(retry.max_delay))
        } else {
            Duration::from_millis(1000)
        }
    }

    async fn execute_with_retry(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let url = self.build_url(path);
        let max_attempts = self
            .config
            .retry
            .as_ref()
            .map(|r| r.max_attempts)
            .unwrap_or(1)
            .max(1);

        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.retry_delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts, ?delay, "Retrying render-service request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), &url);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%url, "Calling render service");

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if self.should_retry(status, attempt) {
                        last_error = Some(ProviderError::Http {
                            status,
                            message: "retryable status".to_string(),
                        });
                        continue;
                    }

                    let text = response.text().await?;
                    if !(200..300).contains(&status) {
                        return Err(ProviderError::Http {
                            status,
                            message: truncate(&text, 256),
                        });
                    }

                    let value: Value = serde_json::from_str(&text).map_err(|e| {
                        ProviderError::InvalidResponse(format!("malformed JSON body: {e}"))
                    })?;

                    info!(%url, status, "Render service call succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(%url, error = %e, "Render-service request failed");
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(ProviderError::Transport(e));
                        continue;
                    }
                    return Err(ProviderError::Transport(e));
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::InvalidResponse(
            "request failed with no response".to_string(),
        )))
    }

    /// Start a generation task on the render service
    pub async fn create_task(
        &self,
        request: &CreateTaskRequest,
    ) -> Result<TaskHandle, ProviderError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let value = self
            .execute_with_retry(reqwest::Method::POST, "/v1/tasks", Some(&body))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(format!("task handle: {e}")))
    }

    /// Query current status of a task (polling fallback path)
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, ProviderError> {
        let value = self
            .execute_with_retry(
                reqwest::Method::GET,
                &format!("/v1/tasks/{}", task_id),
                None,
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(format!("task status: {e}")))
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
