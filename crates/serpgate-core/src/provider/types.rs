//! Provider wire types
//!
//! The provider speaks a task-batch envelope: requests post an array of
//! task bodies, responses nest `tasks[].result[].items[]` with status
//! codes at both the envelope and task level. `20000` means success
//! everywhere.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Envelope and task status code meaning success
pub const STATUS_OK: u32 = 20000;

/// Body-level status codes that signal rate limiting rather than a
/// permanent rejection
const STATUS_RATE_LIMITED: &[u32] = &[40202, 40209];

/// Basic-auth credentials for the provider
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub login: String,
    pub password: String,
}

impl ProviderCredentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

// Manual Debug keeps the password out of logs.
impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// One search task body. Optional fields are omitted from the wire
/// representation entirely, matching what the provider expects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl SearchRequest {
    /// Copy of this request windowed to one page
    pub fn with_page(&self, limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            ..self.clone()
        }
    }
}

/// Top-level provider response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    pub status_code: u32,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub tasks: Vec<ProviderTask>,
}

/// One task inside the response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTask {
    pub status_code: u32,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub result: Option<Vec<TaskResult>>,
}

/// Result block of a task
#[derive(Debug, Clone, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub items: Option<Vec<Value>>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

impl ProviderResponse {
    /// Extract the item rows, enforcing envelope and task status codes.
    ///
    /// A missing `result` or `items` on a successful task is an empty
    /// page, not an error.
    pub fn into_items(self) -> GatewayResult<Vec<Value>> {
        if self.status_code != STATUS_OK {
            return Err(map_body_status(self.status_code, &self.status_message));
        }

        let mut items = Vec::new();
        for task in self.tasks {
            if task.status_code != STATUS_OK {
                return Err(map_body_status(task.status_code, &task.status_message));
            }
            for result in task.result.unwrap_or_default() {
                items.extend(result.items.unwrap_or_default());
            }
        }
        Ok(items)
    }
}

/// Map a non-success body status to the right error class
pub(crate) fn map_body_status(status: u32, message: &str) -> GatewayError {
    if STATUS_RATE_LIMITED.contains(&status) {
        GatewayError::rate_limited(
            format!("provider status {status}: {message}"),
            Some(Duration::from_secs(1)),
        )
    } else {
        GatewayError::provider(status, message.to_string())
    }
}
