//! Agent chat request and response types.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default row cap sent as `top_k`.
pub const DEFAULT_TOP_K: u32 = 100;

/// How the backend handled the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Sync,
    AsyncTask,
    FollowUp,
}

/// Intent the backend classified the message as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatIntent {
    Ingest,
    Query,
    MutateDomain,
    MutateBulk,
    AdminOps,
    Clarify,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Failed,
    Skipped,
}

/// Trace of one tool invocation made while answering.
///
/// Tool input/output are free-form LLM tool payloads and stay untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTrace {
    pub tool_name: String,
    #[serde(default = "default_tool_status")]
    pub status: ToolStatus,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

fn default_tool_status() -> ToolStatus {
    ToolStatus::Ok
}

/// Terminal payload of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub mode: ChatMode,
    pub intent: ChatIntent,
    pub reply: String,
    #[serde(default)]
    pub follow_up_question: Option<String>,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub query_result: Option<Value>,
    #[serde(default)]
    pub tool_traces: Vec<ToolTrace>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub audit_id: Option<i64>,
}

impl ChatResponse {
    /// The asynchronous task this turn spawned, if any.
    pub fn spawned_task(&self) -> Option<TaskId> {
        match self.mode {
            ChatMode::AsyncTask => self.task_id,
            _ => None,
        }
    }
}

/// File attached to a chat turn or ingestion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub top_k: u32,
    pub project_scope: Vec<i64>,
    pub attachment: Option<Attachment>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            top_k: DEFAULT_TOP_K,
            project_scope: Vec::new(),
            attachment: None,
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_scope(mut self, project_ids: impl IntoIterator<Item = i64>) -> Self {
        self.project_scope = project_ids.into_iter().collect();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// JSON-encoded scope, or `None` when no scope filter applies.
    pub fn scope_json(&self) -> Option<String> {
        if self.project_scope.is_empty() {
            return None;
        }
        serde_json::to_string(&self.project_scope).ok()
    }
}
