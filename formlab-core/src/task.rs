//! Asynchronous agent task records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Backend-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Lifecycle status of an asynchronous task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change that users are told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTransition {
    Succeeded,
    Failed,
}

/// Detect a `{pending|running} -> {succeeded|failed}` transition.
///
/// A missing previous status is not a transition: the task was first seen
/// already settled.
pub fn detect_transition(previous: Option<TaskStatus>, next: TaskStatus) -> Option<TaskTransition> {
    match (previous, next) {
        (Some(prev), TaskStatus::Succeeded) if !prev.is_terminal() => Some(TaskTransition::Succeeded),
        (Some(prev), TaskStatus::Failed) if !prev.is_terminal() => Some(TaskTransition::Failed),
        _ => None,
    }
}

/// Task record as returned by `GET /api/v1/agent/tasks/{id}`.
///
/// Accepts both snake_case and the backend's PascalCase column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(alias = "TaskID")]
    pub task_id: TaskId,
    #[serde(alias = "TaskType")]
    pub task_type: String,
    #[serde(alias = "Status")]
    pub status: TaskStatus,
    #[serde(default, alias = "Payload")]
    pub payload: Option<Value>,
    #[serde(default, alias = "Result")]
    pub result: Option<Value>,
    #[serde(default, alias = "ErrorMessage")]
    pub error_message: Option<String>,
    #[serde(alias = "CreatedAt", deserialize_with = "lenient_timestamp")]
    pub created_at: Timestamp,
    #[serde(default, alias = "StartedAt", deserialize_with = "lenient_optional_timestamp")]
    pub started_at: Option<Timestamp>,
    #[serde(default, alias = "FinishedAt", deserialize_with = "lenient_optional_timestamp")]
    pub finished_at: Option<Timestamp>,
}

impl TaskRecord {
    /// Interpret the raw payload according to `task_type`.
    pub fn payload(&self) -> TaskPayload {
        TaskPayload::interpret(&self.task_type, self.payload.as_ref())
    }

    /// Name shown in notifications: the file name when known, else `#id`.
    pub fn display_name(&self) -> String {
        match self.payload() {
            TaskPayload::Ingest {
                file_name: Some(name),
                ..
            } if !name.trim().is_empty() => name,
            _ => format!("#{}", self.task_id),
        }
    }
}

/// Typed view over a task's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    /// Document ingestion (`task_type = "ingest"`).
    Ingest {
        file_name: Option<String>,
        content_type: Option<String>,
        file_path: Option<String>,
    },
    /// Database change plan awaiting approval (`task_type = "db_change_plan"`).
    ChangePlan {
        message: Option<String>,
        summary: Option<String>,
        risk_level: Option<String>,
        approval_status: Option<String>,
    },
    /// Free-form payload of an unknown task type.
    Other(Value),
}

impl TaskPayload {
    pub fn interpret(task_type: &str, payload: Option<&Value>) -> Self {
        let null = Value::Null;
        let raw = payload.unwrap_or(&null);
        let text = |value: &Value, key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        match task_type {
            "ingest" => TaskPayload::Ingest {
                file_name: text(raw, "file_name").or_else(|| text(raw, "source_file_name")),
                content_type: text(raw, "content_type"),
                file_path: text(raw, "file_path"),
            },
            "db_change_plan" => {
                let plan = raw.get("plan").unwrap_or(&null);
                let approval = raw.get("approval").unwrap_or(&null);
                TaskPayload::ChangePlan {
                    message: text(raw, "message"),
                    summary: text(plan, "summary"),
                    risk_level: text(plan, "risk_level"),
                    approval_status: text(approval, "status"),
                }
            }
            _ => TaskPayload::Other(raw.clone()),
        }
    }
}

/// Response to `POST /api/v1/agent/ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmitResponse {
    pub task_id: TaskId,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    pub status: TaskStatus,
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: Timestamp,
}

fn default_task_type() -> String {
    "ingest".to_string()
}

impl From<TaskSubmitResponse> for TaskRecord {
    fn from(submitted: TaskSubmitResponse) -> Self {
        TaskRecord {
            task_id: submitted.task_id,
            payload: Some(serde_json::json!({
                "file_name": submitted.file_name,
                "file_path": submitted.file_path,
            })),
            task_type: submitted.task_type,
            status: submitted.status,
            result: None,
            error_message: None,
            created_at: submitted.created_at,
            started_at: None,
            finished_at: None,
        }
    }
}

// ============================================================================
// TIMESTAMP PARSING
// ============================================================================

/// Parse RFC 3339, or a naive ISO-8601 datetime interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

pub(crate) fn lenient_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
    }
}
