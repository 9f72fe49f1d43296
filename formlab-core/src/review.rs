//! Human review of extracted ingestion records.

use crate::error::{FormlabError, FormlabResult};
use crate::task::{lenient_optional_timestamp, lenient_timestamp, TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Longest review comment the backend accepts.
pub const MAX_REVIEW_COMMENT_CHARS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
    Modified,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::PendingReview => "pending_review",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Modified => "modified",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision a reviewer takes on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approved,
    Rejected,
    Modified,
}

/// Extracted record as returned by `GET /api/v1/agent/review`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(alias = "RecordID")]
    pub record_id: i64,
    #[serde(default, alias = "TaskID_FK")]
    pub task_id: Option<TaskId>,
    #[serde(alias = "SourceFilePath")]
    pub source_file_path: String,
    #[serde(default, alias = "SourceFileName")]
    pub source_file_name: Option<String>,
    #[serde(default, alias = "ExtractedData")]
    pub extracted_data: Map<String, Value>,
    #[serde(default, alias = "FieldConfidences")]
    pub field_confidences: Option<HashMap<String, f64>>,
    #[serde(default, alias = "OverallConfidence")]
    pub overall_confidence: Option<f64>,
    #[serde(alias = "ReviewStatus")]
    pub review_status: ReviewStatus,
    #[serde(default, alias = "ReviewedByUserID_FK")]
    pub reviewed_by_user_id: Option<i64>,
    #[serde(default, alias = "ReviewedAt", deserialize_with = "lenient_optional_timestamp")]
    pub reviewed_at: Option<Timestamp>,
    #[serde(default, alias = "TraceMeta")]
    pub trace_meta: Option<Value>,
    #[serde(alias = "CreatedAt", deserialize_with = "lenient_timestamp")]
    pub created_at: Timestamp,
}

impl ReviewRecord {
    pub fn is_pending(&self) -> bool {
        self.review_status == ReviewStatus::PendingReview
    }

    /// File name when known, else the last segment of the source path.
    pub fn display_name(&self) -> &str {
        match self.source_file_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self
                .source_file_path
                .rsplit(|c: char| c == '/' || c == '\\')
                .next()
                .unwrap_or(&self.source_file_path),
        }
    }
}

/// One page of review records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPage {
    #[serde(default)]
    pub items: Vec<ReviewRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Filters for the review list. Unset fields are left off the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_status: Option<ReviewStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl ReviewListParams {
    pub fn pending() -> Self {
        Self {
            review_status: Some(ReviewStatus::PendingReview),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Body of `PUT /api/v1/agent/review/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewUpdateRequest {
    pub action: ReviewAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ReviewUpdateRequest {
    pub fn approve() -> Self {
        Self {
            action: ReviewAction::Approved,
            modified_data: None,
            comment: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            action: ReviewAction::Rejected,
            modified_data: None,
            comment: None,
        }
    }

    /// Approve with corrected data replacing the extraction.
    pub fn modify(data: Map<String, Value>) -> Self {
        Self {
            action: ReviewAction::Modified,
            modified_data: Some(data),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Reject requests the backend would refuse.
    pub fn validate(&self) -> FormlabResult<()> {
        if self.action == ReviewAction::Modified
            && self.modified_data.as_ref().map_or(true, Map::is_empty)
        {
            return Err(FormlabError::Validation(
                "modified_data is required when action=modified".to_string(),
            ));
        }
        if let Some(comment) = &self.comment {
            if comment.chars().count() > MAX_REVIEW_COMMENT_CHARS {
                return Err(FormlabError::Validation(format!(
                    "review comment exceeds {} characters",
                    MAX_REVIEW_COMMENT_CHARS
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewUpdateResponse {
    pub record_id: i64,
    pub review_status: ReviewStatus,
    #[serde(default)]
    pub reviewed_by_user_id: Option<i64>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub reviewed_at: Timestamp,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Outcome of writing approved data to the domain tables.
    #[serde(default)]
    pub persist_result: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_accepts_backend_column_names() {
        let record: ReviewRecord = serde_json::from_value(json!({
            "RecordID": 12,
            "TaskID_FK": 41,
            "SourceFilePath": "uploads/2025/batch-7.xlsx",
            "ExtractedData": {"formula_code": "F-102"},
            "FieldConfidences": {"formula_code": 0.92},
            "ReviewStatus": "pending_review",
            "CreatedAt": "2025-03-01 10:00:00",
        }))
        .unwrap();
        assert_eq!(record.task_id, Some(TaskId(41)));
        assert!(record.is_pending());
        assert_eq!(record.display_name(), "batch-7.xlsx");
        assert_eq!(record.extracted_data["formula_code"], json!("F-102"));
        assert!(record.reviewed_at.is_none());
    }

    #[test]
    fn test_list_params_skip_unset_filters() {
        let params = ReviewListParams::pending().page(2, 20);
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"page": 2, "page_size": 20, "review_status": "pending_review"})
        );
        assert_eq!(serde_json::to_value(ReviewListParams::default()).unwrap(), json!({}));
    }

    #[test]
    fn test_modify_requires_data() {
        assert!(ReviewUpdateRequest::approve().validate().is_ok());
        let empty = ReviewUpdateRequest::modify(Map::new());
        assert!(matches!(empty.validate(), Err(FormlabError::Validation(_))));

        let mut data = Map::new();
        data.insert("ph".to_string(), json!(6.5));
        let request = ReviewUpdateRequest::modify(data).with_comment("fixed pH");
        assert!(request.validate().is_ok());
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"action": "modified", "modified_data": {"ph": 6.5}, "comment": "fixed pH"})
        );
    }

    #[test]
    fn test_comment_length_is_capped() {
        let request = ReviewUpdateRequest::reject().with_comment("x".repeat(MAX_REVIEW_COMMENT_CHARS + 1));
        assert!(matches!(request.validate(), Err(FormlabError::Validation(_))));
    }
}
