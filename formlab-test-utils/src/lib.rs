//! formlab Test Utilities
//!
//! Centralized test infrastructure for the formlab workspace:
//! - Proptest generators for stream events and chunk boundaries
//! - Test fixtures for task records, chat responses and logins
//! - An in-process mock backend serving envelopes and NDJSON streams
//! - Custom assertions for formlab-specific validation

pub mod mock_backend;

pub use mock_backend::{MockBackend, MockReply, RecordedRequest};

// Re-export core types for convenience
pub use formlab_core::{
    ChatIntent, ChatMode, ChatResponse, Envelope, FormlabError, FormlabResult, StreamError,
    StreamEvent, TaskId, TaskRecord, TaskStatus,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating stream traffic.

    use super::*;
    use proptest::prelude::*;

    /// Generate a ChatMode variant.
    pub fn arb_chat_mode() -> impl Strategy<Value = ChatMode> {
        prop_oneof![
            Just(ChatMode::Sync),
            Just(ChatMode::AsyncTask),
            Just(ChatMode::FollowUp),
        ]
    }

    /// Generate a ChatIntent variant.
    pub fn arb_chat_intent() -> impl Strategy<Value = ChatIntent> {
        prop_oneof![
            Just(ChatIntent::Ingest),
            Just(ChatIntent::Query),
            Just(ChatIntent::MutateDomain),
            Just(ChatIntent::MutateBulk),
            Just(ChatIntent::AdminOps),
            Just(ChatIntent::Clarify),
            Just(ChatIntent::General),
        ]
    }

    /// Reply text including multi-byte characters and JSON-significant ones.
    pub fn arb_reply_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 光固化树脂\"\\\\{}:,]{0,40}"
    }

    /// Generate a ChatResponse.
    pub fn arb_chat_response() -> impl Strategy<Value = ChatResponse> {
        (
            arb_chat_mode(),
            arb_chat_intent(),
            arb_reply_text(),
            proptest::option::of(1i64..10_000),
            any::<bool>(),
        )
            .prop_map(|(mode, intent, reply, task_id, degraded)| ChatResponse {
                mode,
                intent,
                reply,
                follow_up_question: None,
                task_id: task_id.map(TaskId),
                query_result: None,
                tool_traces: Vec::new(),
                degraded,
                retryable: false,
                audit_id: None,
            })
    }

    /// Generate a single stream event.
    pub fn arb_stream_event() -> impl Strategy<Value = StreamEvent> {
        prop_oneof![
            Just(StreamEvent::Start),
            arb_reply_text().prop_map(StreamEvent::delta),
            arb_chat_response().prop_map(StreamEvent::done),
            arb_reply_text().prop_map(StreamEvent::error),
        ]
    }

    /// A well-formed conversation: start, deltas, done.
    pub fn arb_conversation() -> impl Strategy<Value = Vec<StreamEvent>> {
        (
            prop::collection::vec(arb_reply_text(), 0..12),
            arb_chat_response(),
        )
            .prop_map(|(deltas, response)| {
                let mut events = vec![StreamEvent::Start];
                events.extend(deltas.into_iter().map(StreamEvent::delta));
                events.push(StreamEvent::done(response));
                events
            })
    }

    /// Sorted, de-duplicated cut points within `0..len`.
    pub fn arb_cut_points(len: usize) -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0..=len, 0..16).prop_map(|mut cuts| {
            cuts.sort_unstable();
            cuts.dedup();
            cuts
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    /// Encode events as an NDJSON body.
    pub fn ndjson_body(events: &[StreamEvent]) -> Vec<u8> {
        events
            .iter()
            .flat_map(|event| event.to_line().into_bytes())
            .collect()
    }

    /// Split a body at the given cut points.
    pub fn split_at_cuts(body: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let mut chunks = Vec::with_capacity(cuts.len() + 1);
        let mut start = 0;
        for &cut in cuts {
            let cut = cut.min(body.len());
            if cut > start {
                chunks.push(body[start..cut].to_vec());
                start = cut;
            }
        }
        chunks.push(body[start..].to_vec());
        chunks
    }

    pub fn sync_reply(reply: &str) -> ChatResponse {
        ChatResponse {
            mode: ChatMode::Sync,
            intent: ChatIntent::Query,
            reply: reply.to_string(),
            follow_up_question: None,
            task_id: None,
            query_result: None,
            tool_traces: Vec::new(),
            degraded: false,
            retryable: false,
            audit_id: None,
        }
    }

    /// start, one delta per fragment, done(reply = concatenation).
    pub fn streamed_reply(fragments: &[&str]) -> Vec<StreamEvent> {
        let mut events = vec![StreamEvent::Start];
        events.extend(fragments.iter().map(|f| StreamEvent::delta(*f)));
        events.push(StreamEvent::done(sync_reply(&fragments.concat())));
        events
    }

    /// Wire JSON of an ingest task.
    pub fn ingest_task_json(task_id: i64, status: TaskStatus, file_name: &str) -> Value {
        json!({
            "task_id": task_id,
            "task_type": "ingest",
            "status": status,
            "payload": {"file_name": file_name},
            "result": null,
            "error_message": null,
            "created_at": "2025-03-01T10:00:00",
        })
    }

    pub fn ingest_task(task_id: i64, status: TaskStatus, file_name: &str) -> TaskRecord {
        TaskRecord {
            task_id: TaskId(task_id),
            task_type: "ingest".to_string(),
            status,
            payload: Some(json!({"file_name": file_name})),
            result: None,
            error_message: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn failed_task(task_id: i64, error_message: &str) -> TaskRecord {
        let mut task = ingest_task(task_id, TaskStatus::Failed, "");
        task.payload = None;
        task.error_message = Some(error_message.to_string());
        task
    }

    /// Wire JSON of an extracted record awaiting review.
    pub fn review_record_json(record_id: i64, task_id: i64, file_name: &str) -> Value {
        json!({
            "record_id": record_id,
            "task_id": task_id,
            "source_file_path": format!("uploads/{}", file_name),
            "source_file_name": file_name,
            "extracted_data": {"formula_code": "F-102", "ph": 6.2},
            "field_confidences": {"formula_code": 0.97, "ph": 0.64},
            "overall_confidence": 0.81,
            "review_status": "pending_review",
            "reviewed_by_user_id": null,
            "reviewed_at": null,
            "trace_meta": null,
            "created_at": "2025-03-01T10:05:00",
        })
    }

    pub fn login_body(access_token: &str) -> Value {
        json!({
            "token": {
                "access_token": access_token,
                "refresh_token": "refresh-1",
                "token_type": "bearer",
                "expires_in": 3600,
            },
            "user": {"user_id": 1, "username": "chemist", "role": "user"},
            "log_id": 99,
        })
    }

    /// `{code: 0, msg: "", data}`
    pub fn ok_envelope(data: Value) -> Value {
        json!({"code": 0, "msg": "", "data": data})
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for formlab results.

    use super::*;

    pub fn assert_business_error<T: std::fmt::Debug>(result: &FormlabResult<T>, message: &str) {
        match result {
            Err(FormlabError::Business { message: got, .. }) => assert_eq!(got, message),
            other => panic!("Expected business error '{}', got {:?}", message, other),
        }
    }

    pub fn assert_http_status<T: std::fmt::Debug>(result: &FormlabResult<T>, status: u16) {
        match result {
            Err(FormlabError::HttpStatus { status: got, .. }) => assert_eq!(*got, status),
            other => panic!("Expected HTTP {} error, got {:?}", status, other),
        }
    }

    pub fn assert_stream_error<T: std::fmt::Debug>(result: &FormlabResult<T>, expected: &StreamError) {
        match result {
            Err(FormlabError::Stream(got)) => assert_eq!(got, expected),
            other => panic!("Expected stream error {:?}, got {:?}", expected, other),
        }
    }
}
