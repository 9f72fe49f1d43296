//! Agent endpoints: ingestion, task status, review and chat.

use crate::api_client::{FormSpec, HttpClient, RequestSpec};
use crate::chat_stream::ChatStream;
use crate::config::ClientConfig;
use crate::reconciler::TaskStatusFetcher;
use async_trait::async_trait;
use formlab_core::{
    Attachment, ChatRequest, ChatResponse, FormlabResult, ReviewListParams, ReviewPage,
    ReviewUpdateRequest, ReviewUpdateResponse, TaskId, TaskRecord, TaskSubmitResponse,
};
use std::sync::Arc;
use std::time::Duration;

pub const INGEST_PATH: &str = "/api/v1/agent/ingest";
pub const CHAT_PATH: &str = "/api/v1/agent/chat";
pub const CHAT_STREAM_PATH: &str = "/api/v1/agent/chat/stream";
pub const REVIEW_PATH: &str = "/api/v1/agent/review";

pub fn task_path(task_id: TaskId) -> String {
    format!("/api/v1/agent/tasks/{}", task_id)
}

pub fn review_path(record_id: i64) -> String {
    format!("{}/{}", REVIEW_PATH, record_id)
}

#[derive(Clone)]
pub struct AgentApi {
    http: Arc<HttpClient>,
    chat_timeout: Duration,
    poll_timeout: Duration,
}

impl AgentApi {
    pub fn new(http: Arc<HttpClient>, config: &ClientConfig) -> Self {
        Self {
            http,
            chat_timeout: config.chat_timeout(),
            poll_timeout: config.poll_timeout(),
        }
    }

    /// Upload a document for background ingestion.
    pub async fn submit_ingest(&self, attachment: Attachment) -> FormlabResult<TaskSubmitResponse> {
        let spec = RequestSpec::post(INGEST_PATH).multipart(FormSpec::new().file("file", attachment));
        self.http.send(spec).await
    }

    /// Fetch one task. Short timeout; failures are not notified because the
    /// poller retries on its next tick.
    pub async fn task_status(&self, task_id: TaskId) -> FormlabResult<TaskRecord> {
        let spec = RequestSpec::get(task_path(task_id))
            .timeout(self.poll_timeout)
            .silent();
        self.http.send(spec).await
    }

    /// Page through extracted records awaiting or past review.
    pub async fn list_reviews(&self, params: &ReviewListParams) -> FormlabResult<ReviewPage> {
        let spec = RequestSpec::get(REVIEW_PATH).query(params)?;
        self.http.send(spec).await
    }

    /// Approve, reject or correct one extracted record.
    pub async fn review_record(
        &self,
        record_id: i64,
        request: &ReviewUpdateRequest,
    ) -> FormlabResult<ReviewUpdateResponse> {
        request.validate()?;
        let spec = RequestSpec::put(review_path(record_id)).json(request)?;
        let response: ReviewUpdateResponse = self.http.send(spec).await?;
        tracing::info!(
            record_id,
            review_status = %response.review_status,
            "review recorded"
        );
        Ok(response)
    }

    /// Non-streaming chat turn.
    pub async fn chat(&self, request: &ChatRequest) -> FormlabResult<ChatResponse> {
        let spec = RequestSpec::post(CHAT_PATH)
            .multipart(FormSpec::for_chat(request))
            .timeout(self.chat_timeout);
        self.http.send(spec).await
    }

    /// Open a streaming chat turn.
    pub async fn stream_chat(&self, request: &ChatRequest) -> FormlabResult<ChatStream> {
        ChatStream::open(&self.http, CHAT_STREAM_PATH, request).await
    }
}

#[async_trait]
impl TaskStatusFetcher for AgentApi {
    async fn fetch_task(&self, task_id: TaskId) -> FormlabResult<TaskRecord> {
        self.task_status(task_id).await
    }
}
