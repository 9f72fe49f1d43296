//! HTTP client layer.
//!
//! Every conventional call goes through [`HttpClient::send`]: bearer token
//! injection, per-request logging with masked headers, bounded retries on
//! transient failures, envelope unwrapping and 401 handling. Failures are
//! reported to the notifier once, at the point of failure, and still returned
//! to the caller.

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::AppError;
use crate::notifications::{Notification, Notifier};
use crate::retry::{RetryPolicy, RetryState};
use crate::session::SessionGuard;
use crate::telemetry::{masked_headers, normalize_path, truncate_payload};
use bytes::Bytes;
use formlab_core::{
    extract_error_message, status_message, Attachment, AuthError, ChatRequest, Envelope,
    FormlabError, FormlabResult,
};
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shown when the login call is rejected without a server message.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Incorrect username or password";

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// ============================================================================
// REQUEST DESCRIPTION
// ============================================================================

#[derive(Debug, Clone)]
enum FormPart {
    Text { name: String, value: String },
    File { name: String, attachment: Attachment },
}

/// Multipart form description.
///
/// `reqwest::multipart::Form` is consumed on send, so the description is kept
/// and a fresh form is built for every attempt.
#[derive(Debug, Clone, Default)]
pub struct FormSpec {
    parts: Vec<FormPart>,
}

impl FormSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            attachment,
        });
        self
    }

    /// Fields of a chat turn: `message`, `top_k`, optional `project_scope`
    /// and `file`.
    pub fn for_chat(request: &ChatRequest) -> Self {
        let mut form = Self::new()
            .text("message", request.message.clone())
            .text("top_k", request.top_k.to_string());
        if let Some(scope) = request.scope_json() {
            form = form.text("project_scope", scope);
        }
        if let Some(attachment) = &request.attachment {
            form = form.file("file", attachment.clone());
        }
        form
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.parts
            .iter()
            .map(|part| match part {
                FormPart::Text { name, .. } | FormPart::File { name, .. } => name.as_str(),
            })
            .collect()
    }

    pub fn text_value(&self, field: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name, value } if name == field => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn build(&self) -> FormlabResult<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                FormPart::File { name, attachment } => {
                    let mut file = Part::bytes(attachment.bytes.clone())
                        .file_name(attachment.file_name.clone());
                    if let Some(content_type) = &attachment.content_type {
                        file = file.mime_str(content_type).map_err(|e| {
                            FormlabError::Serialization(format!(
                                "invalid content type {}: {}",
                                content_type, e
                            ))
                        })?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

/// Request payload. A request carries JSON or a multipart form, never both.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(FormSpec),
}

impl RequestBody {
    fn preview(&self) -> String {
        match self {
            RequestBody::Empty => String::new(),
            RequestBody::Json(value) => truncate_payload(&value.to_string()),
            RequestBody::Multipart(form) => format!("multipart [{}]", form.field_names().join(", ")),
        }
    }
}

/// How the response body is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
    /// `{code, msg, data}` envelope; `data` is returned.
    #[default]
    Envelope,
    /// Raw bytes (image or CSV export); the envelope check is skipped.
    Binary,
}

/// One outbound request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
    pub response: ResponseKind,
    /// Skip the failure notification; the caller reports on its own.
    pub silent: bool,
    /// Attach the stored bearer token.
    pub with_auth: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
            response: ResponseKind::Envelope,
            silent: false,
            with_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> FormlabResult<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Append query parameters from a flat struct. `null` fields are skipped.
    pub fn query<Q: Serialize>(mut self, params: &Q) -> FormlabResult<Self> {
        if let Value::Object(fields) = serde_json::to_value(params)? {
            for (key, value) in fields {
                let text = match value {
                    Value::Null => continue,
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                self.query.push((key, text));
            }
        }
        Ok(self)
    }

    pub fn multipart(mut self, form: FormSpec) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn binary(mut self) -> Self {
        self.response = ResponseKind::Binary;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Send without a bearer token (login).
    pub fn without_auth(mut self) -> Self {
        self.with_auth = false;
        self
    }
}

enum Payload {
    Data(Value),
    Binary(Bytes),
}

impl Payload {
    fn decode<T: DeserializeOwned>(self) -> FormlabResult<T> {
        match self {
            Payload::Data(value) => Ok(serde_json::from_value(value)?),
            Payload::Binary(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    default_timeout: Duration,
    slow_request: Duration,
    retry: RetryPolicy,
    credentials: Arc<CredentialStore>,
    session: Arc<SessionGuard>,
    notifier: Arc<dyn Notifier>,
}

impl HttpClient {
    pub fn new(
        config: &ClientConfig,
        credentials: Arc<CredentialStore>,
        session: Arc<SessionGuard>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        // No client-wide timeout: chat streams run unbounded.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            default_timeout: config.request_timeout(),
            slow_request: Duration::from_millis(config.logging.slow_request_ms),
            retry: RetryPolicy::from_config(&config.retry),
            credentials,
            session,
            notifier,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn session(&self) -> &Arc<SessionGuard> {
        &self.session
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send an envelope request and decode `data` into `T`.
    pub async fn send<T: DeserializeOwned>(&self, spec: RequestSpec) -> FormlabResult<T> {
        let silent = spec.silent;
        let result = self.execute(spec).await.and_then(Payload::decode);
        if let Err(err) = &result {
            if !silent {
                self.report(err);
            }
        }
        result
    }

    /// Send a request whose response is raw bytes.
    pub async fn send_binary(&self, spec: RequestSpec) -> FormlabResult<Bytes> {
        let silent = spec.silent;
        let result = self.execute(spec.binary()).await.map(|payload| match payload {
            Payload::Binary(bytes) => bytes,
            Payload::Data(value) => Bytes::from(value.to_string()),
        });
        if let Err(err) = &result {
            if !silent {
                self.report(err);
            }
        }
        result
    }

    /// Streaming POST: bearer token, `Accept: application/x-ndjson`, no
    /// overall timeout and no retries.
    pub fn stream_request(&self, path: &str, form: &FormSpec) -> FormlabResult<reqwest::Request> {
        let mut builder = self
            .client
            .post(self.url(path))
            .header(ACCEPT, NDJSON_CONTENT_TYPE)
            .multipart(form.build()?);
        if let Some(token) = self.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        let request = builder
            .build()
            .map_err(|e| FormlabError::Config(format!("invalid request: {}", e)))?;
        tracing::debug!(
            method = %request.method(),
            path = %normalize_path(path),
            headers = %masked_headers(request.headers()),
            body = %format!("multipart [{}]", form.field_names().join(", ")),
            "opening stream"
        );
        Ok(request)
    }

    pub(crate) async fn execute_raw(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.client.execute(request).await
    }

    async fn execute(&self, spec: RequestSpec) -> FormlabResult<Payload> {
        let token = if spec.with_auth {
            self.bearer_token()
        } else {
            None
        };

        let mut state = self.retry.start();
        loop {
            match self.attempt(&spec, token.as_deref(), state).await {
                Ok(payload) => return Ok(payload),
                Err(err) => match self.retry.next(state, &err) {
                    Some(next) => {
                        tracing::warn!(
                            method = %spec.method,
                            path = %normalize_path(&spec.path),
                            attempt = next.attempt(),
                            max_retries = self.retry.max_retries,
                            delay_ms = next.delay.as_millis() as u64,
                            error = %err,
                            "retrying request"
                        );
                        tokio::time::sleep(next.delay).await;
                        state = next;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    async fn attempt(
        &self,
        spec: &RequestSpec,
        token: Option<&str>,
        state: RetryState,
    ) -> FormlabResult<Payload> {
        let request = self.build_request(spec, token)?;
        let path = normalize_path(&spec.path);
        tracing::debug!(
            method = %spec.method,
            path = %path,
            attempt = state.attempt(),
            headers = %masked_headers(request.headers()),
            body = %spec.body.preview(),
            "request"
        );

        let started = Instant::now();
        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    method = %spec.method,
                    path = %path,
                    duration_ms = started.elapsed().as_millis() as u64,
                    timeout = err.is_timeout(),
                    error = %err,
                    "request failed without response"
                );
                return Err(FormlabError::Network(err.to_string()));
            }
        };
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FormlabError::Network(e.to_string()))?;
        self.log_response(spec, &path, status, started.elapsed(), &body);

        if !(200..300).contains(&status) {
            return Err(self.status_error(status, &body, token.is_some()).await);
        }

        match spec.response {
            ResponseKind::Binary => Ok(Payload::Binary(body)),
            ResponseKind::Envelope => {
                let envelope: Envelope = serde_json::from_slice(&body)?;
                Ok(Payload::Data(envelope.into_data::<Value>()?))
            }
        }
    }

    fn build_request(&self, spec: &RequestSpec, token: Option<&str>) -> FormlabResult<reqwest::Request> {
        let mut builder = self
            .client
            .request(spec.method.clone(), self.url(&spec.path))
            .timeout(spec.timeout.unwrap_or(self.default_timeout));
        if !spec.query.is_empty() {
            builder = builder.query(&spec.query);
        }
        if spec.response == ResponseKind::Envelope {
            builder = builder.header(ACCEPT, "application/json");
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder = match &spec.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(form) => builder.multipart(form.build()?),
        };
        builder
            .build()
            .map_err(|e| FormlabError::Config(format!("invalid request: {}", e)))
    }

    async fn status_error(&self, status: u16, body: &[u8], authenticated: bool) -> FormlabError {
        let server_message = serde_json::from_slice::<Value>(body)
            .ok()
            .as_ref()
            .and_then(extract_error_message);

        if status == 401 {
            if !authenticated {
                let message =
                    server_message.unwrap_or_else(|| INVALID_CREDENTIALS_MESSAGE.to_string());
                return AuthError::InvalidCredentials(message).into();
            }
            self.session.handle_expired().await;
            return AuthError::SessionExpired.into();
        }

        FormlabError::HttpStatus {
            status,
            message: status_message(status, server_message.as_deref()),
        }
    }

    fn log_response(&self, spec: &RequestSpec, path: &str, status: u16, elapsed: Duration, body: &[u8]) {
        let duration_ms = elapsed.as_millis() as u64;
        if elapsed >= self.slow_request {
            tracing::warn!(method = %spec.method, path, status, duration_ms, "slow request");
        } else {
            tracing::info!(method = %spec.method, path, status, duration_ms, "request completed");
        }
        let preview = match spec.response {
            ResponseKind::Binary => format!("<{} bytes>", body.len()),
            ResponseKind::Envelope => truncate_payload(&String::from_utf8_lossy(body)),
        };
        tracing::debug!(status, body = %preview, "response");
    }

    fn bearer_token(&self) -> Option<String> {
        self.credentials.access_token().filter(|t| !t.is_empty())
    }

    fn report(&self, err: &FormlabError) {
        // The session prompt already told the user.
        if matches!(err, FormlabError::Auth(AuthError::SessionExpired)) {
            return;
        }
        self.notifier.notify(Notification::error(err.user_message()));
    }
}
