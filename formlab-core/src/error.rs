//! Error types for formlab client operations

use thiserror::Error;

/// Fixed text shown when a request never produced a response.
pub const NETWORK_FAILURE_MESSAGE: &str =
    "Network request failed, please check network connection";

/// Streaming chat errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Chat stream request failed with status {0}")]
    HttpStatus(u16),

    #[error("Chat stream response has no readable body")]
    EmptyBody,

    #[error("{0}")]
    Server(String),

    #[error("Chat stream done event carried no final response")]
    MissingFinalResponse,

    #[error("Chat stream ended without final response")]
    EndedWithoutResult,

    #[error("Chat stream transport failed: {0}")]
    Transport(String),

    #[error("Chat stream cancelled")]
    Cancelled,
}

/// Authentication errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A request carrying a bearer token was rejected with 401.
    #[error("Login session expired, please login again")]
    SessionExpired,

    /// The login call itself was rejected.
    #[error("{0}")]
    InvalidCredentials(String),
}

/// Master error type for all formlab errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormlabError {
    /// Transport failure: no response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response. `message` is the user-facing text.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// 2xx transport with a failure code inside the envelope.
    #[error("{message}")]
    Business { code: i64, message: String },

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),

    /// Request rejected before it was sent.
    #[error("{0}")]
    Validation(String),
}

impl FormlabError {
    /// Text suitable for a user-facing notice.
    pub fn user_message(&self) -> String {
        match self {
            FormlabError::Network(_) => NETWORK_FAILURE_MESSAGE.to_string(),
            FormlabError::HttpStatus { message, .. } => message.clone(),
            FormlabError::Business { message, .. } => message.clone(),
            FormlabError::Stream(err) => err.to_string(),
            FormlabError::Auth(err) => err.to_string(),
            FormlabError::Serialization(_) => "Unexpected response from server".to_string(),
            FormlabError::Config(reason) => reason.clone(),
            FormlabError::Validation(reason) => reason.clone(),
        }
    }

    /// Whether the failure class is eligible for the retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            FormlabError::Network(_) => true,
            FormlabError::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FormlabError::HttpStatus { status, .. } => Some(*status),
            FormlabError::Stream(StreamError::HttpStatus(status)) => Some(*status),
            FormlabError::Auth(_) => Some(401),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FormlabError {
    fn from(err: serde_json::Error) -> Self {
        FormlabError::Serialization(err.to_string())
    }
}

/// Statuses that are safe to re-issue.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Map an HTTP status to the message shown to the user.
///
/// `server_message` is the `detail`/`msg` text extracted from the response
/// body, used where the status has no fixed wording.
pub fn status_message(status: u16, server_message: Option<&str>) -> String {
    let server = server_message.map(str::trim).filter(|m| !m.is_empty());
    match status {
        403 => "No permission to access this resource".to_string(),
        404 => "Requested resource does not exist".to_string(),
        408 => "Request timed out".to_string(),
        422 => server.unwrap_or("Validation failed").to_string(),
        429 => "Too many requests, please try again later".to_string(),
        500 => server.unwrap_or("Internal server error").to_string(),
        502 => "Bad gateway".to_string(),
        503 => "Service temporarily unavailable".to_string(),
        504 => "Gateway timeout".to_string(),
        s if s >= 500 => server.unwrap_or("Server error").to_string(),
        s => server
            .map(str::to_string)
            .unwrap_or_else(|| format!("Connection error {}", s)),
    }
}

/// Result type alias for formlab operations.
pub type FormlabResult<T> = Result<T, FormlabError>;

// =============================================================================
// TESTS
// =============================================================================
