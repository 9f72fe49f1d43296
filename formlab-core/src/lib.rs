//! formlab Core - Wire Types
//!
//! Data shapes exchanged with the formulation database backend, the NDJSON
//! chat stream decoder, and the error taxonomy shared by every crate.
//! Nothing in this crate touches the network.

pub mod auth;
pub mod chat;
pub mod envelope;
pub mod error;
pub mod review;
pub mod stream;
pub mod task;

pub use auth::{LoginRequest, LoginResponse, TokenPair, UserProfile};
pub use chat::{
    Attachment, ChatIntent, ChatMode, ChatRequest, ChatResponse, ToolStatus, ToolTrace,
    DEFAULT_TOP_K,
};
pub use envelope::{extract_error_message, Envelope, SUCCESS_CODES};
pub use error::{
    is_retryable_status, status_message, AuthError, FormlabError, FormlabResult, StreamError,
    NETWORK_FAILURE_MESSAGE, RETRYABLE_STATUSES,
};
pub use review::{
    ReviewAction, ReviewListParams, ReviewPage, ReviewRecord, ReviewStatus, ReviewUpdateRequest,
    ReviewUpdateResponse, MAX_REVIEW_COMMENT_CHARS,
};
pub use stream::{decode_all, parse_line, NdjsonDecoder, StreamEvent, DEFAULT_STREAM_ERROR};
pub use task::{
    detect_transition, parse_timestamp, TaskId, TaskPayload, TaskRecord, TaskStatus,
    TaskSubmitResponse, TaskTransition, Timestamp,
};
