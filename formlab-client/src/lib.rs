//! formlab agent client library exports.

pub mod agent;
pub mod api_client;
pub mod auth;
pub mod chat_stream;
pub mod cli;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod notifications;
pub mod reconciler;
pub mod retry;
pub mod session;
pub mod telemetry;
pub mod transcript;

pub use agent::AgentApi;
pub use api_client::{FormSpec, HttpClient, RequestBody, RequestSpec, ResponseKind};
pub use auth::AuthApi;
pub use chat_stream::{ChatCanceller, ChatHandler, ChatStream};
pub use config::ClientConfig;
pub use context::AppContext;
pub use credentials::CredentialStore;
pub use error::AppError;
pub use notifications::{Notification, NotificationCenter, NotificationLevel, Notifier};
pub use reconciler::{TaskReconciler, TaskStatusFetcher};
pub use retry::{RetryPolicy, RetryState};
pub use session::{SessionGuard, SessionPrompt};
pub use transcript::{ChatMessage, ChatTranscript, MessageRole, TranscriptHandler};
