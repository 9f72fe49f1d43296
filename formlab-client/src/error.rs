//! Error types for the client binary and its composition root.

use crate::config::ConfigError;
use crate::credentials::CredentialError;
use formlab_core::FormlabError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] FormlabError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("{0}")]
    Usage(String),
}

impl AppError {
    /// Text printed to the terminal on exit.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}
