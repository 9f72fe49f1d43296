//! Session-expiry handling.
//!
//! The first 401 on an authenticated request claims the guard and runs the
//! prompt. Whatever the user answers, credentials are cleared and the user is
//! sent back to login. The guard stays claimed until a login succeeds, so
//! stragglers that were issued with the old token stay quiet.

use crate::credentials::CredentialStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// User-facing side of session expiry.
#[async_trait]
pub trait SessionPrompt: Send + Sync {
    /// Show the blocking "session expired" confirmation. `true` = confirmed.
    async fn confirm_session_expired(&self) -> bool;

    /// Navigate to the login entry point.
    fn redirect_to_login(&self);
}

pub struct SessionGuard {
    claimed: AtomicBool,
    credentials: Arc<CredentialStore>,
    prompt: Arc<dyn SessionPrompt>,
}

impl SessionGuard {
    pub fn new(credentials: Arc<CredentialStore>, prompt: Arc<dyn SessionPrompt>) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            credentials,
            prompt,
        }
    }

    /// Handle a 401 on an authenticated request.
    ///
    /// Returns `true` for the one caller that ran the prompt.
    pub async fn handle_expired(&self) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("session expiry already being handled");
            return false;
        }

        tracing::warn!("session expired, prompting for login");
        let confirmed = self.prompt.confirm_session_expired().await;
        tracing::info!(confirmed, "session expiry prompt closed");

        if let Err(err) = self.credentials.clear() {
            tracing::error!(error = %err, "failed to clear credentials after session expiry");
        }
        self.prompt.redirect_to_login();
        true
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Re-arm after a successful login.
    pub fn rearm(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}
