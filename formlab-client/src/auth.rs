//! Login and logout.

use crate::api_client::{HttpClient, RequestSpec};
use crate::credentials::CredentialStore;
use crate::error::AppError;
use formlab_core::{LoginRequest, LoginResponse};
use std::sync::Arc;

pub const LOGIN_PATH: &str = "/api/v1/auth/login";

#[derive(Clone)]
pub struct AuthApi {
    http: Arc<HttpClient>,
}

impl AuthApi {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    fn credentials(&self) -> &Arc<CredentialStore> {
        self.http.credentials()
    }

    /// Exchange a username and password for tokens.
    ///
    /// Sent without a bearer token, so a 401 here is
    /// `AuthError::InvalidCredentials` and never triggers the session-expired
    /// prompt. On success the session is persisted and the expiry guard
    /// re-armed.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AppError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let spec = RequestSpec::post(LOGIN_PATH).json(&body)?.without_auth();
        let login: LoginResponse = self.http.send(spec).await?;

        self.credentials().set_login(&login)?;
        self.http.session().rearm();
        tracing::info!(user_id = login.user.user_id, username = %login.user.username, "logged in");
        Ok(login)
    }

    /// Drop the local session.
    pub fn logout(&self) -> Result<(), AppError> {
        let user = self.credentials().user().map(|u| u.username);
        self.credentials().clear()?;
        tracing::info!(username = user.as_deref().unwrap_or(""), "logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials().is_logged_in()
    }
}
