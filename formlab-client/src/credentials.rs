//! Persisted login state: tokens, user profile and the login-session id.
//!
//! Backed by a JSON file and cached in memory. Cleared wholesale on logout
//! or forced session expiry.

use formlab_core::{LoginResponse, UserProfile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    pub log_id: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: RwLock<StoredCredentials>,
}

impl CredentialStore {
    /// Open the store at `path`. A missing file means logged out.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str::<StoredCredentials>(&contents)?
        } else {
            StoredCredentials::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(state),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoredCredentials::default()),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn login_session_id(&self) -> Option<i64> {
        self.read().log_id
    }

    pub fn is_logged_in(&self) -> bool {
        self.read()
            .access_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    pub fn snapshot(&self) -> StoredCredentials {
        self.read().clone()
    }

    pub fn set_login(&self, login: &LoginResponse) -> Result<(), CredentialError> {
        let next = StoredCredentials {
            access_token: Some(login.token.access_token.clone()),
            refresh_token: login.token.refresh_token.clone(),
            user: Some(login.user.clone()),
            log_id: login.log_id,
        };
        self.save(&next)?;
        *self.write() = next;
        Ok(())
    }

    /// Set only the access token, keeping everything else.
    pub fn set_access_token(&self, token: impl Into<String>) -> Result<(), CredentialError> {
        let mut next = self.snapshot();
        next.access_token = Some(token.into());
        self.save(&next)?;
        *self.write() = next;
        Ok(())
    }

    /// Remove every persisted value and the backing file.
    pub fn clear(&self) -> Result<(), CredentialError> {
        *self.write() = StoredCredentials::default();
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn save(&self, state: &StoredCredentials) -> Result<(), CredentialError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(state)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoredCredentials> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoredCredentials> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
