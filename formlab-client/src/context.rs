//! Composition root.
//!
//! Every shared piece of client state hangs off one [`AppContext`]; nothing
//! lives in module-level statics, so tests build as many isolated contexts as
//! they need.

use crate::agent::AgentApi;
use crate::api_client::HttpClient;
use crate::auth::AuthApi;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::AppError;
use crate::notifications::{NotificationCenter, Notifier};
use crate::reconciler::{ReconcilerConfig, TaskReconciler};
use crate::session::{SessionGuard, SessionPrompt};
use formlab_core::{Attachment, ChatResponse, FormlabResult, TaskRecord};
use std::sync::Arc;

pub struct AppContext {
    pub config: ClientConfig,
    pub credentials: Arc<CredentialStore>,
    pub notifications: Arc<NotificationCenter>,
    pub session: Arc<SessionGuard>,
    pub http: Arc<HttpClient>,
    pub agent: AgentApi,
    pub auth: AuthApi,
    pub reconciler: TaskReconciler,
}

impl AppContext {
    /// Wire the client from a validated config.
    pub fn from_config(config: ClientConfig, prompt: Arc<dyn SessionPrompt>) -> Result<Self, AppError> {
        config.validate()?;
        let credentials = Arc::new(CredentialStore::load(&config.credentials_path)?);
        Self::with_credentials(config, credentials, prompt)
    }

    /// Wire the client around an existing credential store.
    pub fn with_credentials(
        config: ClientConfig,
        credentials: Arc<CredentialStore>,
        prompt: Arc<dyn SessionPrompt>,
    ) -> Result<Self, AppError> {
        let notifications = Arc::new(NotificationCenter::new(&config.notifications));
        let notifier: Arc<dyn Notifier> = notifications.clone();
        let session = Arc::new(SessionGuard::new(credentials.clone(), prompt));
        let http = Arc::new(HttpClient::new(
            &config,
            credentials.clone(),
            session.clone(),
            notifier.clone(),
        )?);
        let agent = AgentApi::new(http.clone(), &config);
        let auth = AuthApi::new(http.clone());
        let reconciler = TaskReconciler::new(
            Arc::new(agent.clone()),
            notifier,
            ReconcilerConfig::from(&config.polling),
        );

        tracing::debug!(
            base_url = %http.base_url(),
            logged_in = credentials.is_logged_in(),
            "client context ready"
        );

        Ok(Self {
            config,
            credentials,
            notifications,
            session,
            http,
            agent,
            auth,
            reconciler,
        })
    }

    /// Upload a document and start tracking the ingestion task.
    pub async fn submit_ingest(&self, attachment: Attachment) -> FormlabResult<TaskRecord> {
        let submitted = self.agent.submit_ingest(attachment).await?;
        let record = TaskRecord::from(submitted);
        tracing::info!(task_id = %record.task_id, file_name = %record.display_name(), "ingest submitted");
        self.reconciler.add_task(record.clone());
        Ok(record)
    }

    /// Start tracking the task a chat turn spawned, seeded with its current
    /// record. Turns that spawned nothing return `None`.
    pub async fn track_chat_task(&self, response: &ChatResponse) -> FormlabResult<Option<TaskRecord>> {
        let task_id = match response.spawned_task() {
            Some(task_id) => task_id,
            None => return Ok(None),
        };
        let record = self.agent.task_status(task_id).await?;
        tracing::info!(
            task_id = %record.task_id,
            task_type = %record.task_type,
            status = %record.status,
            "chat spawned task"
        );
        self.reconciler.add_task(record.clone());
        Ok(Some(record))
    }

    pub fn shutdown(&self) {
        self.reconciler.stop_polling();
    }
}
