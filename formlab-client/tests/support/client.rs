use formlab_client::{ClientConfig, CredentialStore, HttpClient, Notifier, SessionGuard};
use std::sync::Arc;
use std::time::Duration;

use super::test_notifier_support::RecordingNotifier;
use super::test_prompt_support::CountingPrompt;

pub struct TestClient {
    pub http: Arc<HttpClient>,
    pub credentials: Arc<CredentialStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub prompt: Arc<CountingPrompt>,
    pub config: ClientConfig,
}

/// Defaults with a 10 ms retry base delay.
pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::for_base_url(base_url, "unused-credentials.json");
    config.retry.base_delay_ms = 10;
    config
}

pub fn test_client(base_url: &str, token: Option<&str>) -> TestClient {
    test_client_with(test_config(base_url), token, CountingPrompt::slow(Duration::from_millis(50)))
}

pub fn test_client_with(config: ClientConfig, token: Option<&str>, prompt: CountingPrompt) -> TestClient {
    let credentials = Arc::new(CredentialStore::in_memory());
    if let Some(token) = token {
        credentials.set_access_token(token).expect("set token");
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let prompt = Arc::new(prompt);
    let session = Arc::new(SessionGuard::new(credentials.clone(), prompt.clone()));
    let sink: Arc<dyn Notifier> = notifier.clone();
    let http = Arc::new(
        HttpClient::new(&config, credentials.clone(), session, sink).expect("build http client"),
    );
    TestClient {
        http,
        credentials,
        notifier,
        prompt,
        config,
    }
}
