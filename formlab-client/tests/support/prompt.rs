use async_trait::async_trait;
use formlab_client::SessionPrompt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Session prompt that counts how often it was shown.
#[derive(Default)]
pub struct CountingPrompt {
    pub delay: Duration,
    confirms: AtomicUsize,
    redirects: AtomicUsize,
}

impl CountingPrompt {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn confirms(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionPrompt for CountingPrompt {
    async fn confirm_session_expired(&self) -> bool {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        true
    }

    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}
