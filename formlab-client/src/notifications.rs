//! User-facing notices.
//!
//! The HTTP layer and the task reconciler report through the [`Notifier`]
//! trait. [`NotificationCenter`] is the default sink: it keeps recent notices
//! and suppresses a repeat of the same error text shown moments ago. Task
//! transition notices opt out of that suppression: each one is a distinct
//! event even when two tasks fail with the same message.

use crate::config::NotificationConfig;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Subject to repeat suppression in [`NotificationCenter`].
    pub dedupe: bool,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            title: None,
            message: message.into(),
            created_at: Utc::now(),
            dedupe: true,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, message)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Always show this notice, even right after an identical one.
    pub fn always_show(mut self) -> Self {
        self.dedupe = false;
        self
    }
}

/// Sink for user-facing notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

struct Fingerprint {
    level: NotificationLevel,
    message: String,
    shown_at: Instant,
}

#[derive(Default)]
struct CenterState {
    recent: VecDeque<Notification>,
    fingerprints: VecDeque<Fingerprint>,
}

pub struct NotificationCenter {
    dedupe_window: Duration,
    max_cache_size: usize,
    capacity: usize,
    state: Mutex<CenterState>,
}

impl NotificationCenter {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            dedupe_window: Duration::from_millis(config.dedupe_window_ms),
            max_cache_size: config.max_cache_size.max(1),
            capacity: config.capacity.max(1),
            state: Mutex::new(CenterState::default()),
        }
    }

    /// Record a notice. Returns `false` when it was suppressed as a repeat.
    pub fn push(&self, notification: Notification) -> bool {
        let now = Instant::now();
        let mut state = self.lock();

        if notification.dedupe {
            let window = self.dedupe_window;
            state
                .fingerprints
                .retain(|f| now.saturating_duration_since(f.shown_at) < window);
            let repeated = state
                .fingerprints
                .iter()
                .any(|f| f.level == notification.level && f.message == notification.message);
            if repeated {
                tracing::debug!(text = %notification.message, "suppressing repeated notification");
                return false;
            }

            state.fingerprints.push_back(Fingerprint {
                level: notification.level,
                message: notification.message.clone(),
                shown_at: now,
            });
            while state.fingerprints.len() > self.max_cache_size {
                state.fingerprints.pop_front();
            }
        }

        log_notification(&notification);
        state.recent.push_back(notification);
        while state.recent.len() > self.capacity {
            state.recent.pop_front();
        }
        true
    }

    /// Notices currently held, oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.lock().recent.iter().cloned().collect()
    }

    /// Take every held notice, leaving the center empty.
    pub fn drain(&self) -> Vec<Notification> {
        self.lock().recent.drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, notification: Notification) {
        self.push(notification);
    }
}

fn log_notification(notification: &Notification) {
    let title = notification.title.as_deref().unwrap_or("");
    match notification.level {
        NotificationLevel::Error => {
            tracing::error!(title, text = %notification.message, "notification")
        }
        NotificationLevel::Warning => {
            tracing::warn!(title, text = %notification.message, "notification")
        }
        NotificationLevel::Info | NotificationLevel::Success => {
            tracing::info!(title, text = %notification.message, "notification")
        }
    }
}
