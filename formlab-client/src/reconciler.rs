//! Task polling reconciler.
//!
//! Tracks outstanding agent tasks and keeps their status current. A tick
//! fetches every pending/running task concurrently and waits for all of them;
//! a task already being fetched is skipped. A status change from
//! pending/running to succeeded/failed produces exactly one notification.
//!
//! The polling loop runs only while something is outstanding. Its interval
//! is recomputed every tick from panel visibility, and a visibility change
//! wakes the loop so the new cadence applies at once.
//!
//! Locks guard plain data and are never held across an await.

use crate::config::PollingConfig;
use crate::notifications::{Notification, NotificationLevel, Notifier};
use async_trait::async_trait;
use formlab_core::{detect_transition, FormlabResult, TaskId, TaskRecord, TaskStatus, TaskTransition};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const TASK_COMPLETED_TITLE: &str = "Agent Task Completed";
pub const TASK_FAILED_TITLE: &str = "Agent Task Failed";

/// Source of fresh task records.
#[async_trait]
pub trait TaskStatusFetcher: Send + Sync {
    async fn fetch_task(&self, task_id: TaskId) -> FormlabResult<TaskRecord>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub fast_interval: Duration,
    pub slow_interval: Duration,
    pub terminal_retention: Duration,
    pub max_tracked_tasks: usize,
}

impl From<&PollingConfig> for ReconcilerConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            fast_interval: Duration::from_millis(config.fast_interval_ms),
            slow_interval: Duration::from_millis(config.slow_interval_ms),
            terminal_retention: Duration::from_millis(config.terminal_retention_ms),
            max_tracked_tasks: config.max_tracked_tasks.max(1),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

// ============================================================================
// STATE
// ============================================================================

struct TrackedTask {
    record: TaskRecord,
    /// When the registry first held this task in a terminal status.
    settled_at: Option<Instant>,
}

#[derive(Default)]
struct ReconcilerState {
    /// Newest first.
    registry: Vec<TrackedTask>,
    snapshot: HashMap<TaskId, TaskStatus>,
    in_flight: HashSet<TaskId>,
    loop_handle: Option<JoinHandle<()>>,
    /// Bumped per spawned loop so a stale loop never clears a newer handle.
    loop_generation: u64,
}

impl ReconcilerState {
    fn upsert(&mut self, record: TaskRecord, now: Instant) {
        let terminal = record.status.is_terminal();
        match self
            .registry
            .iter_mut()
            .find(|t| t.record.task_id == record.task_id)
        {
            Some(tracked) => {
                tracked.settled_at = match (terminal, tracked.settled_at) {
                    (true, Some(at)) => Some(at),
                    (true, None) => Some(now),
                    (false, _) => None,
                };
                tracked.record = record;
            }
            None => self.registry.insert(
                0,
                TrackedTask {
                    record,
                    settled_at: terminal.then_some(now),
                },
            ),
        }
    }

    fn running_ids(&self) -> Vec<TaskId> {
        self.registry
            .iter()
            .filter(|t| !t.record.status.is_terminal())
            .map(|t| t.record.task_id)
            .collect()
    }

    /// Drop terminal tasks past retention, then the oldest-settled terminal
    /// tasks while over the cap. Outstanding tasks are never evicted.
    fn evict(&mut self, now: Instant, config: &ReconcilerConfig) -> usize {
        let before = self.registry.len();
        self.registry.retain(|t| match t.settled_at {
            Some(at) => now.saturating_duration_since(at) < config.terminal_retention,
            None => true,
        });

        while self.registry.len() > config.max_tracked_tasks {
            let oldest = self
                .registry
                .iter()
                .enumerate()
                .filter_map(|(index, t)| t.settled_at.map(|at| (index, at)))
                .min_by_key(|(_, at)| *at)
                .map(|(index, _)| index);
            match oldest {
                Some(index) => {
                    self.registry.remove(index);
                }
                None => break,
            }
        }

        let kept: HashSet<TaskId> = self.registry.iter().map(|t| t.record.task_id).collect();
        self.snapshot.retain(|id, _| kept.contains(id));
        before - self.registry.len()
    }

    fn loop_active(&self) -> bool {
        self.loop_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

struct Shared {
    fetcher: Arc<dyn TaskStatusFetcher>,
    notifier: Arc<dyn Notifier>,
    config: ReconcilerConfig,
    state: Mutex<ReconcilerState>,
    polling_now: AtomicBool,
    panel_visible: AtomicBool,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ReconcilerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn interval(&self) -> Duration {
        if self.panel_visible.load(Ordering::Acquire) {
            self.config.fast_interval
        } else {
            self.config.slow_interval
        }
    }
}

/// Removes a task from the in-flight set when its fetch ends, even if the
/// fetch future is dropped.
struct InFlight<'a> {
    shared: &'a Shared,
    task_id: TaskId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.shared.lock().in_flight.remove(&self.task_id);
    }
}

struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct TaskReconciler {
    shared: Arc<Shared>,
}

impl TaskReconciler {
    pub fn new(
        fetcher: Arc<dyn TaskStatusFetcher>,
        notifier: Arc<dyn Notifier>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                fetcher,
                notifier,
                config,
                state: Mutex::new(ReconcilerState::default()),
                polling_now: AtomicBool::new(false),
                panel_visible: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        }
    }

    /// Track a task. Seeds its snapshot and starts polling if it is
    /// outstanding.
    pub fn add_task(&self, record: TaskRecord) {
        let outstanding = !record.status.is_terminal();
        {
            let mut state = self.shared.lock();
            let now = Instant::now();
            state.snapshot.insert(record.task_id, record.status);
            tracing::debug!(task_id = %record.task_id, status = %record.status, "tracking task");
            state.upsert(record, now);
            state.evict(now, &self.shared.config);
        }
        if outstanding {
            self.start_polling();
        }
    }

    /// Fetch one task and reconcile it.
    ///
    /// Returns `None` when the task is already being fetched or the fetch
    /// failed. Failures are logged, never surfaced, and never mark the task
    /// failed locally.
    pub async fn sync_task(&self, task_id: TaskId) -> Option<TaskRecord> {
        sync_task(&self.shared, task_id).await
    }

    /// One polling tick over every outstanding task.
    pub async fn poll_running_tasks(&self) {
        poll_running_tasks(&self.shared).await
    }

    /// Start the polling loop if anything is outstanding and no loop runs.
    pub fn start_polling(&self) {
        let mut state = self.shared.lock();
        if state.loop_active() || state.running_ids().is_empty() {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(error = %err, "no async runtime, task polling not started");
                return;
            }
        };
        tracing::debug!(interval_ms = self.shared.interval().as_millis() as u64, "task polling started");
        state.loop_generation += 1;
        let generation = state.loop_generation;
        state.loop_handle = Some(runtime.spawn(run_loop(self.shared.clone(), generation)));
    }

    pub fn stop_polling(&self) {
        let mut state = self.shared.lock();
        state.loop_generation += 1;
        if let Some(handle) = state.loop_handle.take() {
            handle.abort();
            tracing::debug!("task polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock().loop_active()
    }

    /// Switch cadence. Wakes the loop so the new interval applies now.
    pub fn set_panel_visible(&self, visible: bool) {
        let previous = self.shared.panel_visible.swap(visible, Ordering::AcqRel);
        if previous != visible {
            self.shared.wake.notify_one();
        }
        self.start_polling();
    }

    pub fn is_panel_visible(&self) -> bool {
        self.shared.panel_visible.load(Ordering::Acquire)
    }

    /// Interval the next tick waits for.
    pub fn current_interval(&self) -> Duration {
        self.shared.interval()
    }

    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.shared
            .lock()
            .registry
            .iter()
            .map(|t| t.record.clone())
            .collect()
    }

    pub fn running_tasks(&self) -> Vec<TaskRecord> {
        self.shared
            .lock()
            .registry
            .iter()
            .filter(|t| !t.record.status.is_terminal())
            .map(|t| t.record.clone())
            .collect()
    }

    pub fn task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.shared
            .lock()
            .registry
            .iter()
            .find(|t| t.record.task_id == task_id)
            .map(|t| t.record.clone())
    }

    /// Last observed status, as used for transition detection.
    pub fn observed_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.shared.lock().snapshot.get(&task_id).copied()
    }

    pub fn remove_task(&self, task_id: TaskId) {
        let mut state = self.shared.lock();
        state.registry.retain(|t| t.record.task_id != task_id);
        state.snapshot.remove(&task_id);
    }

    /// Apply retention now. Returns how many tasks were evicted.
    pub fn evict_settled(&self) -> usize {
        self.shared.lock().evict(Instant::now(), &self.shared.config)
    }
}

async fn run_loop(shared: Arc<Shared>, generation: u64) {
    loop {
        let interval = shared.interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shared.wake.notified() => {
                tracing::debug!(interval_ms = shared.interval().as_millis() as u64, "polling cadence changed");
                continue;
            }
        }

        poll_running_tasks(&shared).await;

        let mut state = shared.lock();
        if state.loop_generation != generation {
            return;
        }
        if state.running_ids().is_empty() {
            // Cleared under the lock so `start_polling` never sees a loop
            // that is about to exit.
            state.loop_handle = None;
            tracing::debug!("no outstanding tasks, task polling stopped");
            return;
        }
    }
}

async fn poll_running_tasks(shared: &Shared) {
    if shared
        .polling_now
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }
    let _tick = TickGuard(&shared.polling_now);

    let task_ids = shared.lock().running_ids();
    if task_ids.is_empty() {
        return;
    }

    tracing::debug!(count = task_ids.len(), "polling outstanding tasks");
    futures_util::future::join_all(task_ids.into_iter().map(|id| sync_task(shared, id))).await;

    let evicted = shared.lock().evict(Instant::now(), &shared.config);
    if evicted > 0 {
        tracing::debug!(evicted, "evicted settled tasks");
    }
}

async fn sync_task(shared: &Shared, task_id: TaskId) -> Option<TaskRecord> {
    if !shared.lock().in_flight.insert(task_id) {
        tracing::debug!(task_id = %task_id, "task already being fetched");
        return None;
    }
    let _in_flight = InFlight { shared, task_id };

    let latest = match shared.fetcher.fetch_task(task_id).await {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(task_id = %task_id, error = %err, "failed to sync agent task");
            return None;
        }
    };

    let transition = {
        let mut state = shared.lock();
        let previous = state.snapshot.get(&task_id).copied();
        state.upsert(latest.clone(), Instant::now());
        state.snapshot.insert(task_id, latest.status);
        detect_transition(previous, latest.status)
    };

    if let Some(transition) = transition {
        tracing::info!(task_id = %task_id, status = %latest.status, "agent task settled");
        shared.notifier.notify(transition_notification(&latest, transition));
    }
    Some(latest)
}

fn transition_notification(task: &TaskRecord, transition: TaskTransition) -> Notification {
    let name = task.display_name();
    match transition {
        TaskTransition::Succeeded => Notification::new(
            NotificationLevel::Success,
            format!("Task {} completed successfully", name),
        )
        .with_title(TASK_COMPLETED_TITLE)
        .always_show(),
        TaskTransition::Failed => {
            let message = task
                .error_message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("Task {} failed", name));
            Notification::new(NotificationLevel::Error, message)
                .with_title(TASK_FAILED_TITLE)
                .always_show()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, status: TaskStatus) -> TaskRecord {
        serde_json::from_value(json!({
            "task_id": id,
            "task_type": "ingest",
            "status": status,
            "payload": {"file_name": format!("doc-{}.pdf", id)},
            "created_at": "2025-03-01T10:00:00",
        }))
        .unwrap()
    }

    fn config(retention_ms: u64, cap: usize) -> ReconcilerConfig {
        ReconcilerConfig {
            terminal_retention: Duration::from_millis(retention_ms),
            max_tracked_tasks: cap,
            ..ReconcilerConfig::default()
        }
    }

    #[test]
    fn test_upsert_inserts_newest_first() {
        let mut state = ReconcilerState::default();
        let now = Instant::now();
        state.upsert(record(1, TaskStatus::Pending), now);
        state.upsert(record(2, TaskStatus::Running), now);
        state.upsert(record(1, TaskStatus::Succeeded), now);
        let ids: Vec<i64> = state.registry.iter().map(|t| t.record.task_id.0).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(state.running_ids(), vec![TaskId(2)]);
        assert!(state.registry[1].settled_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_evicts_only_settled_tasks() {
        let config = config(60_000, 10);
        let mut state = ReconcilerState::default();
        let start = Instant::now();
        state.upsert(record(1, TaskStatus::Succeeded), start);
        state.upsert(record(2, TaskStatus::Pending), start);
        state.snapshot.insert(TaskId(1), TaskStatus::Succeeded);

        assert_eq!(state.evict(start + Duration::from_millis(59_999), &config), 0);
        assert_eq!(state.evict(start + Duration::from_millis(60_000), &config), 1);
        assert_eq!(state.running_ids(), vec![TaskId(2)]);
        assert!(state.snapshot.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_evicts_oldest_settled_first() {
        let config = config(600_000, 2);
        let mut state = ReconcilerState::default();
        let start = Instant::now();
        state.upsert(record(1, TaskStatus::Failed), start);
        state.upsert(record(2, TaskStatus::Succeeded), start + Duration::from_secs(1));
        state.upsert(record(3, TaskStatus::Running), start + Duration::from_secs(2));
        state.upsert(record(4, TaskStatus::Pending), start + Duration::from_secs(3));

        state.evict(start + Duration::from_secs(4), &config);
        let ids: Vec<i64> = state.registry.iter().map(|t| t.record.task_id.0).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_failure_notification_prefers_server_message() {
        let mut task = record(9, TaskStatus::Failed);
        task.error_message = Some("PDF is encrypted".to_string());
        let notice = transition_notification(&task, TaskTransition::Failed);
        assert_eq!(notice.message, "PDF is encrypted");
        assert_eq!(notice.title.as_deref(), Some(TASK_FAILED_TITLE));

        task.error_message = None;
        let notice = transition_notification(&task, TaskTransition::Failed);
        assert_eq!(notice.message, "Task doc-9.pdf failed");
    }

    #[test]
    fn test_success_notification_uses_display_name() {
        let mut task = record(3, TaskStatus::Succeeded);
        task.payload = None;
        let notice = transition_notification(&task, TaskTransition::Succeeded);
        assert_eq!(notice.message, "Task #3 completed successfully");
        assert_eq!(notice.level, NotificationLevel::Success);
        assert_eq!(notice.title.as_deref(), Some(TASK_COMPLETED_TITLE));
    }
}
