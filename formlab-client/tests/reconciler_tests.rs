//! Task polling reconciler: transitions, dedup and cadence.

use formlab_client::config::NotificationConfig;
use formlab_client::reconciler::{ReconcilerConfig, TASK_COMPLETED_TITLE, TASK_FAILED_TITLE};
use formlab_client::{NotificationCenter, NotificationLevel, TaskReconciler};
use formlab_core::{FormlabError, TaskId, TaskStatus};
use formlab_test_utils::fixtures::{failed_task, ingest_task};
use std::sync::Arc;
use std::time::Duration;

#[path = "support/notifier.rs"]
mod test_notifier_support;
#[path = "support/fetcher.rs"]
mod test_fetcher_support;
use test_fetcher_support::ScriptedFetcher;
use test_notifier_support::RecordingNotifier;

const ID: TaskId = TaskId(1);

fn reconciler_with(
    fetcher: &Arc<ScriptedFetcher>,
    config: ReconcilerConfig,
) -> (TaskReconciler, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let reconciler = TaskReconciler::new(fetcher.clone(), notifier.clone(), config);
    (reconciler, notifier)
}

fn reconciler(fetcher: &Arc<ScriptedFetcher>) -> (TaskReconciler, Arc<RecordingNotifier>) {
    reconciler_with(fetcher, ReconcilerConfig::default())
}

// ============================================================================
// TRANSITIONS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn success_is_notified_exactly_once() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(
        ID,
        [
            Ok(ingest_task(1, TaskStatus::Pending, "assay.pdf")),
            Ok(ingest_task(1, TaskStatus::Succeeded, "assay.pdf")),
        ],
    );
    let (reconciler, notifier) = reconciler(&fetcher);
    reconciler.add_task(ingest_task(1, TaskStatus::Pending, "assay.pdf"));
    reconciler.stop_polling();

    for _ in 0..4 {
        reconciler.poll_running_tasks().await;
    }

    let notices = notifier.all();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NotificationLevel::Success);
    assert_eq!(notices[0].title.as_deref(), Some(TASK_COMPLETED_TITLE));
    assert_eq!(notices[0].message, "Task assay.pdf completed successfully");
    // Settled tasks are not fetched again.
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(reconciler.task(ID).map(|t| t.status), Some(TaskStatus::Succeeded));
    assert_eq!(reconciler.observed_status(ID), Some(TaskStatus::Succeeded));

    // A direct sync observing `succeeded` again stays quiet.
    let again = reconciler.sync_task(ID).await;
    assert_eq!(again.map(|t| t.status), Some(TaskStatus::Succeeded));
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(notifier.all().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_uses_server_message() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(TaskId(2), [Ok(failed_task(2, "PDF is encrypted"))]);
    let (reconciler, notifier) = reconciler(&fetcher);
    reconciler.add_task(ingest_task(2, TaskStatus::Running, "locked.pdf"));
    reconciler.stop_polling();

    reconciler.poll_running_tasks().await;

    let notices = notifier.all();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NotificationLevel::Error);
    assert_eq!(notices[0].title.as_deref(), Some(TASK_FAILED_TITLE));
    assert_eq!(notices[0].message, "PDF is encrypted");
}

#[tokio::test(start_paused = true)]
async fn identical_failures_each_reach_the_notification_center() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(TaskId(2), [Ok(failed_task(2, "PDF is encrypted"))]);
    fetcher.script(TaskId(3), [Ok(failed_task(3, "PDF is encrypted"))]);
    let center = Arc::new(NotificationCenter::new(&NotificationConfig::default()));
    let reconciler = TaskReconciler::new(fetcher.clone(), center.clone(), ReconcilerConfig::default());
    reconciler.add_task(ingest_task(2, TaskStatus::Running, "locked-a.pdf"));
    reconciler.add_task(ingest_task(3, TaskStatus::Running, "locked-b.pdf"));
    reconciler.stop_polling();

    reconciler.poll_running_tasks().await;

    let shown = center.recent();
    assert_eq!(shown.len(), 2);
    assert!(shown.iter().all(|n| n.message == "PDF is encrypted"));
    assert!(shown.iter().all(|n| n.title.as_deref() == Some(TASK_FAILED_TITLE)));
}

#[tokio::test(start_paused = true)]
async fn task_added_as_terminal_is_never_notified() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let (reconciler, notifier) = reconciler(&fetcher);
    reconciler.add_task(ingest_task(3, TaskStatus::Succeeded, "done.pdf"));

    assert!(!reconciler.is_polling());
    reconciler.poll_running_tasks().await;
    assert_eq!(fetcher.calls(), 0);
    assert!(notifier.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_is_swallowed() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(ID, [Err(FormlabError::Network("connection refused".to_string()))]);
    let (reconciler, notifier) = reconciler(&fetcher);
    reconciler.add_task(ingest_task(1, TaskStatus::Pending, "a.pdf"));
    reconciler.stop_polling();

    assert!(reconciler.sync_task(ID).await.is_none());
    reconciler.poll_running_tasks().await;

    assert_eq!(fetcher.calls(), 2);
    assert!(notifier.all().is_empty());
    assert_eq!(reconciler.task(ID).map(|t| t.status), Some(TaskStatus::Pending));
    assert_eq!(reconciler.running_tasks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_sync_of_one_task_fetches_once() {
    let fetcher = Arc::new(ScriptedFetcher::gated());
    fetcher.script(ID, [Ok(ingest_task(1, TaskStatus::Running, "a.pdf"))]);
    let (reconciler, _notifier) = reconciler(&fetcher);
    reconciler.add_task(ingest_task(1, TaskStatus::Pending, "a.pdf"));
    reconciler.stop_polling();

    let (first, second) = tokio::join!(reconciler.sync_task(ID), async {
        tokio::task::yield_now().await;
        let skipped = reconciler.sync_task(ID).await;
        fetcher.release(1);
        skipped
    });

    assert_eq!(first.map(|t| t.status), Some(TaskStatus::Running));
    assert!(second.is_none());
    assert_eq!(fetcher.calls(), 1);

    // The in-flight mark is released once the fetch ends.
    fetcher.release(1);
    assert!(reconciler.sync_task(ID).await.is_some());
    assert_eq!(fetcher.calls(), 2);
}

// ============================================================================
// POLLING LOOP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn loop_stops_once_everything_settles() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(
        ID,
        [
            Ok(ingest_task(1, TaskStatus::Pending, "a.pdf")),
            Ok(ingest_task(1, TaskStatus::Running, "a.pdf")),
            Ok(ingest_task(1, TaskStatus::Succeeded, "a.pdf")),
        ],
    );
    let (reconciler, notifier) = reconciler(&fetcher);
    reconciler.add_task(ingest_task(1, TaskStatus::Pending, "a.pdf"));
    assert!(reconciler.is_polling());

    // Hidden panel: ticks at 10 s, 20 s, 30 s.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(fetcher.calls(), 3);
    assert!(!reconciler.is_polling());
    assert_eq!(notifier.count(NotificationLevel::Success), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn visible_panel_polls_fast() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(ID, [Ok(ingest_task(1, TaskStatus::Running, "a.pdf"))]);
    let (reconciler, _notifier) = reconciler(&fetcher);

    assert_eq!(reconciler.current_interval(), Duration::from_secs(10));
    reconciler.set_panel_visible(true);
    assert_eq!(reconciler.current_interval(), Duration::from_secs(3));

    reconciler.add_task(ingest_task(1, TaskStatus::Pending, "a.pdf"));
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(fetcher.calls(), 1);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(fetcher.calls(), 2);

    reconciler.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn visibility_change_applies_immediately() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(ID, [Ok(ingest_task(1, TaskStatus::Running, "a.pdf"))]);
    let (reconciler, _notifier) = reconciler(&fetcher);
    reconciler.add_task(ingest_task(1, TaskStatus::Pending, "a.pdf"));

    // Loop is sleeping for the slow interval; switching cadence restarts the
    // wait with the fast one.
    tokio::time::sleep(Duration::from_secs(1)).await;
    reconciler.set_panel_visible(true);
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(fetcher.calls(), 1);

    reconciler.set_panel_visible(false);
    assert_eq!(reconciler.current_interval(), Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(fetcher.calls(), 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fetcher.calls(), 2);

    reconciler.stop_polling();
    assert!(!reconciler.is_polling());
}

#[tokio::test(start_paused = true)]
async fn adding_a_task_restarts_a_stopped_loop() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(ID, [Ok(ingest_task(1, TaskStatus::Succeeded, "a.pdf"))]);
    fetcher.script(TaskId(2), [Ok(ingest_task(2, TaskStatus::Succeeded, "b.pdf"))]);
    let (reconciler, notifier) = reconciler(&fetcher);

    reconciler.add_task(ingest_task(1, TaskStatus::Pending, "a.pdf"));
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!reconciler.is_polling());

    reconciler.add_task(ingest_task(2, TaskStatus::Running, "b.pdf"));
    assert!(reconciler.is_polling());
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!reconciler.is_polling());
    assert_eq!(notifier.count(NotificationLevel::Success), 2);
    // Newest first.
    let ids: Vec<TaskId> = reconciler.tasks().iter().map(|t| t.task_id).collect();
    assert_eq!(ids, vec![TaskId(2), ID]);
}

// ============================================================================
// RETENTION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn settled_tasks_expire_after_retention() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(ID, [Ok(ingest_task(1, TaskStatus::Succeeded, "a.pdf"))]);
    let config = ReconcilerConfig {
        terminal_retention: Duration::from_secs(60),
        ..ReconcilerConfig::default()
    };
    let (reconciler, _notifier) = reconciler_with(&fetcher, config);
    reconciler.add_task(ingest_task(1, TaskStatus::Running, "a.pdf"));
    reconciler.add_task(ingest_task(5, TaskStatus::Pending, "slow.pdf"));
    reconciler.stop_polling();
    fetcher.script(TaskId(5), [Ok(ingest_task(5, TaskStatus::Running, "slow.pdf"))]);

    reconciler.poll_running_tasks().await;
    assert_eq!(reconciler.tasks().len(), 2);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(reconciler.evict_settled(), 1);
    assert!(reconciler.task(ID).is_none());
    assert!(reconciler.observed_status(ID).is_none());
    assert_eq!(reconciler.running_tasks().len(), 1);
}
