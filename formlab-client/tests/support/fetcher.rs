use async_trait::async_trait;
use formlab_client::TaskStatusFetcher;
use formlab_core::{FormlabError, FormlabResult, TaskId, TaskRecord};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// Fetcher answering from a per-task script. The last entry repeats.
///
/// With a gate, every fetch waits for a permit before answering.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<TaskId, VecDeque<FormlabResult<TaskRecord>>>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
}

impl ScriptedFetcher {
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn script(&self, task_id: TaskId, replies: impl IntoIterator<Item = FormlabResult<TaskRecord>>) {
        self.scripts
            .lock()
            .expect("script lock")
            .entry(task_id)
            .or_default()
            .extend(replies);
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStatusFetcher for ScriptedFetcher {
    async fn fetch_task(&self, task_id: TaskId) -> FormlabResult<TaskRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        let mut scripts = self.scripts.lock().expect("script lock");
        match scripts.get_mut(&task_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("non-empty script"),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FormlabError::Network("no script".to_string()))),
            None => Err(FormlabError::Network(format!("unknown task {}", task_id))),
        }
    }
}
