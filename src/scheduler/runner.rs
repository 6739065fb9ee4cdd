//! Scheduler handle and polling loop.
//!
//! One `Scheduler` handle is shared by the foreground loop, the tool
//! dispatch table, and the background polling task. All task-map access goes
//! through a single mutex, never held across an await: each scan snapshots
//! the due tasks under the lock, then awaits the executor with the lock
//! released.

use super::executor::TaskExecutor;
use super::store::TaskStore;
use super::task::{now_local, Task, TaskSummary, TriggerKind, MAX_SCHEDULE_SECS};
use crate::{NudgeError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sleep between scans. Trigger jitter is bounded by this plus executor
/// latency.
const SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// Bounded wait for the loop to notice the stop flag.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Task map plus the id-minting counter, guarded as one unit.
struct SchedState {
    tasks: HashMap<String, Task>,
    counter: u64,
}

struct SchedulerInner {
    state: Mutex<SchedState>,
    store: TaskStore,
    running: AtomicBool,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Cheap-to-clone scheduler handle.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler over the given store, loading any persisted tasks.
    pub fn new(store: TaskStore) -> Self {
        let (tasks, counter) = store.load();
        let tasks: HashMap<String, Task> =
            tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedState { tasks, counter }),
                store,
                running: AtomicBool::new(false),
                loop_handle: Mutex::new(None),
            }),
        }
    }

    /// Schedule a one-shot task firing `delay_secs` from now.
    pub fn schedule_once(
        &self,
        message: impl Into<String>,
        delay_secs: i64,
        id: Option<String>,
    ) -> Result<String> {
        validate_offset_secs("delay", delay_secs)?;
        self.insert(id, TriggerKind::Once, |id| {
            Task::once(id, message.into(), delay_secs)
        })
    }

    /// Schedule a repeating task every `every_secs` seconds, `count` times
    /// (-1 = unlimited).
    pub fn schedule_interval(
        &self,
        message: impl Into<String>,
        every_secs: i64,
        count: i64,
        id: Option<String>,
    ) -> Result<String> {
        validate_offset_secs("interval", every_secs)?;
        self.insert(id, TriggerKind::Interval, |id| {
            Task::interval(id, message.into(), every_secs, count)
        })
    }

    /// Schedule a task firing daily at `hour:minute`.
    pub fn schedule_daily(
        &self,
        message: impl Into<String>,
        hour: u8,
        minute: u8,
        id: Option<String>,
    ) -> Result<String> {
        if hour > 23 {
            return Err(NudgeError::InvalidSchedule(format!(
                "hour must be 0-23, got {hour}"
            )));
        }
        if minute > 59 {
            return Err(NudgeError::InvalidSchedule(format!(
                "minute must be 0-59, got {minute}"
            )));
        }
        self.insert(id, TriggerKind::Daily, |id| {
            Task::daily(id, message.into(), hour, minute)
        })
    }

    fn insert(
        &self,
        id: Option<String>,
        kind: TriggerKind,
        build: impl FnOnce(String) -> Task,
    ) -> Result<String> {
        let id = {
            let mut state = self.lock_state();
            // The counter advances even for explicit ids; it is never reused.
            state.counter += 1;
            let id = id.unwrap_or_else(|| format!("{}_{}", kind.as_str(), state.counter));
            let task = build(id.clone());
            info!("scheduled task {id} ({})", task.trigger);
            state.tasks.insert(id.clone(), task);
            id
        };
        self.persist();
        Ok(id)
    }

    /// Deactivate and remove a task. Returns `false` for an unknown id.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.lock_state();
            state.tasks.remove(id).is_some()
        };
        if removed {
            info!("cancelled task {id}");
            self.persist();
        }
        removed
    }

    /// Stop a task from firing without losing its parameters.
    pub fn pause(&self, id: &str) -> bool {
        let found = {
            let mut state = self.lock_state();
            match state.tasks.get_mut(id) {
                Some(task) => {
                    task.active = false;
                    true
                }
                None => false,
            }
        };
        if found {
            info!("paused task {id}");
            self.persist();
        }
        found
    }

    /// Reactivate a paused task, recomputing its target from now.
    pub fn resume(&self, id: &str) -> bool {
        let found = {
            let mut state = self.lock_state();
            match state.tasks.get_mut(id) {
                Some(task) => {
                    task.active = true;
                    task.reschedule(now_local());
                    true
                }
                None => false,
            }
        };
        if found {
            info!("resumed task {id}");
            self.persist();
        }
        found
    }

    /// Point-in-time snapshot of every task, sorted by id.
    ///
    /// Safe to call while the loop is running.
    pub fn list_tasks(&self) -> Vec<TaskSummary> {
        let now = now_local();
        let mut summaries: Vec<TaskSummary> = self
            .lock_state()
            .tasks
            .values()
            .map(|t| t.summary(now))
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Start the polling loop on its own task. Idempotent.
    pub fn start(&self, executor: Arc<dyn TaskExecutor>) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let task_count = inner
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .tasks
                .len();
            info!("scheduler loop started with {task_count} tasks");

            while inner.running.load(Ordering::SeqCst) {
                let fired = scan_due(&inner);
                if !fired.is_empty() {
                    for task in fired {
                        executor.execute(task).await;
                    }
                    persist_inner(&inner);
                }
                tokio::time::sleep(SCAN_INTERVAL).await;
            }
            debug!("scheduler loop exited");
        });

        let mut slot = self
            .inner
            .loop_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(handle);
    }

    /// Stop the loop cooperatively, flushing state first. Idempotent.
    ///
    /// Waits up to two seconds for the loop to observe the flag; the loop is
    /// never aborted.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.persist();

        let handle = {
            let mut slot = self
                .inner
                .loop_handle
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("scheduler loop did not stop within {STOP_JOIN_TIMEOUT:?}");
            } else {
                info!("scheduler stopped");
            }
        }
    }

    /// True while the polling loop is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self) {
        persist_inner(&self.inner);
    }
}

/// Reject second offsets whose magnitude the datetime arithmetic cannot
/// represent.
fn validate_offset_secs(what: &str, secs: i64) -> Result<()> {
    if !(-MAX_SCHEDULE_SECS..=MAX_SCHEDULE_SECS).contains(&secs) {
        return Err(NudgeError::InvalidSchedule(format!(
            "{what} out of range: {secs}s"
        )));
    }
    Ok(())
}

/// Collect and bookkeep due tasks under the lock; return fired snapshots.
fn scan_due(inner: &SchedulerInner) -> Vec<Task> {
    let now = now_local();
    let mut state = inner.state.lock().unwrap_or_else(|e| e.into_inner());

    // Snapshot ids first so concurrent cancellation during the scan is safe.
    let ids: Vec<String> = state.tasks.keys().cloned().collect();
    let mut fired = Vec::new();
    for id in ids {
        if let Some(task) = state.tasks.get_mut(&id) {
            if task.is_due(now) {
                let snapshot = task.clone();
                task.fire(now);
                fired.push(snapshot);
            }
        }
    }
    fired
}

fn persist_inner(inner: &SchedulerInner) {
    let (tasks, counter) = {
        let state = inner.state.lock().unwrap_or_else(|e| e.into_inner());
        (
            state.tasks.values().cloned().collect::<Vec<_>>(),
            state.counter,
        )
    };
    if let Err(e) = inner.store.save(&tasks, counter) {
        warn!("cannot persist scheduler state: {e}");
    }
}
