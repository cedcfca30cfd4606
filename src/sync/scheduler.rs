//! Deferred execution of flush tasks.
//!
//! [`TokioScheduler`] sleeps on the platform runtime; [`ManualScheduler`] only
//! runs tasks when its virtual clock is advanced, which keeps debounce tests
//! deterministic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::util::runtime::{sleep, spawn_detached, TaskFuture};

/// Work handed to a [`Scheduler`]. Built lazily so nothing runs before the delay.
pub type ScheduledTask = Box<dyn FnOnce() -> TaskFuture + Send + 'static>;

/// Cancels a scheduled task that has not started yet.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait Scheduler: Send + Sync + 'static {
    /// Runs `task` once `delay` has elapsed unless the returned token is
    /// cancelled first.
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> CancelToken;
}

/// Schedules onto the ambient async runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> CancelToken {
        let token = CancelToken::new();
        let guard = token.clone();
        spawn_detached(async move {
            sleep(delay).await;
            if guard.is_cancelled() {
                return;
            }
            task().await;
        });
        token
    }
}

struct ManualTask {
    due: Duration,
    sequence: u64,
    token: CancelToken,
    task: ScheduledTask,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_sequence: u64,
    tasks: Vec<ManualTask>,
}

/// Virtual-clock scheduler. Clones share the same clock and task list.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.lock().unwrap().now
    }

    /// Number of tasks that are scheduled and not cancelled.
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .tasks
            .iter()
            .filter(|task| !task.token.is_cancelled())
            .count()
    }

    /// Moves the clock forward by `by`, awaiting every task that falls due in
    /// order of due time. Tasks scheduled while advancing run too when they fall
    /// inside the window. Returns the number of tasks executed.
    pub async fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut executed = 0;
        while let Some(task) = self.take_due(target) {
            (task.task)().await;
            executed += 1;
        }
        self.state.lock().unwrap().now = target;
        executed
    }

    fn take_due(&self, target: Duration) -> Option<ManualTask> {
        let mut state = self.state.lock().unwrap();
        state.tasks.retain(|task| !task.token.is_cancelled());
        let index = state
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due <= target)
            .min_by_key(|(_, task)| (task.due, task.sequence))
            .map(|(index, _)| index)?;
        let task = state.tasks.remove(index);
        state.now = state.now.max(task.due);
        Some(task)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> CancelToken {
        let token = CancelToken::new();
        let mut state = self.state.lock().unwrap();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let due = state.now + delay;
        state.tasks.push(ManualTask {
            due,
            sequence,
            token: token.clone(),
            task,
        });
        token
    }
}
