//! Resource tracker for in-flight tasks, open handles and held locks.
//!
//! The tracker is the one component whose correctness everything else depends on while it is
//! hammered concurrently by the very tasks it observes. All of its state lives behind a single
//! `parking_lot::Mutex` and every critical section is short and never awaits.
//!
//! Illegal transitions (tracking a task twice, finishing a task that never ran, closing a handle
//! that was never opened) do not panic inside the task that caused them. They are recorded as a
//! corruption and surfaced by the harness as [`HarnessError::TrackerCorrupted`] once the run ends.
//!
//! [`HarnessError::TrackerCorrupted`]: crate::HarnessError::TrackerCorrupted

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::{trace, warn};

use crate::types::{HandleId, LockId, TaskId, TaskState};

/// Point-in-time counts taken from a [`ResourceTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerSnapshot {
    /// Tracked tasks that have not reached a terminal state (created, running or abandoned)
    pub running_count: usize,
    /// Handles opened and not yet closed
    pub open_handle_count: usize,
}

impl TrackerSnapshot {
    pub fn is_clean(&self) -> bool {
        self.running_count == 0 && self.open_handle_count == 0
    }
}

#[derive(Default)]
struct TrackerState {
    tasks: HashMap<TaskId, TaskState>,
    open_handles: HashSet<HandleId>,
    next_handle: usize,
    next_lock: usize,
    lock_holders: HashMap<LockId, TaskId>,
    lock_waits: HashMap<TaskId, LockId>,
    late_finishers: usize,
    corruption: Option<String>,
}

impl TrackerState {
    fn corrupt(&mut self, detail: String) {
        #[cfg(feature = "tracing")]
        warn!(detail = %detail, "resource tracker corrupted");

        // Keep the first failure; later ones are usually consequences of it.
        if self.corruption.is_none() {
            self.corruption = Some(detail);
        }
    }
}

/// Concurrency-safe accounting of tasks, handles and locks for one run.
///
/// # Examples
///
/// ```
/// use hazardx::{ResourceTracker, TaskId, TaskState};
///
/// let tracker = ResourceTracker::new();
/// tracker.track(TaskId(0));
/// tracker.mark_running(TaskId(0));
/// assert_eq!(tracker.snapshot().running_count, 1);
///
/// tracker.mark_terminal(TaskId(0), TaskState::Completed);
/// assert!(tracker.snapshot().is_clean());
/// assert!(tracker.integrity().is_ok());
/// ```
#[derive(Default)]
pub struct ResourceTracker {
    state: Mutex<TrackerState>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created task.
    pub fn track(&self, task: TaskId) {
        let mut state = self.state.lock();
        if state.tasks.insert(task, TaskState::Created).is_some() {
            state.corrupt(format!("{task} tracked twice"));
        }
    }

    /// Record that a task body started executing.
    ///
    /// A task abandoned before it ever got scheduled may still start later. It stays
    /// `Abandoned`, and so outstanding, until it reaches a terminal state.
    pub fn mark_running(&self, task: TaskId) {
        let mut state = self.state.lock();
        match state.tasks.get(&task).copied() {
            Some(TaskState::Created) => {
                state.tasks.insert(task, TaskState::Running);
            }
            Some(TaskState::Abandoned) => {
                #[cfg(feature = "tracing")]
                trace!(task_id = task.0, "abandoned task started late");
            }
            Some(other) => state.corrupt(format!("{task} started while {other:?}")),
            None => state.corrupt(format!("{task} started without being tracked")),
        }
    }

    /// Record a terminal state (`Completed` or `Panicked`) for a task.
    ///
    /// A task that was abandoned by the watchdog may still finish later; that is legal and
    /// counted as a late finisher.
    pub fn mark_terminal(&self, task: TaskId, terminal: TaskState) {
        let mut state = self.state.lock();
        if !terminal.is_terminal() {
            state.corrupt(format!("{task} marked terminal with {terminal:?}"));
            return;
        }
        match state.tasks.get(&task).copied() {
            Some(TaskState::Running) => {
                state.tasks.insert(task, terminal);
            }
            Some(TaskState::Abandoned) => {
                state.tasks.insert(task, terminal);
                state.late_finishers += 1;

                #[cfg(feature = "tracing")]
                trace!(task_id = task.0, "abandoned task finished late");
            }
            Some(other) => state.corrupt(format!("{task} finished while {other:?}")),
            None => state.corrupt(format!("{task} finished without being tracked")),
        }
    }

    /// Mark every non-terminal task as abandoned and return their ids in ascending order.
    pub fn abandon_outstanding(&self) -> Vec<TaskId> {
        let mut state = self.state.lock();
        let mut abandoned: Vec<TaskId> = state
            .tasks
            .iter_mut()
            .filter(|(_, s)| matches!(s, TaskState::Created | TaskState::Running))
            .map(|(id, s)| {
                *s = TaskState::Abandoned;
                *id
            })
            .collect();
        abandoned.sort();
        abandoned
    }

    pub fn task_state(&self, task: TaskId) -> Option<TaskState> {
        self.state.lock().tasks.get(&task).copied()
    }

    /// Number of abandoned tasks that reached a terminal state afterwards.
    pub fn late_finishers(&self) -> usize {
        self.state.lock().late_finishers
    }

    /// Reserve a fresh handle id (not yet open).
    pub fn allocate_handle_id(&self) -> HandleId {
        let mut state = self.state.lock();
        let id = HandleId(state.next_handle);
        state.next_handle += 1;
        id
    }

    pub fn open_handle(&self, handle: HandleId) {
        let mut state = self.state.lock();
        if !state.open_handles.insert(handle) {
            state.corrupt(format!("{handle} opened twice"));
        }
    }

    pub fn close_handle(&self, handle: HandleId) {
        let mut state = self.state.lock();
        if !state.open_handles.remove(&handle) {
            state.corrupt(format!("{handle} closed but not open"));
        }
    }

    /// Reserve a fresh lock id.
    pub fn allocate_lock_id(&self) -> LockId {
        let mut state = self.state.lock();
        let id = LockId(state.next_lock);
        state.next_lock += 1;
        id
    }

    /// Record that `task` is blocked acquiring `lock`.
    pub fn lock_waiting(&self, task: TaskId, lock: LockId) {
        self.state.lock().lock_waits.insert(task, lock);
    }

    /// Record that `task` now holds `lock`.
    pub fn lock_acquired(&self, task: TaskId, lock: LockId) {
        let mut state = self.state.lock();
        state.lock_waits.remove(&task);
        if let Some(holder) = state.lock_holders.insert(lock, task) {
            state.corrupt(format!("{lock} acquired by {task} while held by {holder}"));
        }
    }

    /// Record that `task` released `lock`.
    pub fn lock_released(&self, task: TaskId, lock: LockId) {
        let mut state = self.state.lock();
        match state.lock_holders.remove(&lock) {
            Some(holder) if holder == task => {}
            Some(holder) => state.corrupt(format!("{lock} released by {task}, held by {holder}")),
            None => state.corrupt(format!("{lock} released by {task} but not held")),
        }
    }

    /// Drop a pending wait, e.g. when a lock future is cancelled before acquiring.
    pub fn lock_wait_cancelled(&self, task: TaskId) {
        self.state.lock().lock_waits.remove(&task);
    }

    /// Find a cycle in the lock wait-for graph.
    ///
    /// Returns the tasks of the first cycle found (smallest task id first), or `None`.
    pub fn wait_cycle(&self) -> Option<Vec<TaskId>> {
        let state = self.state.lock();

        let mut starts: Vec<TaskId> = state.lock_waits.keys().copied().collect();
        starts.sort();

        for start in starts {
            let mut path = vec![start];
            let mut current = start;
            loop {
                let Some(lock) = state.lock_waits.get(&current) else {
                    break;
                };
                let Some(&holder) = state.lock_holders.get(lock) else {
                    break;
                };
                if let Some(pos) = path.iter().position(|&t| t == holder) {
                    let mut cycle = path.split_off(pos);
                    cycle.sort();
                    return Some(cycle);
                }
                path.push(holder);
                current = holder;
            }
        }
        None
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.lock();
        TrackerSnapshot {
            running_count: state
                .tasks
                .values()
                .filter(|s| !s.is_terminal())
                .count(),
            open_handle_count: state.open_handles.len(),
        }
    }

    /// `Err` with the first recorded corruption, if any.
    pub fn integrity(&self) -> Result<(), String> {
        match &self.state.lock().corruption {
            Some(detail) => Err(detail.clone()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ResourceTracker")
            .field("running_count", &snapshot.running_count)
            .field("open_handle_count", &snapshot.open_handle_count)
            .finish_non_exhaustive()
    }
}
