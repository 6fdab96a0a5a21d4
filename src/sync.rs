//! Instrumented lock and cancellation token for scenario tasks.
//!
//! [`ProbeMutex`] is an async mutex that reports waits, acquisitions and releases to the run's
//! [`ResourceTracker`], which lets the harness tell a lock wait-for cycle apart from an ordinary
//! timeout. Lock-order inversions block as pending futures, never as parked worker threads.
//!
//! [`CancelToken`] is the opt-in cancellation path offered to control variants of leak scenarios.
//! The hazardous variants simply never look at it.
//!
//! [`WaitGroup`] counts outstanding work the way the classic wait group does, so workloads can
//! misuse it.

use std::future::Future;
use std::sync::Arc;
use std::task::{Poll, Waker};

use futures::channel::oneshot;
use futures::future::{self, Shared};
use futures::lock::{Mutex, MutexGuard};
use futures::FutureExt;

use crate::tracker::ResourceTracker;
use crate::types::{LockId, TaskId};

/// Async mutex whose ownership is visible to the resource tracker.
pub struct ProbeMutex {
    id: LockId,
    tracker: Arc<ResourceTracker>,
    inner: Mutex<()>,
}

impl ProbeMutex {
    pub fn new(tracker: Arc<ResourceTracker>) -> Self {
        let id = tracker.allocate_lock_id();
        Self {
            id,
            tracker,
            inner: Mutex::new(()),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    /// Acquire the lock on behalf of `task`.
    ///
    /// While waiting, `task` is recorded as blocked on this lock. Dropping the returned future
    /// before it resolves withdraws the wait.
    pub async fn lock(&self, task: TaskId) -> ProbeGuard<'_> {
        if let Some(guard) = self.inner.try_lock() {
            self.tracker.lock_acquired(task, self.id);
            return ProbeGuard {
                mutex: self,
                task,
                _guard: guard,
            };
        }

        self.tracker.lock_waiting(task, self.id);
        let wait = WaitRegistration {
            tracker: &self.tracker,
            task,
            armed: true,
        };
        let guard = self.inner.lock().await;
        wait.disarm();
        self.tracker.lock_acquired(task, self.id);

        ProbeGuard {
            mutex: self,
            task,
            _guard: guard,
        }
    }
}

impl std::fmt::Debug for ProbeMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeMutex").field("id", &self.id).finish()
    }
}

// Withdraws a pending wait if the lock future is dropped mid-wait.
struct WaitRegistration<'a> {
    tracker: &'a ResourceTracker,
    task: TaskId,
    armed: bool,
}

impl WaitRegistration<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tracker.lock_wait_cancelled(self.task);
        }
    }
}

/// Held [`ProbeMutex`]; releases and reports on drop.
pub struct ProbeGuard<'a> {
    mutex: &'a ProbeMutex,
    task: TaskId,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        // Reported before the inner guard is released so the next holder is never recorded
        // while this one still is.
        self.mutex.tracker.lock_released(self.task, self.mutex.id);
    }
}

/// Create a connected trigger/token pair.
pub fn cancel_pair() -> (CancelTrigger, CancelToken) {
    let (tx, rx) = oneshot::channel();
    (
        CancelTrigger { tx: Some(tx) },
        CancelToken {
            signal: Some(rx.shared()),
        },
    )
}

/// Harness-side end of a cancellation pair.
///
/// Dropping the trigger without firing it also resolves every token, so tasks listening for
/// cancellation are released once the run that owns the trigger is over.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: Option<oneshot::Sender<()>>,
}

impl CancelTrigger {
    /// Fire the cancellation. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Task-side end of a cancellation pair. Cheap to clone.
#[derive(Clone)]
pub struct CancelToken {
    signal: Option<Shared<oneshot::Receiver<()>>>,
}

impl CancelToken {
    /// A token with no trigger. It never resolves.
    pub fn never() -> Self {
        Self { signal: None }
    }

    /// Resolves once the trigger fires or is dropped. Waits forever on a [`CancelToken::never`]
    /// token.
    pub async fn cancelled(&self) {
        match &self.signal {
            Some(signal) => {
                let _ = signal.clone().await;
            }
            None => future::pending::<()>().await,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(|signal| signal.clone().now_or_never().is_some())
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Panic message for calling [`WaitGroup::done`] more often than work was added
pub const NEGATIVE_WAIT_GROUP_SIGNATURE: &str = "negative wait group counter";

#[derive(Default)]
struct WaitGroupState {
    count: usize,
    waiters: Vec<Waker>,
}

/// Counter of outstanding work with an async wait for it to reach zero.
///
/// Work registered after a waiter already saw zero is not waited for. That is the misuse the
/// wait-group workload provokes.
#[derive(Default)]
pub struct WaitGroup {
    state: parking_lot::Mutex<WaitGroupState>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.state.lock().count += n;
    }

    /// Mark one unit of work as finished.
    ///
    /// # Panics
    ///
    /// Panics with [`NEGATIVE_WAIT_GROUP_SIGNATURE`] if no work is outstanding.
    pub fn done(&self) {
        let mut state = self.state.lock();
        let Some(count) = state.count.checked_sub(1) else {
            drop(state);
            panic!("{}", NEGATIVE_WAIT_GROUP_SIGNATURE);
        };
        state.count = count;
        if count == 0 {
            let waiters = std::mem::take(&mut state.waiters);
            drop(state);
            for waker in waiters {
                waker.wake();
            }
        }
    }

    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Resolves once the counter is zero.
    pub fn wait(&self) -> impl Future<Output = ()> + '_ {
        future::poll_fn(move |cx| {
            let mut state = self.state.lock();
            if state.count == 0 {
                return Poll::Ready(());
            }
            if !state.waiters.iter().any(|w| w.will_wake(cx.waker())) {
                state.waiters.push(cx.waker().clone());
            }
            Poll::Pending
        })
    }
}

impl std::fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitGroup")
            .field("count", &self.count())
            .finish()
    }
}
