//! Closable bounded handles for provoking channel misuse and leaks.
//!
//! A [`Handle<T>`] is a multi-producer multi-consumer queue with an explicit close operation and a
//! fixed capacity, registered with the run's [`ResourceTracker`] while open. Its semantics follow
//! the classic channel model the hazards are defined against:
//!
//! - `send` on a closed handle panics with [`CLOSED_SEND_SIGNATURE`]
//! - `close` on a closed handle panics with [`DOUBLE_CLOSE_SIGNATURE`]
//! - `send` on a nil handle panics with [`NIL_SEND_SIGNATURE`]
//! - `send` waits until fewer than `capacity` items are queued; a capacity of zero makes every
//!   send wait for a receiver to take the item
//! - `recv` on an open, empty handle waits; on a closed, drained handle it returns `None`
//! - a sender still waiting when the handle is closed panics with [`CLOSED_SEND_SIGNATURE`]
//!
//! Waiting is expressed as a pending future, so a task blocked forever holds no worker thread.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::tracker::ResourceTracker;
use crate::types::HandleId;

/// Panic message for sending on a closed handle
pub const CLOSED_SEND_SIGNATURE: &str = "send on closed handle";

/// Panic message for closing a handle twice
pub const DOUBLE_CLOSE_SIGNATURE: &str = "close of closed handle";

/// Panic message for sending on a nil handle
pub const NIL_SEND_SIGNATURE: &str = "send on nil handle";

/// Panic message for closing a nil handle
pub const NIL_CLOSE_SIGNATURE: &str = "close of nil handle";

struct HandleState<T> {
    queue: VecDeque<T>,
    /// Number of items ever enqueued; the next send's ticket
    sent: u64,
    /// Number of items ever dequeued
    received: u64,
    closed: bool,
    send_wakers: Vec<Waker>,
    recv_wakers: Vec<Waker>,
}

struct Shared<T> {
    id: HandleId,
    capacity: usize,
    tracker: Arc<ResourceTracker>,
    state: Mutex<HandleState<T>>,
}

fn register(wakers: &mut Vec<Waker>, waker: &Waker) {
    if !wakers.iter().any(|w| w.will_wake(waker)) {
        wakers.push(waker.clone());
    }
}

fn wake_all(wakers: Vec<Waker>) {
    for waker in wakers {
        waker.wake();
    }
}

/// Closable, capacity-bounded queue tracked as an open handle until closed.
///
/// Cloning a handle yields another reference to the same queue; the handle stays open in the
/// tracker until one of the clones calls [`Handle::close`]. Dropping every clone without closing
/// leaves the handle open, which is exactly the leak signal the harness measures.
pub struct Handle<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send> Handle<T> {
    /// Open a handle and register it with `tracker`.
    pub fn open(tracker: Arc<ResourceTracker>, capacity: usize) -> Self {
        let id = tracker.allocate_handle_id();
        tracker.open_handle(id);
        Self {
            shared: Some(Arc::new(Shared {
                id,
                capacity,
                tracker,
                state: Mutex::new(HandleState {
                    queue: VecDeque::new(),
                    sent: 0,
                    received: 0,
                    closed: false,
                    send_wakers: Vec::new(),
                    recv_wakers: Vec::new(),
                }),
            })),
        }
    }

    /// A handle that was never opened.
    pub fn nil() -> Self {
        Self { shared: None }
    }

    pub fn is_nil(&self) -> bool {
        self.shared.is_none()
    }

    pub fn id(&self) -> Option<HandleId> {
        self.shared.as_ref().map(|s| s.id)
    }

    pub fn capacity(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.capacity)
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.state.lock().queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.state.lock().closed)
    }

    /// Send `value` once it fits within the handle's capacity.
    ///
    /// Nothing is queued until the returned future is polled. With a capacity of zero the send
    /// only completes once a receiver took the item. Dropping the future before that withdraws
    /// the item, so the queue never holds more than `max(capacity, 1)` items.
    ///
    /// # Panics
    ///
    /// Panics if the handle is nil or closed. The future panics if the handle is closed while
    /// this send is waiting.
    pub fn send(&self, value: T) -> SendFuture<T> {
        let Some(shared) = &self.shared else {
            panic!("{}", NIL_SEND_SIGNATURE);
        };
        if shared.state.lock().closed {
            panic!("{}", CLOSED_SEND_SIGNATURE);
        }

        SendFuture {
            shared: Arc::clone(shared),
            value: Some(value),
            ticket: None,
            done: false,
        }
    }

    /// Wait for the next item. Returns `None` once the handle is closed and drained.
    ///
    /// Receiving on a nil handle waits forever.
    pub fn recv(&self) -> RecvFuture<T> {
        RecvFuture {
            shared: self.shared.clone(),
        }
    }

    /// Close the handle and deregister it from the tracker.
    ///
    /// Queued items stay receivable. Waiting senders and receivers are woken.
    ///
    /// # Panics
    ///
    /// Panics if the handle is nil or already closed.
    pub fn close(&self) {
        let Some(shared) = &self.shared else {
            panic!("{}", NIL_CLOSE_SIGNATURE);
        };

        let mut state = shared.state.lock();
        if state.closed {
            drop(state);
            panic!("{}", DOUBLE_CLOSE_SIGNATURE);
        }
        state.closed = true;
        let senders = std::mem::take(&mut state.send_wakers);
        let receivers = std::mem::take(&mut state.recv_wakers);
        drop(state);

        shared.tracker.close_handle(shared.id);
        wake_all(senders);
        wake_all(receivers);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.shared {
            Some(shared) => f
                .debug_struct("Handle")
                .field("id", &shared.id)
                .field("capacity", &shared.capacity)
                .finish_non_exhaustive(),
            None => f.write_str("Handle(nil)"),
        }
    }
}

/// Future returned by [`Handle::send`]
#[must_use = "a send queues nothing unless awaited"]
pub struct SendFuture<T> {
    shared: Arc<Shared<T>>,
    value: Option<T>,
    /// Set once the value is queued
    ticket: Option<u64>,
    done: bool,
}

// The value is moved, never pinned.
impl<T> Unpin for SendFuture<T> {}

impl<T> Future for SendFuture<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let capacity = this.shared.capacity as u64;
        let mut state = this.shared.state.lock();

        let ticket = match this.ticket {
            Some(ticket) => ticket,
            None => {
                if state.closed {
                    drop(state);
                    panic!("{}", CLOSED_SEND_SIGNATURE);
                }
                if state.queue.len() >= this.shared.capacity.max(1) {
                    register(&mut state.send_wakers, cx.waker());
                    return Poll::Pending;
                }
                let Some(value) = this.value.take() else {
                    return Poll::Ready(());
                };
                let ticket = state.sent;
                state.sent += 1;
                state.queue.push_back(value);
                this.ticket = Some(ticket);
                let receivers = std::mem::take(&mut state.recv_wakers);
                drop(state);
                wake_all(receivers);
                state = this.shared.state.lock();
                ticket
            }
        };

        if ticket < state.received + capacity {
            this.done = true;
            return Poll::Ready(());
        }
        if state.closed {
            drop(state);
            panic!("{}", CLOSED_SEND_SIGNATURE);
        }
        register(&mut state.send_wakers, cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for SendFuture<T> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket else {
            return;
        };
        if self.done {
            return;
        }
        let mut state = self.shared.state.lock();
        // Only a rendezvous offer can still be waiting here, and it is the one queued item.
        if ticket >= state.received && state.queue.pop_back().is_some() {
            state.sent -= 1;
            let senders = std::mem::take(&mut state.send_wakers);
            drop(state);
            wake_all(senders);
        }
    }
}

/// Future returned by [`Handle::recv`]
#[must_use = "futures do nothing unless awaited"]
pub struct RecvFuture<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Future for RecvFuture<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let Some(shared) = &self.shared else {
            return Poll::Pending;
        };

        let mut state = shared.state.lock();
        if let Some(value) = state.queue.pop_front() {
            state.received += 1;
            let senders = std::mem::take(&mut state.send_wakers);
            drop(state);
            wake_all(senders);
            return Poll::Ready(Some(value));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        register(&mut state.recv_wakers, cx.waker());
        Poll::Pending
    }
}
