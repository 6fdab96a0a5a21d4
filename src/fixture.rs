//! Shared-state fixture used to expose races.
//!
//! A [`SharedFixture`] is the only state scenario tasks are meant to share. The raw variant performs
//! a read-yield-write sequence with no synchronization, so concurrent increments can overwrite each
//! other. The guarded variant performs an atomic read-modify-write.
//!
//! Both variants store the value in an `AtomicU64`. The raw variant only ever uses separate relaxed
//! loads and stores, which reproduces the lost-update interleavings of an unsynchronized counter
//! without undefined behaviour.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::FixtureMode;

/// Minimal mutable state unit shared by the tasks of one run.
///
/// Fixtures are never global: the harness builds a fresh one for every run and hands an
/// `Arc<SharedFixture>` to each task through its [`TaskContext`](crate::TaskContext).
///
/// # Examples
///
/// ```
/// use hazardx::{FixtureMode, SharedFixture};
///
/// let fixture = SharedFixture::new(FixtureMode::Guarded);
/// fixture.increment();
/// fixture.add(41);
/// assert_eq!(fixture.read(), 42);
///
/// fixture.reset();
/// assert_eq!(fixture.read(), 0);
/// ```
#[derive(Debug)]
pub struct SharedFixture {
    mode: FixtureMode,
    value: AtomicU64,
}

impl SharedFixture {
    pub fn new(mode: FixtureMode) -> Self {
        Self {
            mode,
            value: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> FixtureMode {
        self.mode
    }

    /// Add one to the fixture.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Add `delta` to the fixture.
    ///
    /// Raw: load, yield the thread, store. Guarded: `fetch_add`.
    pub fn add(&self, delta: u64) {
        match self.mode {
            FixtureMode::Raw => {
                let current = self.value.load(Ordering::Relaxed);
                // Widen the window between the read and the write.
                std::thread::yield_now();
                self.value.store(current.wrapping_add(delta), Ordering::Relaxed);
            }
            FixtureMode::Guarded => {
                self.value.fetch_add(delta, Ordering::SeqCst);
            }
        }
    }

    /// Check-then-act lazy initialization. Returns `true` if this call initialized.
    ///
    /// The fixture counts initializations. Raw: load, yield, then initialize if the load saw
    /// zero, so several callers can all initialize. Guarded: `compare_exchange` from zero, so
    /// exactly one does.
    pub fn initialize(&self) -> bool {
        match self.mode {
            FixtureMode::Raw => {
                let seen = self.value.load(Ordering::Relaxed);
                std::thread::yield_now();
                if seen != 0 {
                    return false;
                }
                // Every initializer is counted, so duplicates show.
                self.value.fetch_add(1, Ordering::SeqCst);
                true
            }
            FixtureMode::Guarded => self
                .value
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
        }
    }

    /// Insert `key` (below 64) into the fixture viewed as a set of keys.
    ///
    /// Raw: load, yield, store with the key's bit set. Guarded: `fetch_or`.
    pub fn insert_key(&self, key: u32) {
        let bit = 1u64 << (key % 64);
        match self.mode {
            FixtureMode::Raw => {
                let current = self.value.load(Ordering::Relaxed);
                std::thread::yield_now();
                self.value.store(current | bit, Ordering::Relaxed);
            }
            FixtureMode::Guarded => {
                self.value.fetch_or(bit, Ordering::SeqCst);
            }
        }
    }

    pub fn contains_key(&self, key: u32) -> bool {
        self.value.load(Ordering::Relaxed) & (1u64 << (key % 64)) != 0
    }

    pub fn read(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
    }
}
