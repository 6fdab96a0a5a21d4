//! Core type definitions shared by every component.
//!
//! Identifiers for tasks, handles and locks, plus the tagged enums that describe hazard classes,
//! fixture modes, task states and termination modes.

use std::fmt;

/// Opaque task identifier, unique within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

/// Opaque handle identifier, unique within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub usize);

/// Opaque lock identifier, unique within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task #{}", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle #{}", self.0)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock #{}", self.0)
    }
}

/// Category of concurrency defect the harness can provoke and classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardClass {
    DataRace,
    Deadlock,
    GoroutineLeak,
    ChannelMisuse,
    UnsynchronizedGlobalMutation,
    DoubleClose,
    NilOrClosedSend,
}

impl HazardClass {
    /// Every hazard class, in declaration order.
    pub const ALL: [HazardClass; 7] = [
        HazardClass::DataRace,
        HazardClass::Deadlock,
        HazardClass::GoroutineLeak,
        HazardClass::ChannelMisuse,
        HazardClass::UnsynchronizedGlobalMutation,
        HazardClass::DoubleClose,
        HazardClass::NilOrClosedSend,
    ];

    /// Whether a single run can never confirm this hazard.
    ///
    /// Races are probabilistic: only a sample of repeated runs compared against a guarded
    /// control carries evidence.
    pub fn is_statistical(self) -> bool {
        matches!(
            self,
            HazardClass::DataRace | HazardClass::UnsynchronizedGlobalMutation
        )
    }
}

impl fmt::Display for HazardClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HazardClass::DataRace => "data race",
            HazardClass::Deadlock => "deadlock",
            HazardClass::GoroutineLeak => "task leak",
            HazardClass::ChannelMisuse => "channel misuse",
            HazardClass::UnsynchronizedGlobalMutation => "unsynchronized global mutation",
            HazardClass::DoubleClose => "double close",
            HazardClass::NilOrClosedSend => "nil or closed send",
        };
        f.write_str(name)
    }
}

/// Whether a fixture synchronizes its updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureMode {
    /// Read, yield, write. Updates can be lost.
    Raw,
    /// Atomic read-modify-write. Always linearizable.
    Guarded,
}

/// Lifecycle state of one scenario task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Panicked,
    /// The watchdog fired while the task had not reached a terminal state.
    Abandoned,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Panicked)
    }
}

/// Observed way a scenario run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationMode {
    Completed,
    TimedOut,
    Panicked,
    /// Timed out with a lock wait-for cycle among the outstanding tasks.
    Deadlocked,
}

impl TerminationMode {
    /// Aggregation precedence: Panicked > Deadlocked/TimedOut > Completed.
    pub(crate) fn precedence(self) -> u8 {
        match self {
            TerminationMode::Completed => 0,
            TerminationMode::TimedOut | TerminationMode::Deadlocked => 1,
            TerminationMode::Panicked => 2,
        }
    }
}

impl fmt::Display for TerminationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationMode::Completed => "completed",
            TerminationMode::TimedOut => "timed out",
            TerminationMode::Panicked => "panicked",
            TerminationMode::Deadlocked => "deadlocked",
        };
        f.write_str(name)
    }
}
