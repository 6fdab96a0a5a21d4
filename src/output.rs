//! Per-run result record produced by the harness.

use std::time::Duration;

use crate::tracker::TrackerSnapshot;
use crate::types::{FixtureMode, TerminationMode};

/// Leak status of a run after the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakSignal {
    /// Nothing outstanding when the run ended.
    None,
    /// Outstanding at run end, resolved during the grace period.
    Transient,
    /// Still outstanding after the grace period.
    Confirmed,
}

/// What one run of a scenario looked like.
///
/// Produced by [`Harness::run_scenario`](crate::Harness::run_scenario) and owned by the caller for
/// aggregation. Outstanding counts are taken *after* the grace period; the snapshot taken at the
/// end of the run itself is kept in [`ExecutionResult::provisional`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub scenario_id: String,
    pub termination_mode: TerminationMode,
    /// Wall clock from launch to aggregation or watchdog fire
    pub elapsed: Duration,
    pub outstanding_task_count: usize,
    pub outstanding_handle_count: usize,
    /// Fixture value at aggregation time, for workloads that use the fixture
    pub final_fixture_value: Option<u64>,
    /// Message of the first task panic observed
    pub panic_message: Option<String>,
    pub fixture_mode: Option<FixtureMode>,
    /// Tasks that panicked before the run was aggregated
    pub panicked_task_count: usize,
    pub leak: LeakSignal,
    pub provisional: TrackerSnapshot,
}

impl ExecutionResult {
    pub fn timed_out(&self) -> bool {
        matches!(
            self.termination_mode,
            TerminationMode::TimedOut | TerminationMode::Deadlocked
        )
    }

    pub fn has_confirmed_leak(&self) -> bool {
        self.leak == LeakSignal::Confirmed
    }

    /// Whether the panic message contains `signature`.
    pub fn panicked_with(&self, signature: &str) -> bool {
        self.termination_mode == TerminationMode::Panicked
            && self
                .panic_message
                .as_deref()
                .is_some_and(|message| message.contains(signature))
    }
}
