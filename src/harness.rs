//! Execution harness: runs a scenario's tasks concurrently under a watchdog.
//!
//! The harness is runtime-agnostic. Tasks are handed to a caller-provided spawner, exactly like
//! any other future, and the harness's own control loop is a separate future that only ever
//! waits on two things: terminal signals from the tasks, or the watchdog.
//!
//! # Fault boundary
//!
//! Every task body is wrapped in `FutureExt::catch_unwind()`. A panicking task becomes a
//! `Panicked` outcome with its message recorded; it never unwinds into the harness or the
//! runtime. This is what lets the harness survive the hazards it provokes.
//!
//! # Timeouts
//!
//! When the watchdog fires the harness stops waiting. It never cancels or kills outstanding tasks
//! (cancellable control scenarios get their token fired instead); they are marked abandoned and
//! reported as outstanding. A nonzero tracker snapshot at that point is provisional: the harness
//! keeps draining terminal signals for one grace period before calling it a confirmed leak.
//!
//! # Child tasks
//!
//! Tasks may spawn children through [`TaskContext::spawn`](crate::TaskContext::spawn). Requests
//! travel over the same channel as terminal signals, and the control loop tracks and spawns the
//! child itself, so a run only completes once every descendant has finished.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::{BoxFuture, FusedFuture};
use futures::{pin_mut, select, FutureExt, StreamExt};
use futures_timer::Delay;

#[cfg(feature = "tracing")]
use tracing::{debug, error, info, trace, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::fixture::SharedFixture;
use crate::output::{ExecutionResult, LeakSignal};
use crate::scenario::{ChildLauncher, RunContext, Scenario, TaskFn};
use crate::sync::{cancel_pair, CancelToken};
use crate::tracker::ResourceTracker;
use crate::types::{FixtureMode, TaskId, TaskState, TerminationMode};

enum TaskOutcome {
    Completed,
    Panicked(String),
}

impl TaskOutcome {
    fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed => TaskState::Completed,
            TaskOutcome::Panicked(_) => TaskState::Panicked,
        }
    }
}

struct TaskSignal {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    task: TaskId,
    outcome: TaskOutcome,
}

/// Everything tasks tell the control loop, in the order they said it.
///
/// A parent's spawn requests always arrive before its own terminal signal.
enum RunMessage {
    Spawn(TaskId, TaskFn),
    Finished(TaskSignal),
}

enum Event {
    Message(RunMessage),
    Elapsed,
}

async fn next_event<W>(
    messages: &mut UnboundedReceiver<RunMessage>,
    mut watchdog: &mut W,
) -> Event
where
    W: FusedFuture<Output = ()> + Unpin,
{
    select! {
        message = messages.select_next_some() => Event::Message(message),
        () = watchdog => Event::Elapsed,
    }
}

/// Spawns task bodies behind the fault boundary.
struct Launcher<'a, S> {
    spawner: &'a S,
    run: &'a RunContext,
    tracker: &'a Arc<ResourceTracker>,
    messages: &'a UnboundedSender<RunMessage>,
}

impl<S> Launcher<'_, S>
where
    S: Fn(BoxFuture<'static, ()>),
{
    /// Spawn an already tracked task.
    fn launch(&self, id: TaskId, body: TaskFn) {
        let ctx = self.run.task_context(id);
        let tracker = Arc::clone(self.tracker);
        let messages = self.messages.clone();

        (self.spawner)(Box::pin(async move {
            tracker.mark_running(id);

            let outcome = match AssertUnwindSafe(async move { body(ctx).await })
                .catch_unwind()
                .await
            {
                Ok(()) => TaskOutcome::Completed,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());

                    #[cfg(feature = "tracing")]
                    debug!(task_id = id.0, panic_message = %message, "task panicked");

                    TaskOutcome::Panicked(message)
                }
            };

            tracker.mark_terminal(id, outcome.state());
            // The harness may have stopped listening; that is fine.
            let _ =
                messages.unbounded_send(RunMessage::Finished(TaskSignal { task: id, outcome }));
        }));
    }

    /// Track and spawn a child requested by a running task.
    fn launch_child(&self, id: TaskId, body: TaskFn) {
        #[cfg(feature = "tracing")]
        trace!(task_id = id.0, "spawning child task");

        self.tracker.track(id);
        self.launch(id, body);
    }
}

/// Terminal signals seen so far in one run.
struct Tally {
    pending: usize,
    panicked: usize,
    first_panic: Option<String>,
    late: usize,
}

impl Tally {
    fn new(task_count: usize) -> Self {
        Self {
            pending: task_count,
            panicked: 0,
            first_panic: None,
            late: 0,
        }
    }

    fn record<S>(&mut self, message: RunMessage, launcher: &Launcher<'_, S>)
    where
        S: Fn(BoxFuture<'static, ()>),
    {
        match message {
            RunMessage::Spawn(id, body) => {
                self.pending += 1;
                launcher.launch_child(id, body);
            }
            RunMessage::Finished(signal) => {
                #[cfg(feature = "tracing")]
                trace!(task_id = signal.task.0, "task reached terminal state");

                self.pending = self.pending.saturating_sub(1);
                if let TaskOutcome::Panicked(message) = signal.outcome {
                    self.panicked += 1;
                    self.first_panic.get_or_insert(message);
                }
            }
        }
    }

    /// After the watchdog fired: children are abandoned as soon as they are tracked, and
    /// finishers only count as late.
    fn record_late<S>(&mut self, message: RunMessage, launcher: &Launcher<'_, S>)
    where
        S: Fn(BoxFuture<'static, ()>),
    {
        match message {
            RunMessage::Spawn(id, body) => {
                launcher.tracker.track(id);
                launcher.tracker.abandon_outstanding();
                launcher.launch(id, body);
            }
            RunMessage::Finished(signal) => self.record_late_finish(signal),
        }
    }

    fn record_late_finish(
        &mut self,
        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))] signal: TaskSignal,
    ) {
        #[cfg(feature = "tracing")]
        trace!(task_id = signal.task.0, "abandoned task finished during grace period");

        self.pending = self.pending.saturating_sub(1);
        self.late += 1;
    }

    /// Single non-blocking poll of whatever has already arrived.
    fn drain_ready<S>(
        &mut self,
        messages: &mut UnboundedReceiver<RunMessage>,
        launcher: &Launcher<'_, S>,
    ) where
        S: Fn(BoxFuture<'static, ()>),
    {
        while let Ok(message) = messages.try_recv() {
            self.record(message, launcher);
        }
    }

    /// Wait until every task is terminal or `limit` passes. Returns `true` if the watchdog fired.
    async fn wait<S>(
        &mut self,
        messages: &mut UnboundedReceiver<RunMessage>,
        launcher: &Launcher<'_, S>,
        limit: Duration,
    ) -> bool
    where
        S: Fn(BoxFuture<'static, ()>),
    {
        let watchdog = Delay::new(limit).fuse();
        pin_mut!(watchdog);

        while self.pending > 0 {
            match next_event(messages, &mut watchdog).await {
                Event::Message(message) => self.record(message, launcher),
                Event::Elapsed => return true,
            }
        }
        false
    }

    /// Keep draining late messages for the whole grace period.
    async fn settle<S>(
        &mut self,
        messages: &mut UnboundedReceiver<RunMessage>,
        launcher: &Launcher<'_, S>,
        grace: Duration,
    ) where
        S: Fn(BoxFuture<'static, ()>),
    {
        let deadline = Delay::new(grace).fuse();
        pin_mut!(deadline);

        loop {
            match next_event(messages, &mut deadline).await {
                Event::Message(message) => self.record_late(message, launcher),
                Event::Elapsed => return,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs scenarios and produces [`ExecutionResult`]s.
///
/// # Parameters
///
/// - `spawner`: A function that spawns futures on the async runtime. Tasks must be able to run
///   in parallel for races to show up, so use a multi-threaded runtime. Examples:
///   - Tokio: `|fut| { tokio::spawn(fut); }`
///   - Smol: `|fut| { smol::spawn(fut).detach(); }`
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use hazardx::{Harness, Scenario, TerminationMode, Workload};
/// # async {
/// let harness = Harness::new(|fut| {
///     tokio::spawn(fut);
/// });
///
/// let scenario = Scenario::builder("double-close", Workload::DoubleClose).build().unwrap();
/// let result = harness
///     .run_scenario(&scenario, Duration::from_millis(100))
///     .await
///     .unwrap();
///
/// assert_eq!(result.termination_mode, TerminationMode::Panicked);
/// # };
/// ```
pub struct Harness<S> {
    spawner: S,
    config: HarnessConfig,
}

impl<S> Harness<S>
where
    S: Fn(BoxFuture<'static, ()>),
{
    pub fn new(spawner: S) -> Self {
        Self::with_config(spawner, HarnessConfig::default())
    }

    pub fn with_config(spawner: S, config: HarnessConfig) -> Self {
        Self { spawner, config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `scenario` once with the given timeout.
    ///
    /// # Errors
    ///
    /// - `HarnessError::TrackerCorrupted` if task or handle accounting became inconsistent
    ///   during the run
    /// - `HarnessError::InvalidScenario` if a custom task factory panicked while building the
    ///   task set
    ///
    /// Task panics are never errors.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, scenario), fields(scenario_id = %scenario.id()))
    )]
    pub async fn run_scenario(
        &self,
        scenario: &Scenario,
        timeout: Duration,
    ) -> HarnessResult<ExecutionResult> {
        let tracker = Arc::new(ResourceTracker::new());
        let fixture = Arc::new(SharedFixture::new(scenario.fixture_mode()));
        let (mut trigger, token) = if scenario.is_cancellable() {
            let (trigger, token) = cancel_pair();
            (Some(trigger), token)
        } else {
            (None, CancelToken::never())
        };
        let (message_tx, mut message_rx) = mpsc::unbounded::<RunMessage>();
        let children: ChildLauncher = {
            let message_tx = message_tx.clone();
            Arc::new(move |id: TaskId, body: TaskFn| {
                message_tx
                    .unbounded_send(RunMessage::Spawn(id, body))
                    .is_ok()
            })
        };
        let run = RunContext::new(
            scenario.task_count(),
            Arc::clone(&fixture),
            Arc::clone(&tracker),
            token,
            children,
        );

        let tasks = std::panic::catch_unwind(AssertUnwindSafe(|| scenario.build(&run)))
            .map_err(|payload| {
                let reason = format!("task factory panicked: {}", panic_message(payload.as_ref()));

                #[cfg(feature = "tracing")]
                error!(scenario_id = scenario.id(), reason = %reason, "aborting run");

                HarnessError::InvalidScenario {
                    id: scenario.id().to_string(),
                    reason,
                }
            })?;
        let task_count = tasks.len();
        run.reserve_task_ids(task_count);

        #[cfg(feature = "tracing")]
        info!(
            task_count,
            fixture_mode = ?scenario.fixture_mode(),
            timeout_ms = timeout.as_millis() as u64,
            "starting scenario run"
        );

        // Track every task before launching any, so early finishers never race their siblings'
        // registration.
        for index in 0..task_count {
            tracker.track(TaskId(index));
        }

        let launcher = Launcher {
            spawner: &self.spawner,
            run: &run,
            tracker: &tracker,
            messages: &message_tx,
        };
        let started = Instant::now();

        for (index, body) in tasks.into_iter().enumerate() {
            launcher.launch(TaskId(index), body);
        }

        let mut tally = Tally::new(task_count);
        let timed_out = if task_count == 0 {
            false
        } else if timeout.is_zero() {
            tally.drain_ready(&mut message_rx, &launcher);
            tally.pending > 0
        } else {
            tally.wait(&mut message_rx, &launcher, timeout).await
        };
        let elapsed = started.elapsed();

        // Everything below is measured before cancellation can release any task.
        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let abandoned = if timed_out {
            tracker.abandon_outstanding()
        } else {
            Vec::new()
        };

        let wait_cycle = if timed_out && self.config.detect_wait_cycles {
            tracker.wait_cycle()
        } else {
            None
        };

        let final_fixture_value = scenario.uses_fixture().then(|| fixture.read());
        let provisional = tracker.snapshot();

        if timed_out {
            #[cfg(feature = "tracing")]
            warn!(
                abandoned = abandoned.len(),
                wait_cycle = ?wait_cycle,
                elapsed_ms = elapsed.as_millis() as u64,
                "watchdog fired with tasks outstanding"
            );

            if let Some(trigger) = trigger.as_mut() {
                trigger.cancel();
            }
        }

        if !timed_out && provisional.running_count != 0 {
            return Err(self.corrupted(
                scenario,
                format!(
                    "all {} tasks signalled completion but {} are still tracked as running",
                    task_count, provisional.running_count
                ),
            ));
        }
        tracker
            .integrity()
            .map_err(|detail| self.corrupted(scenario, detail))?;

        let (settled, leak) = if provisional.is_clean() {
            (provisional, LeakSignal::None)
        } else {
            tally
                .settle(&mut message_rx, &launcher, self.config.grace.resolve(timeout))
                .await;
            let settled = tracker.snapshot();
            let leak = if settled.is_clean() {
                LeakSignal::Transient
            } else {
                LeakSignal::Confirmed
            };
            (settled, leak)
        };
        tracker
            .integrity()
            .map_err(|detail| self.corrupted(scenario, detail))?;

        let termination_mode = if tally.panicked > 0 {
            TerminationMode::Panicked
        } else if wait_cycle.is_some() {
            TerminationMode::Deadlocked
        } else if timed_out {
            TerminationMode::TimedOut
        } else {
            TerminationMode::Completed
        };

        #[cfg(feature = "tracing")]
        info!(
            termination_mode = %termination_mode,
            outstanding_tasks = settled.running_count,
            outstanding_handles = settled.open_handle_count,
            late_finishers = tally.late,
            leak = ?leak,
            "scenario run finished"
        );

        drop(trigger);

        Ok(ExecutionResult {
            scenario_id: scenario.id().to_string(),
            termination_mode,
            elapsed,
            outstanding_task_count: settled.running_count,
            outstanding_handle_count: settled.open_handle_count,
            final_fixture_value,
            panic_message: tally.first_panic,
            fixture_mode: scenario.uses_fixture().then(|| scenario.fixture_mode()),
            panicked_task_count: tally.panicked,
            leak,
            provisional,
        })
    }

    /// Run `scenario` `repetitions` times, sequentially, each on fresh state.
    pub async fn run_repeated(
        &self,
        scenario: &Scenario,
        timeout: Duration,
        repetitions: usize,
    ) -> HarnessResult<Vec<ExecutionResult>> {
        let mut results = Vec::with_capacity(repetitions);
        for _ in 0..repetitions {
            results.push(self.run_scenario(scenario, timeout).await?);
        }
        Ok(results)
    }

    /// Run `scenario` and a guarded control copy of it, alternating, `repetitions` times each.
    ///
    /// This is the sample the race oracles need: the scenario's own fixture mode and a guarded
    /// run of the very same workload.
    pub async fn run_differential(
        &self,
        scenario: &Scenario,
        timeout: Duration,
        repetitions: usize,
    ) -> HarnessResult<Vec<ExecutionResult>> {
        let control = scenario.with_fixture_mode(FixtureMode::Guarded);
        let mut results = Vec::with_capacity(repetitions * 2);
        for _ in 0..repetitions {
            results.push(self.run_scenario(scenario, timeout).await?);
            results.push(self.run_scenario(&control, timeout).await?);
        }
        Ok(results)
    }

    fn corrupted(&self, scenario: &Scenario, detail: String) -> HarnessError {
        #[cfg(feature = "tracing")]
        error!(scenario_id = scenario.id(), detail = %detail, "aborting run");

        HarnessError::TrackerCorrupted {
            scenario_id: scenario.id().to_string(),
            detail,
        }
    }
}
