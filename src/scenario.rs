//! Declarative scenarios and the task sets they build.
//!
//! A [`Scenario`] bundles a hazard class, a [`Workload`] describing what its tasks do, a task
//! count, a fixture mode, a timeout budget and the termination modes its oracle expects. Scenarios
//! are immutable once built; the harness asks them to [`Scenario::build`] a fresh task set for
//! every run.
//!
//! Each built-in workload variant has exactly one handler in [`Scenario::build`]. External tools
//! plug their own behaviour in through [`Workload::Custom`].

use std::future::Future;
use std::iter;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use futures_timer::Delay;

use crate::error::{HarnessError, HarnessResult};
use crate::fixture::SharedFixture;
use crate::handle::Handle;
use crate::sync::{CancelToken, ProbeMutex, WaitGroup};
use crate::tracker::ResourceTracker;
use crate::types::{FixtureMode, HazardClass, TaskId, TerminationMode};

/// A task body waiting for its context.
pub type TaskFn = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, ()> + Send>;

/// Factory for custom workloads: builds the task set of one run.
pub type TaskFactory = Arc<dyn Fn(&RunContext) -> Vec<TaskFn> + Send + Sync>;

/// Hands a child task to the harness; `false` once the run no longer accepts tasks.
pub(crate) type ChildLauncher = Arc<dyn Fn(TaskId, TaskFn) -> bool + Send + Sync>;

/// Convenience function to create a [`TaskFn`] from an async closure.
///
/// # Examples
///
/// ```
/// use hazardx::{task_fn, TaskFn};
///
/// let task: TaskFn = task_fn(|ctx| async move {
///     ctx.fixture().increment();
/// });
/// ```
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |ctx| f(ctx).boxed())
}

/// Resources of one run, available while a scenario builds its tasks.
pub struct RunContext {
    task_count: usize,
    fixture: Arc<SharedFixture>,
    tracker: Arc<ResourceTracker>,
    cancel: CancelToken,
    next_id: Arc<AtomicUsize>,
    launcher: ChildLauncher,
}

impl RunContext {
    pub(crate) fn new(
        task_count: usize,
        fixture: Arc<SharedFixture>,
        tracker: Arc<ResourceTracker>,
        cancel: CancelToken,
        launcher: ChildLauncher,
    ) -> Self {
        Self {
            task_count,
            fixture,
            tracker,
            cancel,
            next_id: Arc::new(AtomicUsize::new(0)),
            launcher,
        }
    }

    /// Ids below `count` belong to the built task set; children get ids from `count` on.
    pub(crate) fn reserve_task_ids(&self, count: usize) {
        self.next_id.store(count, Ordering::SeqCst);
    }

    /// Number of tasks the scenario asked for.
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn fixture(&self) -> &Arc<SharedFixture> {
        &self.fixture
    }

    /// This run's tracker, for custom workloads that manage their own resources.
    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    /// Open a handle registered with this run's tracker.
    pub fn open_handle<T: Send>(&self, capacity: usize) -> Handle<T> {
        Handle::open(Arc::clone(&self.tracker), capacity)
    }

    /// Create a lock whose ownership this run's tracker can see.
    pub fn new_lock(&self) -> Arc<ProbeMutex> {
        Arc::new(ProbeMutex::new(Arc::clone(&self.tracker)))
    }

    pub(crate) fn task_context(&self, id: TaskId) -> TaskContext {
        TaskContext {
            id,
            fixture: Arc::clone(&self.fixture),
            tracker: Arc::clone(&self.tracker),
            cancel: self.cancel.clone(),
            next_id: Arc::clone(&self.next_id),
            launcher: Arc::clone(&self.launcher),
        }
    }
}

/// What a single task receives when it starts.
pub struct TaskContext {
    id: TaskId,
    fixture: Arc<SharedFixture>,
    tracker: Arc<ResourceTracker>,
    cancel: CancelToken,
    next_id: Arc<AtomicUsize>,
    launcher: ChildLauncher,
}

impl TaskContext {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn fixture(&self) -> &Arc<SharedFixture> {
        &self.fixture
    }

    /// Open a handle from inside a running task.
    pub fn open_handle<T: Send>(&self, capacity: usize) -> Handle<T> {
        Handle::open(Arc::clone(&self.tracker), capacity)
    }

    /// Cancellation token; fired by the harness at timeout for cancellable scenarios only.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Resolves when the run is cancelled.
    ///
    /// The harness fires the token when the watchdog expires, and releases it when the run is
    /// over. Tasks of scenarios that are not cancellable get a token that never resolves.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Spawn a child task into this run without waiting for it.
    ///
    /// The child is tracked like every other task: the run is not complete while it is running
    /// and it counts as outstanding if it never finishes. Returns the child's id, or `None` once
    /// the run is over and the harness no longer accepts tasks.
    ///
    /// # Examples
    ///
    /// ```
    /// use hazardx::task_fn;
    ///
    /// let parent = task_fn(|ctx| async move {
    ///     ctx.spawn(task_fn(|child| async move {
    ///         child.fixture().increment();
    ///     }));
    /// });
    /// ```
    pub fn spawn(&self, body: TaskFn) -> Option<TaskId> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        (self.launcher)(id, body).then_some(id)
    }
}

/// What the tasks of a scenario do.
#[derive(Clone)]
pub enum Workload {
    /// Every task increments the fixture `increments` times.
    CounterRace { increments: u32 },
    /// Task *i* adds *i* to the fixture.
    GlobalMutation,
    /// Two tasks take two locks in opposite order with `delay` between acquisitions.
    LockOrderInversion { delay: Duration },
    /// Two tasks each send on an unbuffered handle, then receive on the other one.
    ChannelCycle,
    /// Every task receives on its own handle that nobody ever sends to.
    ///
    /// With `cancellable`, tasks also listen for cancellation and close their handle.
    BlockedReceivers { cancellable: bool },
    /// A handle is closed up front; every task sends on it.
    ClosedSend,
    /// Every task sends `sends` items into a shared handle of `capacity` with no consumer.
    BufferOverflow { capacity: usize, sends: usize },
    /// Every task closes its handle twice.
    DoubleClose,
    /// Every task sends on a nil handle.
    NilSend,
    /// Every task lazily initializes one shared instance; the fixture counts initializations.
    ///
    /// Plain check-then-act, or with `double_checked` the check repeated under a lock.
    LazyInit { double_checked: bool },
    /// The first `keys` tasks insert one key each into the fixture viewed as a set; the other
    /// `keys` tasks look keys up.
    RacyMap { keys: u32 },
    /// Task 0 waits on a wait group for all other tasks and records how many had finished.
    ///
    /// With a raw fixture each worker registers itself only once running, after `startup`, so
    /// the wait can return early. With a guarded fixture all workers are registered up front.
    WaitGroupMisuse { startup: Duration },
    /// Every task waits on two handles at once, with no fallback; neither ever receives.
    SelectWithoutDefault,
    /// Every task spawns `fan_out` children and returns without waiting for them, `depth`
    /// levels deep. The leaves wait for input nobody sends.
    SpawnCascade { fan_out: usize, depth: u32 },
    /// Externally supplied task set.
    Custom(TaskFactory),
}

impl Workload {
    /// Hazard class a built-in workload provokes; `None` for custom workloads.
    pub fn hazard_class(&self) -> Option<HazardClass> {
        let class = match self {
            Workload::CounterRace { .. } => HazardClass::DataRace,
            Workload::GlobalMutation => HazardClass::UnsynchronizedGlobalMutation,
            Workload::LockOrderInversion { .. } | Workload::ChannelCycle => HazardClass::Deadlock,
            Workload::BlockedReceivers { .. } => HazardClass::GoroutineLeak,
            Workload::ClosedSend | Workload::NilSend => HazardClass::NilOrClosedSend,
            Workload::BufferOverflow { .. } => HazardClass::ChannelMisuse,
            Workload::DoubleClose => HazardClass::DoubleClose,
            Workload::LazyInit { .. }
            | Workload::RacyMap { .. }
            | Workload::WaitGroupMisuse { .. } => HazardClass::DataRace,
            Workload::SelectWithoutDefault | Workload::SpawnCascade { .. } => {
                HazardClass::GoroutineLeak
            }
            Workload::Custom(_) => return None,
        };
        Some(class)
    }

    /// Task count the workload requires, if it is fixed.
    fn required_task_count(&self) -> Option<usize> {
        match self {
            Workload::LockOrderInversion { .. } | Workload::ChannelCycle => Some(2),
            Workload::RacyMap { keys } => Some(*keys as usize * 2),
            _ => None,
        }
    }

    fn default_task_count(&self) -> usize {
        match self {
            Workload::CounterRace { .. } => 1000,
            Workload::GlobalMutation => 100,
            Workload::LockOrderInversion { .. } | Workload::ChannelCycle => 2,
            Workload::BlockedReceivers { .. } => 10,
            Workload::ClosedSend => 5,
            Workload::LazyInit { .. } => 100,
            Workload::RacyMap { keys } => *keys as usize * 2,
            Workload::WaitGroupMisuse { .. } => 6,
            Workload::SelectWithoutDefault => 3,
            Workload::BufferOverflow { .. }
            | Workload::SpawnCascade { .. }
            | Workload::DoubleClose
            | Workload::NilSend
            | Workload::Custom(_) => 1,
        }
    }

    fn default_timeout(&self) -> Duration {
        match self {
            Workload::CounterRace { .. }
            | Workload::GlobalMutation
            | Workload::LazyInit { .. }
            | Workload::RacyMap { .. }
            | Workload::WaitGroupMisuse { .. } => Duration::from_secs(2),
            Workload::LockOrderInversion { .. } | Workload::ChannelCycle => {
                Duration::from_millis(200)
            }
            Workload::BlockedReceivers { .. }
            | Workload::BufferOverflow { .. }
            | Workload::SelectWithoutDefault
            | Workload::SpawnCascade { .. } => Duration::from_millis(100),
            _ => Duration::from_secs(1),
        }
    }

    fn default_expected_modes(&self) -> Vec<TerminationMode> {
        match self {
            Workload::CounterRace { .. }
            | Workload::GlobalMutation
            | Workload::LazyInit { .. }
            | Workload::RacyMap { .. }
            | Workload::WaitGroupMisuse { .. } => vec![TerminationMode::Completed],
            Workload::LockOrderInversion { .. } | Workload::ChannelCycle => {
                vec![TerminationMode::TimedOut, TerminationMode::Deadlocked]
            }
            Workload::BlockedReceivers { .. }
            | Workload::SelectWithoutDefault
            | Workload::SpawnCascade { .. } => {
                vec![TerminationMode::Completed, TerminationMode::TimedOut]
            }
            Workload::BufferOverflow { .. } => vec![TerminationMode::TimedOut],
            Workload::ClosedSend | Workload::DoubleClose | Workload::NilSend => {
                vec![TerminationMode::Panicked]
            }
            Workload::Custom(_) => vec![
                TerminationMode::Completed,
                TerminationMode::TimedOut,
                TerminationMode::Panicked,
                TerminationMode::Deadlocked,
            ],
        }
    }

    fn uses_fixture(&self) -> bool {
        matches!(
            self,
            Workload::CounterRace { .. }
                | Workload::GlobalMutation
                | Workload::LazyInit { .. }
                | Workload::RacyMap { .. }
                | Workload::WaitGroupMisuse { .. }
                | Workload::Custom(_)
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Workload::CounterRace { .. } => "CounterRace",
            Workload::GlobalMutation => "GlobalMutation",
            Workload::LockOrderInversion { .. } => "LockOrderInversion",
            Workload::ChannelCycle => "ChannelCycle",
            Workload::BlockedReceivers { .. } => "BlockedReceivers",
            Workload::ClosedSend => "ClosedSend",
            Workload::BufferOverflow { .. } => "BufferOverflow",
            Workload::DoubleClose => "DoubleClose",
            Workload::NilSend => "NilSend",
            Workload::LazyInit { .. } => "LazyInit",
            Workload::RacyMap { .. } => "RacyMap",
            Workload::WaitGroupMisuse { .. } => "WaitGroupMisuse",
            Workload::SelectWithoutDefault => "SelectWithoutDefault",
            Workload::SpawnCascade { .. } => "SpawnCascade",
            Workload::Custom(_) => "Custom",
        }
    }
}

impl std::fmt::Debug for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Workload::CounterRace { increments } => f
                .debug_struct("CounterRace")
                .field("increments", increments)
                .finish(),
            Workload::LockOrderInversion { delay } => f
                .debug_struct("LockOrderInversion")
                .field("delay", delay)
                .finish(),
            Workload::BlockedReceivers { cancellable } => f
                .debug_struct("BlockedReceivers")
                .field("cancellable", cancellable)
                .finish(),
            Workload::BufferOverflow { capacity, sends } => f
                .debug_struct("BufferOverflow")
                .field("capacity", capacity)
                .field("sends", sends)
                .finish(),
            Workload::LazyInit { double_checked } => f
                .debug_struct("LazyInit")
                .field("double_checked", double_checked)
                .finish(),
            Workload::RacyMap { keys } => f.debug_struct("RacyMap").field("keys", keys).finish(),
            Workload::WaitGroupMisuse { startup } => f
                .debug_struct("WaitGroupMisuse")
                .field("startup", startup)
                .finish(),
            Workload::SpawnCascade { fan_out, depth } => f
                .debug_struct("SpawnCascade")
                .field("fan_out", fan_out)
                .field("depth", depth)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Immutable description of a hazard to provoke.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use hazardx::{HazardClass, Scenario, TerminationMode, Workload};
///
/// let scenario = Scenario::builder(
///     "lock-order-deadlock",
///     Workload::LockOrderInversion { delay: Duration::from_millis(10) },
/// )
/// .timeout(Duration::from_millis(200))
/// .build()
/// .unwrap();
///
/// assert_eq!(scenario.hazard_class(), HazardClass::Deadlock);
/// assert_eq!(scenario.task_count(), 2);
/// assert!(scenario.expects(TerminationMode::TimedOut));
/// ```
#[derive(Clone, Debug)]
pub struct Scenario {
    id: String,
    description: String,
    hazard_class: HazardClass,
    workload: Workload,
    task_count: usize,
    fixture_mode: FixtureMode,
    timeout: Duration,
    expected_modes: Vec<TerminationMode>,
    expected_total: Option<u64>,
    cancellable: bool,
}

impl Scenario {
    /// Start building a scenario with workload defaults.
    pub fn builder(id: impl Into<String>, workload: Workload) -> ScenarioBuilder {
        ScenarioBuilder::new(id.into(), workload)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn hazard_class(&self) -> HazardClass {
        self.hazard_class
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn fixture_mode(&self) -> FixtureMode {
        self.fixture_mode
    }

    /// Timeout budget used when the caller does not supply one.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Termination modes the classifier accepts as consistent with the hazard.
    pub fn expected_termination_modes(&self) -> &[TerminationMode] {
        &self.expected_modes
    }

    pub fn expects(&self, mode: TerminationMode) -> bool {
        self.expected_modes.contains(&mode)
    }

    /// Deterministic fixture total a guarded run must reach, when the workload defines one.
    pub fn expected_fixture_total(&self) -> Option<u64> {
        self.expected_total
    }

    /// Whether runs report the fixture's final value.
    pub fn uses_fixture(&self) -> bool {
        self.workload.uses_fixture()
    }

    /// Whether the harness fires the cancellation token when the watchdog expires.
    pub fn is_cancellable(&self) -> bool {
        self.cancellable
            || matches!(
                self.workload,
                Workload::BlockedReceivers { cancellable: true }
            )
    }

    /// Build the task set of one run.
    pub fn build(&self, run: &RunContext) -> Vec<TaskFn> {
        let n = self.task_count;
        match &self.workload {
            Workload::CounterRace { increments } => {
                let increments = *increments;
                (0..n)
                    .map(|_| {
                        task_fn(move |ctx| async move {
                            for _ in 0..increments {
                                ctx.fixture().increment();
                            }
                        })
                    })
                    .collect()
            }
            Workload::GlobalMutation => (0..n)
                .map(|_| {
                    task_fn(|ctx| async move {
                        let delta = ctx.id().0 as u64;
                        ctx.fixture().add(delta);
                    })
                })
                .collect(),
            Workload::LockOrderInversion { delay } => {
                let first = run.new_lock();
                let second = run.new_lock();
                vec![
                    lock_in_order(Arc::clone(&first), Arc::clone(&second), *delay),
                    lock_in_order(second, first, *delay),
                ]
            }
            Workload::ChannelCycle => {
                let left = run.open_handle::<u64>(0);
                let right = run.open_handle::<u64>(0);
                vec![
                    send_then_recv(left.clone(), right.clone()),
                    send_then_recv(right, left),
                ]
            }
            Workload::BlockedReceivers { cancellable } => {
                let cancellable = *cancellable;
                (0..n)
                    .map(|_| {
                        let handle = run.open_handle::<u64>(0);
                        task_fn(move |ctx| async move {
                            if cancellable {
                                let recv = pin!(handle.recv());
                                let cancelled = pin!(ctx.cancelled());
                                future::select(recv, cancelled).await;
                                handle.close();
                            } else {
                                handle.recv().await;
                            }
                        })
                    })
                    .collect()
            }
            Workload::ClosedSend => {
                let handle = run.open_handle::<usize>(n);
                handle.close();
                (0..n)
                    .map(|_| {
                        let handle = handle.clone();
                        task_fn(move |ctx| async move {
                            handle.send(ctx.id().0).await;
                        })
                    })
                    .collect()
            }
            Workload::BufferOverflow { capacity, sends } => {
                let handle = run.open_handle::<usize>(*capacity);
                let sends = *sends;
                (0..n)
                    .map(|_| {
                        let handle = handle.clone();
                        task_fn(move |_ctx| async move {
                            for item in 0..sends {
                                handle.send(item).await;
                            }
                        })
                    })
                    .collect()
            }
            Workload::DoubleClose => (0..n)
                .map(|_| {
                    let handle = run.open_handle::<()>(0);
                    task_fn(move |_ctx| async move {
                        handle.close();
                        handle.close();
                    })
                })
                .collect(),
            Workload::NilSend => (0..n)
                .map(|_| {
                    task_fn(|_ctx| async move {
                        Handle::<u64>::nil().send(0).await;
                    })
                })
                .collect(),
            Workload::LazyInit { double_checked } => {
                let lock = double_checked.then(|| run.new_lock());
                (0..n)
                    .map(|_| {
                        let lock = lock.clone();
                        task_fn(move |ctx| async move {
                            match lock {
                                None => {
                                    ctx.fixture().initialize();
                                }
                                Some(lock) => {
                                    if ctx.fixture().read() == 0 {
                                        let _guard = lock.lock(ctx.id()).await;
                                        ctx.fixture().initialize();
                                    }
                                }
                            }
                        })
                    })
                    .collect()
            }
            Workload::RacyMap { keys } => {
                let keys = *keys;
                (0..n)
                    .map(|_| {
                        task_fn(move |ctx| async move {
                            let index = ctx.id().0 as u32;
                            if index < keys {
                                ctx.fixture().insert_key(index);
                            } else {
                                let _ = ctx.fixture().contains_key(index - keys);
                            }
                        })
                    })
                    .collect()
            }
            Workload::WaitGroupMisuse { startup } => {
                let startup = *startup;
                let group = Arc::new(WaitGroup::new());
                let finished = Arc::new(AtomicU64::new(0));
                let registered_up_front = run.fixture().mode() == FixtureMode::Guarded;
                if registered_up_front {
                    group.add(n - 1);
                }

                let waiter = {
                    let group = Arc::clone(&group);
                    let finished = Arc::clone(&finished);
                    task_fn(move |ctx| async move {
                        group.wait().await;
                        ctx.fixture().add(finished.load(Ordering::SeqCst));
                    })
                };
                let workers = (1..n).map(|_| {
                    let group = Arc::clone(&group);
                    let finished = Arc::clone(&finished);
                    task_fn(move |_ctx| async move {
                        Delay::new(startup).await;
                        if !registered_up_front {
                            group.add(1);
                        }
                        finished.fetch_add(1, Ordering::SeqCst);
                        group.done();
                    })
                });
                iter::once(waiter).chain(workers).collect()
            }
            Workload::SelectWithoutDefault => (0..n)
                .map(|_| {
                    let first = run.open_handle::<u64>(0);
                    let second = run.open_handle::<u64>(0);
                    task_fn(move |_ctx| async move {
                        future::select(pin!(first.recv()), pin!(second.recv())).await;
                    })
                })
                .collect(),
            Workload::SpawnCascade { fan_out, depth } => {
                (0..n).map(|_| cascade(*fan_out, *depth)).collect()
            }
            Workload::Custom(factory) => factory(run),
        }
    }

    /// Copy of this scenario running against a fixture in `mode`.
    pub(crate) fn with_fixture_mode(&self, mode: FixtureMode) -> Scenario {
        Scenario {
            fixture_mode: mode,
            ..self.clone()
        }
    }
}

fn lock_in_order(first: Arc<ProbeMutex>, second: Arc<ProbeMutex>, delay: Duration) -> TaskFn {
    task_fn(move |ctx| async move {
        let _first = first.lock(ctx.id()).await;
        Delay::new(delay).await;
        let _second = second.lock(ctx.id()).await;
    })
}

fn cascade(fan_out: usize, depth: u32) -> TaskFn {
    task_fn(move |ctx| async move {
        if depth == 0 {
            let input = ctx.open_handle::<u64>(0);
            input.recv().await;
            return;
        }
        for _ in 0..fan_out {
            ctx.spawn(cascade(fan_out, depth - 1));
        }
    })
}

fn send_then_recv(outbound: Handle<u64>, inbound: Handle<u64>) -> TaskFn {
    task_fn(move |ctx| async move {
        outbound.send(ctx.id().0 as u64).await;
        inbound.recv().await;
    })
}

/// Builder for [`Scenario`]; unset fields take the workload's defaults.
#[derive(Debug)]
pub struct ScenarioBuilder {
    id: String,
    workload: Workload,
    description: Option<String>,
    hazard_class: Option<HazardClass>,
    task_count: Option<usize>,
    fixture_mode: FixtureMode,
    timeout: Option<Duration>,
    expected_modes: Option<Vec<TerminationMode>>,
    expected_total: Option<u64>,
    cancellable: bool,
}

impl ScenarioBuilder {
    fn new(id: String, workload: Workload) -> Self {
        Self {
            id,
            workload,
            description: None,
            hazard_class: None,
            task_count: None,
            fixture_mode: FixtureMode::Raw,
            timeout: None,
            expected_modes: None,
            expected_total: None,
            cancellable: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Required for [`Workload::Custom`]; must agree with built-in workloads.
    pub fn hazard_class(mut self, class: HazardClass) -> Self {
        self.hazard_class = Some(class);
        self
    }

    pub fn tasks(mut self, count: usize) -> Self {
        self.task_count = Some(count);
        self
    }

    pub fn fixture_mode(mut self, mode: FixtureMode) -> Self {
        self.fixture_mode = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn expected_modes(mut self, modes: impl IntoIterator<Item = TerminationMode>) -> Self {
        self.expected_modes = Some(modes.into_iter().collect());
        self
    }

    /// Hand tasks a live cancellation token that the harness fires when the watchdog expires.
    pub fn cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }

    /// Fixture total a guarded run must reach; derived automatically for built-in race workloads.
    pub fn expected_total(mut self, total: u64) -> Self {
        self.expected_total = Some(total);
        self
    }

    pub fn build(self) -> HarnessResult<Scenario> {
        let invalid = |reason: String| HarnessError::InvalidScenario {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("scenario id must not be empty".to_string()));
        }

        let hazard_class = match (self.workload.hazard_class(), self.hazard_class) {
            (Some(native), Some(requested)) if native != requested => {
                return Err(invalid(format!(
                    "workload {:?} provokes {} but {} was requested",
                    self.workload, native, requested
                )));
            }
            (Some(native), _) => native,
            (None, Some(requested)) => requested,
            (None, None) => {
                return Err(invalid(
                    "custom workloads must declare a hazard class".to_string(),
                ));
            }
        };

        let task_count = self
            .task_count
            .unwrap_or_else(|| self.workload.default_task_count());
        match &self.workload {
            Workload::RacyMap { keys } if !(1..=64).contains(keys) => {
                return Err(invalid(format!("racy map needs 1 to 64 keys, got {keys}")));
            }
            Workload::WaitGroupMisuse { .. } if task_count < 2 => {
                return Err(invalid(
                    "wait group misuse needs a waiter and at least one worker".to_string(),
                ));
            }
            Workload::SpawnCascade { fan_out: 0, .. } => {
                return Err(invalid("spawn cascade needs a fan-out of at least 1".to_string()));
            }
            _ => {}
        }
        if task_count == 0 && !matches!(self.workload, Workload::Custom(_)) {
            return Err(invalid(format!(
                "workload {:?} needs at least one task",
                self.workload
            )));
        }
        if let Some(required) = self.workload.required_task_count() {
            if task_count != required {
                return Err(invalid(format!(
                    "workload {:?} needs exactly {} tasks, got {}",
                    self.workload, required, task_count
                )));
            }
        }

        let expected_modes = self
            .expected_modes
            .unwrap_or_else(|| self.workload.default_expected_modes());
        if expected_modes.is_empty() {
            return Err(invalid(
                "at least one expected termination mode is required".to_string(),
            ));
        }

        let expected_total = self.expected_total.or(match &self.workload {
            Workload::CounterRace { increments } => Some(task_count as u64 * *increments as u64),
            Workload::GlobalMutation => {
                let n = task_count as u64;
                Some(n * n.saturating_sub(1) / 2)
            }
            Workload::LazyInit { .. } => Some(1),
            Workload::RacyMap { keys } => Some(u64::MAX >> (64 - keys)),
            Workload::WaitGroupMisuse { .. } => Some(task_count as u64 - 1),
            _ => None,
        });

        Ok(Scenario {
            description: self
                .description
                .unwrap_or_else(|| format!("{} ({})", hazard_class, self.workload.name())),
            timeout: self
                .timeout
                .unwrap_or_else(|| self.workload.default_timeout()),
            id: self.id,
            hazard_class,
            workload: self.workload,
            task_count,
            fixture_mode: self.fixture_mode,
            expected_modes,
            expected_total,
            cancellable: self.cancellable,
        })
    }
}
