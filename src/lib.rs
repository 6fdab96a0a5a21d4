//! Concurrency Hazard Harness
//!
//! A runtime-agnostic harness that deliberately provokes classic concurrency hazards (data races,
//! deadlocks, leaked tasks, handle misuse), observes how each run terminates, and classifies the
//! observations into verdicts confirming or refuting the hazard.
//!
//! # Features
//!
//! - **Survives its own hazards**: every task runs behind a `catch_unwind` fault boundary and a
//!   watchdog. Panics, deadlocks and leaks become data in an [`ExecutionResult`], never a crash.
//! - **Runtime-agnostic**: tasks are spawned through a closure you provide, so any multi-threaded
//!   executor works (Tokio, async-std, smol, ...).
//! - **No leaked threads**: blocking is modelled with pending futures ([`Handle`],
//!   [`ProbeMutex`]), so a task stuck forever holds no worker thread.
//! - **Explicit accounting**: a [`ResourceTracker`] counts running tasks, open handles and lock
//!   ownership per run. Leaks are provisional until a grace period has passed. Tasks spawn
//!   children through [`TaskContext::spawn`], so proliferating tasks are counted too.
//! - **Statistical race oracles**: races are only confirmed by a differential sample, raw fixture
//!   against a guarded control of the same workload.
//! - **Fresh state per run**: no globals. Every run gets its own fixture and tracker.
//!
//! # Quick Start
//!
//! ```no_run
//! use hazardx::{Harness, Lab, ScenarioRegistry};
//!
//! # async {
//! let lab = Lab::new(
//!     ScenarioRegistry::with_builtin_catalog().unwrap(),
//!     Harness::new(|fut| {
//!         tokio::spawn(fut);
//!     }),
//! );
//!
//! for id in lab.registry().list() {
//!     let results = lab.run_default(id, 5).await.unwrap();
//!     let verdict = lab.classify(id, &results).unwrap();
//!     println!("{id}: {:?} ({})", verdict.outcome, verdict.notes);
//! }
//! # };
//! ```
//!
//! # Core Concepts
//!
//! ## Scenario
//!
//! A [`Scenario`] is an immutable description of one hazard: its [`HazardClass`], a
//! [`Workload`] saying what the tasks do, the task count, the fixture mode and the termination
//! modes its oracle accepts. Build one with [`Scenario::builder`]; unset fields take the
//! workload's defaults.
//!
//! ```
//! use hazardx::{FixtureMode, Scenario, Workload};
//!
//! let scenario = Scenario::builder("race", Workload::CounterRace { increments: 1 })
//!     .tasks(500)
//!     .fixture_mode(FixtureMode::Raw)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(scenario.expected_fixture_total(), Some(500));
//! ```
//!
//! Custom behaviour plugs in through [`Workload::Custom`], a factory that builds the task set of
//! each run from a [`RunContext`]:
//!
//! ```
//! use std::sync::Arc;
//! use hazardx::{task_fn, HazardClass, RunContext, Scenario, Workload};
//!
//! let factory = Arc::new(|run: &RunContext| {
//!     (0..run.task_count())
//!         .map(|_| task_fn(|ctx| async move { ctx.fixture().add(2) }))
//!         .collect::<Vec<_>>()
//! });
//!
//! let scenario = Scenario::builder("double-step", Workload::Custom(factory))
//!     .hazard_class(HazardClass::DataRace)
//!     .tasks(100)
//!     .expected_total(200)
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## Harness
//!
//! The [`Harness`] spawns a fresh task set for every run, waits for terminal signals or the
//! watchdog, and aggregates the run into an [`ExecutionResult`] with precedence
//! `Panicked > Deadlocked/TimedOut > Completed`. On timeout it stops waiting but never kills
//! tasks; they are reported as outstanding.
//!
//! ## Classifier
//!
//! [`classify`] (or a configured [`Classifier`]) applies the hazard class's oracle and returns a
//! [`Verdict`]. Too little evidence gives [`Outcome::Inconclusive`], which is a verdict, not an
//! error.
//!
//! ## Registry and Lab
//!
//! [`ScenarioRegistry`] keeps scenarios by id in registration order.
//! [`ScenarioRegistry::with_builtin_catalog`] loads the built-in anti-patterns, at least one per
//! hazard class (see [`catalog`]). [`Lab`] ties a registry, a harness and a classifier together behind
//! `run(id, timeout_millis, repetitions)` and `classify(id, results)`.
//!
//! # Error Handling
//!
//! Fallible operations return [`HarnessResult<T>`]. Configuration mistakes (unknown ids,
//! negative timeouts, inconsistent scenarios) surface immediately. A corrupted tracker aborts
//! the run with [`HarnessError::TrackerCorrupted`]. Task panics are never errors.
//!
//! # Optional Tracing Support
//!
//! Enable the `tracing` feature to get structured events from the harness, tracker, registry and
//! classifier:
//!
//! ```toml
//! [dependencies]
//! hazardx = { version = "0.1", features = ["tracing"] }
//! tracing-subscriber = "0.3"
//! ```
//!
//! ## Log Levels
//!
//! - **INFO**: run start and finish, with termination mode and outstanding counts
//! - **DEBUG**: task panics, registrations, verdicts
//! - **TRACE**: individual terminal signals, late finishers
//! - **WARN**: watchdog fires, tracker corruption
//! - **ERROR**: aborted runs
//!
//! When the feature is disabled (the default) all logging is compiled out.

pub mod catalog;
mod classifier;
mod config;
mod error;
mod fixture;
mod handle;
mod harness;
mod lab;
mod output;
mod registry;
mod scenario;
mod sync;
mod tracker;
mod types;

// Public re-exports
pub use classifier::{classify, leak_rate, Classifier, Outcome, Verdict};
pub use config::{ClassifierConfig, GracePeriod, HarnessConfig, DEFAULT_MIN_SAMPLE};
pub use error::{HarnessError, HarnessResult};
pub use fixture::SharedFixture;
pub use handle::{
    Handle, RecvFuture, SendFuture, CLOSED_SEND_SIGNATURE, DOUBLE_CLOSE_SIGNATURE,
    NIL_CLOSE_SIGNATURE, NIL_SEND_SIGNATURE,
};
pub use harness::Harness;
pub use lab::Lab;
pub use output::{ExecutionResult, LeakSignal};
pub use registry::ScenarioRegistry;
pub use scenario::{
    task_fn, RunContext, Scenario, ScenarioBuilder, TaskContext, TaskFactory, TaskFn, Workload,
};
pub use sync::{
    cancel_pair, CancelToken, CancelTrigger, ProbeGuard, ProbeMutex, WaitGroup,
    NEGATIVE_WAIT_GROUP_SIGNATURE,
};
pub use tracker::{ResourceTracker, TrackerSnapshot};
pub use types::{
    FixtureMode, HandleId, HazardClass, LockId, TaskId, TaskState, TerminationMode,
};
