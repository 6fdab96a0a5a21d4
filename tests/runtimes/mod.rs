//! Runtime compatibility tests
//!
//! The harness only needs a spawner and works on any executor that runs spawned futures on
//! other threads.

use std::time::Duration;

use futures::future::BoxFuture;
use hazardx::{
    Harness, LeakSignal, Scenario, TerminationMode, Workload, DOUBLE_CLOSE_SIGNATURE,
};
use test_case::test_case;

type Spawner = Box<dyn Fn(BoxFuture<'static, ()>)>;

trait RuntimeTest {
    fn run_hazard_test<F>(self, f: impl FnOnce(Spawner) -> F)
    where
        F: std::future::Future<Output = ()>;
}

struct SmolRuntimeTest;

impl RuntimeTest for SmolRuntimeTest {
    fn run_hazard_test<F>(self, f: impl FnOnce(Spawner) -> F)
    where
        F: std::future::Future<Output = ()>,
    {
        smol::block_on(f(Box::new(|fut: BoxFuture<'static, ()>| {
            smol::spawn(fut).detach()
        })));
    }
}

struct FuturesExecutorRuntimeTest;

impl RuntimeTest for FuturesExecutorRuntimeTest {
    fn run_hazard_test<F>(self, f: impl FnOnce(Spawner) -> F)
    where
        F: std::future::Future<Output = ()>,
    {
        let pool = futures_executor::ThreadPool::new().unwrap();
        futures_executor::block_on(f(Box::new(move |fut: BoxFuture<'static, ()>| {
            pool.spawn_ok(fut)
        })));
    }
}

struct TokioRuntimeTest;

impl RuntimeTest for TokioRuntimeTest {
    fn run_hazard_test<F>(self, f: impl FnOnce(Spawner) -> F)
    where
        F: std::future::Future<Output = ()>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.handle().clone();
        runtime.block_on(f(Box::new(move |fut: BoxFuture<'static, ()>| {
            handle.spawn(fut);
        })));
    }
}

#[test_case(SmolRuntimeTest)]
#[test_case(FuturesExecutorRuntimeTest)]
#[test_case(TokioRuntimeTest)]
fn test_double_close_on_runtime(runner: impl RuntimeTest) {
    runner.run_hazard_test(|spawner| async move {
        let harness = Harness::new(spawner);
        let scenario = Scenario::builder("double-close", Workload::DoubleClose)
            .build()
            .unwrap();

        let result = harness
            .run_scenario(&scenario, Duration::from_millis(500))
            .await
            .unwrap();

        assert!(result.panicked_with(DOUBLE_CLOSE_SIGNATURE));
    });
}

#[test_case(SmolRuntimeTest)]
#[test_case(FuturesExecutorRuntimeTest)]
#[test_case(TokioRuntimeTest)]
fn test_blocked_receivers_on_runtime(runner: impl RuntimeTest) {
    runner.run_hazard_test(|spawner| async move {
        let harness = Harness::new(spawner);
        let scenario = Scenario::builder("leak", Workload::BlockedReceivers { cancellable: false })
            .tasks(3)
            .build()
            .unwrap();

        let result = harness
            .run_scenario(&scenario, Duration::from_millis(30))
            .await
            .unwrap();

        assert_eq!(result.termination_mode, TerminationMode::TimedOut);
        assert_eq!(result.outstanding_task_count, 3);
        assert_eq!(result.leak, LeakSignal::Confirmed);
    });
}

#[test_case(SmolRuntimeTest)]
#[test_case(FuturesExecutorRuntimeTest)]
#[test_case(TokioRuntimeTest)]
fn test_guarded_counter_on_runtime(runner: impl RuntimeTest) {
    runner.run_hazard_test(|spawner| async move {
        let harness = Harness::new(spawner);
        let scenario = Scenario::builder("race", Workload::CounterRace { increments: 5 })
            .tasks(50)
            .fixture_mode(hazardx::FixtureMode::Guarded)
            .build()
            .unwrap();

        let result = harness
            .run_scenario(&scenario, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(result.termination_mode, TerminationMode::Completed);
        assert_eq!(result.final_fixture_value, Some(250));
    });
}
