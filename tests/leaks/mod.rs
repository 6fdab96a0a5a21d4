//! Leaked task tests, hazardous and cancellable variants

use std::time::Duration;

use hazardx::{
    classify, leak_rate, GracePeriod, Harness, HarnessConfig, LeakSignal, Scenario,
    TerminationMode, Workload,
};
use test_case::test_case;

use crate::common::{init_tracing, quick_harness, tokio_spawner};

fn blocked_receivers(tasks: usize, cancellable: bool) -> Scenario {
    Scenario::builder("goroutine-leak", Workload::BlockedReceivers { cancellable })
        .tasks(tasks)
        .build()
        .unwrap()
}

#[test_case(1 ; "one task")]
#[test_case(10 ; "ten tasks")]
#[test_case(100 ; "hundred tasks")]
fn test_blocked_receivers_leak_exactly_n(tasks: usize) {
    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let scenario = blocked_receivers(tasks, false);
        let result = quick_harness()
            .run_scenario(&scenario, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(result.termination_mode, TerminationMode::TimedOut);
        assert_eq!(result.outstanding_task_count, tasks);
        assert_eq!(result.outstanding_handle_count, tasks);
        assert_eq!(result.leak, LeakSignal::Confirmed);
        assert!(classify(&scenario, &[result]).hazard_confirmed);
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellable_variant_never_leaks() {
    init_tracing();

    let scenario = blocked_receivers(10, true);
    // Default grace equals the timeout, plenty for cancelled receivers to wind down.
    let results = Harness::new(tokio_spawner())
        .run_repeated(&scenario, Duration::from_millis(50), 5)
        .await
        .unwrap();

    for result in &results {
        assert_eq!(result.outstanding_task_count, 0);
        assert_eq!(result.outstanding_handle_count, 0);
        assert_ne!(result.leak, LeakSignal::Confirmed);
    }
    assert_eq!(leak_rate(&results), 0.0);
    assert!(!classify(&scenario, &results).hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leak_rate_separates_variants() {
    init_tracing();

    let harness = Harness::with_config(
        tokio_spawner(),
        HarnessConfig::default().with_grace(GracePeriod::Fixed(Duration::from_millis(100))),
    );
    let hazardous = harness
        .run_repeated(&blocked_receivers(5, false), Duration::from_millis(30), 3)
        .await
        .unwrap();
    let fixed = harness
        .run_repeated(&blocked_receivers(5, true), Duration::from_millis(30), 3)
        .await
        .unwrap();

    assert_eq!(leak_rate(&hazardous), 1.0);
    assert_eq!(leak_rate(&fixed), 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_provisional_snapshot_is_kept() {
    init_tracing();

    let result = quick_harness()
        .run_scenario(&blocked_receivers(4, false), Duration::from_millis(20))
        .await
        .unwrap();

    assert_eq!(result.provisional.running_count, 4);
    assert_eq!(result.provisional.open_handle_count, 4);
    assert!(result.timed_out());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_select_without_default_leaks_both_handles() {
    init_tracing();

    let scenario = Scenario::builder("select-without-default", Workload::SelectWithoutDefault)
        .tasks(4)
        .build()
        .unwrap();

    let result = quick_harness()
        .run_scenario(&scenario, Duration::from_millis(30))
        .await
        .unwrap();

    assert_eq!(result.termination_mode, TerminationMode::TimedOut);
    assert_eq!(result.outstanding_task_count, 4);
    assert_eq!(result.outstanding_handle_count, 8);
    assert_eq!(result.leak, LeakSignal::Confirmed);
    assert!(classify(&scenario, &[result]).hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_spawn_cascade_leaks_every_leaf() {
    init_tracing();

    let scenario = Scenario::builder(
        "spawn-cascade",
        Workload::SpawnCascade {
            fan_out: 3,
            depth: 3,
        },
    )
    .build()
    .unwrap();
    assert_eq!(scenario.task_count(), 1);

    let result = quick_harness()
        .run_scenario(&scenario, Duration::from_millis(50))
        .await
        .unwrap();

    // Inner levels finish once their children are spawned; only the 27 leaves stay.
    assert_eq!(result.termination_mode, TerminationMode::TimedOut);
    assert_eq!(result.outstanding_task_count, 27);
    assert_eq!(result.outstanding_handle_count, 27);
    assert_eq!(result.leak, LeakSignal::Confirmed);
    assert!(classify(&scenario, &[result]).hazard_confirmed);
}
