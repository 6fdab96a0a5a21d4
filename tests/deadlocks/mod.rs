//! Deadlock tests: lock-order inversion and handle cycles

use std::time::Duration;

use hazardx::{
    classify, GracePeriod, Harness, HarnessConfig, Scenario, TerminationMode, Workload,
};

use crate::common::{init_tracing, quick_harness, tokio_spawner, SHORT_GRACE};

fn lock_order() -> Scenario {
    Scenario::builder(
        "lock-order-deadlock",
        Workload::LockOrderInversion {
            delay: Duration::from_millis(10),
        },
    )
    .build()
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_order_inversion_times_out() {
    init_tracing();

    let scenario = lock_order();
    let results = quick_harness()
        .run_repeated(&scenario, Duration::from_millis(200), 20)
        .await
        .unwrap();

    let timed_out = results
        .iter()
        .filter(|r| r.termination_mode == TerminationMode::TimedOut)
        .count();
    assert!(timed_out >= 15, "only {timed_out}/20 runs timed out");

    for result in results.iter().filter(|r| r.timed_out()) {
        assert_eq!(result.outstanding_task_count, 2);
        assert_eq!(result.panicked_task_count, 0);
        assert!(result.elapsed >= Duration::from_millis(200));
    }

    let verdict = classify(&scenario, &results);
    assert!(verdict.hazard_confirmed, "{}", verdict.notes);
    assert_eq!(verdict.observed_mode, Some(TerminationMode::TimedOut));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wait_cycle_detection_reports_deadlocked() {
    init_tracing();

    let harness = Harness::with_config(
        tokio_spawner(),
        HarnessConfig::default()
            .with_grace(GracePeriod::Fixed(SHORT_GRACE))
            .with_wait_cycle_detection(true),
    );

    let results = harness
        .run_repeated(&lock_order(), Duration::from_millis(200), 3)
        .await
        .unwrap();

    assert!(results
        .iter()
        .any(|r| r.termination_mode == TerminationMode::Deadlocked));
    assert!(classify(&lock_order(), &results).hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_channel_cycle_blocks_both_tasks() {
    init_tracing();

    let scenario = Scenario::builder("channel-cycle-deadlock", Workload::ChannelCycle)
        .build()
        .unwrap();

    let result = quick_harness()
        .run_scenario(&scenario, Duration::from_millis(100))
        .await
        .unwrap();

    assert_eq!(result.termination_mode, TerminationMode::TimedOut);
    assert_eq!(result.outstanding_task_count, 2);
    assert_eq!(result.outstanding_handle_count, 2);
    assert!(classify(&scenario, &[result]).hazard_confirmed);
}
