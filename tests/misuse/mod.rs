//! Handle misuse tests: double close, closed and nil sends, overflow

use std::time::Duration;

use hazardx::{
    classify, Scenario, TerminationMode, Workload, CLOSED_SEND_SIGNATURE, DOUBLE_CLOSE_SIGNATURE,
    NIL_SEND_SIGNATURE,
};

use crate::common::{harness, init_tracing, quick_harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_close_panics_every_run() {
    init_tracing();

    let scenario = Scenario::builder("double-close", Workload::DoubleClose)
        .build()
        .unwrap();
    let results = harness()
        .run_repeated(&scenario, Duration::from_millis(200), 10)
        .await
        .unwrap();

    for result in &results {
        assert_eq!(result.termination_mode, TerminationMode::Panicked);
        assert!(result.panicked_with(DOUBLE_CLOSE_SIGNATURE));
        assert_eq!(result.outstanding_task_count, 0);
    }

    let verdict = classify(&scenario, &results);
    assert!(verdict.hazard_confirmed);
    assert_eq!(verdict.confirming_runs, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_on_closed_handle_panics_every_task() {
    init_tracing();

    let scenario = Scenario::builder("send-on-closed", Workload::ClosedSend)
        .tasks(5)
        .build()
        .unwrap();
    let result = harness()
        .run_scenario(&scenario, Duration::from_millis(200))
        .await
        .unwrap();

    assert_eq!(result.termination_mode, TerminationMode::Panicked);
    assert_eq!(result.panicked_task_count, 5);
    assert!(result.panicked_with(CLOSED_SEND_SIGNATURE));
    assert_eq!(result.outstanding_handle_count, 0);
    assert!(classify(&scenario, &[result]).hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nil_send_panics() {
    init_tracing();

    let scenario = Scenario::builder("nil-send", Workload::NilSend)
        .build()
        .unwrap();
    let result = harness()
        .run_scenario(&scenario, Duration::from_millis(200))
        .await
        .unwrap();

    assert!(result.panicked_with(NIL_SEND_SIGNATURE));
    assert!(classify(&scenario, &[result]).hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buffer_overflow_leaves_sender_stuck() {
    init_tracing();

    let scenario = Scenario::builder(
        "buffered-overflow",
        Workload::BufferOverflow {
            capacity: 5,
            sends: 10,
        },
    )
    .build()
    .unwrap();
    let result = quick_harness()
        .run_scenario(&scenario, Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(result.termination_mode, TerminationMode::TimedOut);
    assert_eq!(result.outstanding_task_count, 1);
    assert_eq!(result.outstanding_handle_count, 1);
    assert!(result.panic_message.is_none());
    assert!(classify(&scenario, &[result]).hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buffer_within_capacity_completes() {
    init_tracing();

    let scenario = Scenario::builder(
        "buffered-fits",
        Workload::BufferOverflow {
            capacity: 10,
            sends: 10,
        },
    )
    .expected_modes([TerminationMode::TimedOut, TerminationMode::Completed])
    .build()
    .unwrap();
    let result = quick_harness()
        .run_scenario(&scenario, Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(result.termination_mode, TerminationMode::Completed);
    assert_eq!(result.outstanding_task_count, 0);
    // The buffered handle itself is never closed.
    assert_eq!(result.outstanding_handle_count, 1);
    assert!(!classify(&scenario, &[result]).hazard_confirmed);
}
