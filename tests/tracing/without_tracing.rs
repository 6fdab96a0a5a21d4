//! Tests with tracing feature disabled

use std::time::Duration;

use hazardx::{Harness, Scenario, TerminationMode, Workload};

#[tokio::test(flavor = "multi_thread")]
async fn test_runs_without_tracing() {
    let harness = Harness::new(|fut| {
        tokio::spawn(fut);
    });
    let scenario = Scenario::builder("nil-send", Workload::NilSend)
        .build()
        .unwrap();

    let result = harness
        .run_scenario(&scenario, Duration::from_millis(100))
        .await
        .unwrap();

    assert_eq!(result.termination_mode, TerminationMode::Panicked);
}
