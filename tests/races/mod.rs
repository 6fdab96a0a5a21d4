//! Data race and unsynchronized global mutation tests, including lazy initialization, the racy
//! map and wait group misuse
//!
//! Races are statistical: these tests run raw workloads next to guarded controls and only
//! assert what must hold in every run (guarded totals) plus divergence somewhere in the sample.

use std::time::Duration;

use hazardx::{classify, FixtureMode, Outcome, Scenario, TerminationMode, Workload};

use crate::common::{harness, init_tracing};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counter_race_diverges_while_guarded_control_is_exact() {
    init_tracing();

    let scenario = Scenario::builder("data-race-counter", Workload::CounterRace { increments: 1 })
        .tasks(1000)
        .build()
        .unwrap();

    let results = harness()
        .run_differential(&scenario, Duration::from_secs(2), 50)
        .await
        .unwrap();
    assert_eq!(results.len(), 100);

    let guarded: Vec<u64> = results
        .iter()
        .filter(|r| r.fixture_mode == Some(FixtureMode::Guarded))
        .filter_map(|r| r.final_fixture_value)
        .collect();
    let raw: Vec<u64> = results
        .iter()
        .filter(|r| r.fixture_mode == Some(FixtureMode::Raw))
        .filter_map(|r| r.final_fixture_value)
        .collect();

    assert_eq!(guarded.len(), 50);
    assert!(guarded.iter().all(|&value| value == 1000), "{guarded:?}");
    assert_eq!(raw.len(), 50);
    assert!(raw.iter().all(|&value| value <= 1000));
    assert!(
        raw.iter().any(|&value| value != 1000),
        "no lost update in 50 raw runs"
    );

    let verdict = classify(&scenario, &results);
    assert!(verdict.hazard_confirmed, "{}", verdict.notes);
    assert_eq!(verdict.observed_mode, Some(TerminationMode::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_global_mutation_guarded_total_is_deterministic() {
    init_tracing();

    let scenario = Scenario::builder("global-mutation", Workload::GlobalMutation)
        .fixture_mode(FixtureMode::Guarded)
        .build()
        .unwrap();

    let results = harness()
        .run_repeated(&scenario, Duration::from_secs(2), 10)
        .await
        .unwrap();

    for result in &results {
        assert_eq!(result.termination_mode, TerminationMode::Completed);
        assert_eq!(result.final_fixture_value, Some(4950));
        assert_eq!(result.outstanding_task_count, 0);
    }

    // A guarded-only sample has no raw evidence either way.
    let verdict = classify(&scenario, &results);
    assert_eq!(verdict.outcome, Outcome::Inconclusive);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_differential_pair_is_inconclusive() {
    init_tracing();

    let scenario = Scenario::builder("race", Workload::CounterRace { increments: 1 })
        .tasks(100)
        .build()
        .unwrap();

    let results = harness()
        .run_differential(&scenario, Duration::from_secs(2), 1)
        .await
        .unwrap();

    let verdict = classify(&scenario, &results);
    assert!(!verdict.hazard_confirmed);
    assert!(verdict.is_inconclusive());
    assert!(verdict.notes.starts_with("inconclusive"));
}

fn split(results: &[hazardx::ExecutionResult]) -> (Vec<u64>, Vec<u64>) {
    let values = |mode: FixtureMode| -> Vec<u64> {
        results
            .iter()
            .filter(|r| r.fixture_mode == Some(mode))
            .filter_map(|r| r.final_fixture_value)
            .collect()
    };
    (values(FixtureMode::Raw), values(FixtureMode::Guarded))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_check_then_act_initializes_more_than_once() {
    init_tracing();

    let scenario = Scenario::builder(
        "lazy-init-race",
        Workload::LazyInit {
            double_checked: false,
        },
    )
    .build()
    .unwrap();

    let results = harness()
        .run_differential(&scenario, Duration::from_secs(2), 30)
        .await
        .unwrap();
    let (raw, guarded) = split(&results);

    assert!(guarded.iter().all(|&inits| inits == 1), "{guarded:?}");
    assert!(raw.iter().all(|&inits| inits >= 1));
    assert!(raw.iter().any(|&inits| inits > 1), "{raw:?}");
    assert_eq!(classify(&scenario, &results).outcome, Outcome::Confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_checked_init_is_refuted() {
    init_tracing();

    let scenario = Scenario::builder(
        "double-checked-init",
        Workload::LazyInit {
            double_checked: true,
        },
    )
    .build()
    .unwrap();

    let results = harness()
        .run_differential(&scenario, Duration::from_secs(2), 10)
        .await
        .unwrap();
    let (raw, guarded) = split(&results);

    assert_eq!(raw.len(), 10);
    assert!(raw.iter().chain(&guarded).all(|&inits| inits == 1));

    let verdict = classify(&scenario, &results);
    assert_eq!(verdict.outcome, Outcome::Refuted, "{}", verdict.notes);
    assert!(!verdict.hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racy_map_loses_keys() {
    init_tracing();

    let scenario = Scenario::builder("racy-map", Workload::RacyMap { keys: 64 })
        .build()
        .unwrap();
    assert_eq!(scenario.task_count(), 128);

    let results = harness()
        .run_differential(&scenario, Duration::from_secs(2), 50)
        .await
        .unwrap();
    let (raw, guarded) = split(&results);

    assert!(guarded.iter().all(|&keys| keys == u64::MAX));
    assert!(
        raw.iter().any(|&keys| keys.count_ones() < 64),
        "no key lost in 50 raw runs"
    );
    assert!(classify(&scenario, &results).hazard_confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wait_group_returns_before_workers_register() {
    init_tracing();

    let scenario = Scenario::builder(
        "wait-group-misuse",
        Workload::WaitGroupMisuse {
            startup: Duration::from_millis(20),
        },
    )
    .build()
    .unwrap();

    let results = harness()
        .run_differential(&scenario, Duration::from_secs(2), 10)
        .await
        .unwrap();
    let (raw, guarded) = split(&results);

    // Every run still completes; only what the waiter saw differs.
    assert!(results
        .iter()
        .all(|r| r.termination_mode == TerminationMode::Completed));
    assert!(guarded.iter().all(|&finished| finished == 5), "{guarded:?}");
    assert!(raw.iter().any(|&finished| finished < 5), "{raw:?}");
    assert!(classify(&scenario, &results).hazard_confirmed);
}
