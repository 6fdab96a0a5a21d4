//! Registry and lab surface tests: lookup, configuration errors, end-to-end classification

use std::time::Duration;

use hazardx::{
    catalog, GracePeriod, Harness, HarnessConfig, HarnessError, HazardClass, Lab, Outcome,
    Scenario, ScenarioRegistry, Workload,
};

use crate::common::{init_tracing, tokio_spawner};

fn lab() -> Lab<impl Fn(futures::future::BoxFuture<'static, ()>)> {
    Lab::new(
        ScenarioRegistry::with_builtin_catalog().unwrap(),
        Harness::with_config(
            tokio_spawner(),
            HarnessConfig::default().with_grace(GracePeriod::Fixed(Duration::from_millis(25))),
        ),
    )
}

#[test]
fn test_registry_lists_in_registration_order() {
    let mut registry = ScenarioRegistry::new();
    for id in ["a", "b", "c"] {
        registry
            .register(Scenario::builder(id, Workload::NilSend).build().unwrap())
            .unwrap();
    }

    assert_eq!(registry.list(), vec!["a", "b", "c"]);
    assert!(matches!(
        registry.get("d"),
        Err(HarnessError::UnknownScenario { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_id_is_a_configuration_error() {
    init_tracing();

    let lab = lab();
    let err = lab.run("no-such-hazard", 100, 1).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(
        err,
        HarnessError::UnknownScenario {
            id: "no-such-hazard".to_string()
        }
    );

    assert!(lab.classify("no-such-hazard", &[]).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_negative_timeout_is_rejected() {
    init_tracing();

    let err = lab()
        .run(catalog::DOUBLE_CLOSE, -5, 1)
        .await
        .unwrap_err();
    assert_eq!(err, HarnessError::InvalidTimeout { millis: -5 });
    assert!(err.to_string().contains("-5ms"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_zero_repetitions_classify_as_inconclusive() {
    init_tracing();

    let lab = lab();
    let results = lab.run(catalog::LOCK_ORDER_DEADLOCK, 100, 0).await.unwrap();
    assert!(results.is_empty());

    let verdict = lab.classify(catalog::LOCK_ORDER_DEADLOCK, &results).unwrap();
    assert!(!verdict.hazard_confirmed);
    assert_eq!(verdict.notes, "inconclusive");
    assert_eq!(verdict.observed_mode, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_race_scenarios_run_differentially() {
    init_tracing();

    let lab = lab();
    let results = lab.run(catalog::GLOBAL_MUTATION, 2000, 3).await.unwrap();
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.scenario_id == catalog::GLOBAL_MUTATION));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deterministic_catalog_entries_confirm() {
    init_tracing();

    let lab = lab();
    let deterministic: Vec<String> = lab
        .registry()
        .iter()
        .filter(|s| !s.hazard_class().is_statistical() && !s.is_cancellable())
        .map(|s| s.id().to_string())
        .collect();
    assert_eq!(deterministic.len(), 9);

    for id in &deterministic {
        let results = lab.run_default(id, 2).await.unwrap();
        assert_eq!(results.len(), 2);

        let verdict = lab.classify(id, &results).unwrap();
        assert_eq!(verdict.outcome, Outcome::Confirmed, "{id}: {}", verdict.notes);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellable_catalog_entry_is_refuted() {
    init_tracing();

    let lab = lab();
    let scenario = lab
        .registry()
        .get(catalog::GOROUTINE_LEAK_CANCELLABLE)
        .unwrap();
    assert_eq!(scenario.hazard_class(), HazardClass::GoroutineLeak);

    // Grace must outlast the cancelled receivers winding down.
    let lab = Lab::new(
        ScenarioRegistry::with_builtin_catalog().unwrap(),
        Harness::new(tokio_spawner()),
    );
    let results = lab
        .run(catalog::GOROUTINE_LEAK_CANCELLABLE, 50, 2)
        .await
        .unwrap();
    let verdict = lab
        .classify(catalog::GOROUTINE_LEAK_CANCELLABLE, &results)
        .unwrap();
    assert_eq!(verdict.outcome, Outcome::Refuted);
}
