//! Id-based surface for external runners: look up, run, classify.

use std::time::Duration;

use futures::future::BoxFuture;

#[cfg(feature = "tracing")]
use tracing::info;

use crate::classifier::{Classifier, Verdict};
use crate::error::{HarnessError, HarnessResult};
use crate::harness::Harness;
use crate::output::ExecutionResult;
use crate::registry::ScenarioRegistry;

/// A registry, a harness and a classifier wired together.
///
/// # Examples
///
/// ```no_run
/// use hazardx::{Harness, Lab, ScenarioRegistry};
///
/// # async {
/// let lab = Lab::new(
///     ScenarioRegistry::with_builtin_catalog().unwrap(),
///     Harness::new(|fut| {
///         tokio::spawn(fut);
///     }),
/// );
///
/// let results = lab.run("lock-order-deadlock", 200, 5).await.unwrap();
/// let verdict = lab.classify("lock-order-deadlock", &results).unwrap();
/// assert!(verdict.hazard_confirmed);
/// # };
/// ```
pub struct Lab<S> {
    registry: ScenarioRegistry,
    harness: Harness<S>,
    classifier: Classifier,
}

impl<S> Lab<S>
where
    S: Fn(BoxFuture<'static, ()>),
{
    pub fn new(registry: ScenarioRegistry, harness: Harness<S>) -> Self {
        Self {
            registry,
            harness,
            classifier: Classifier::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    pub fn harness(&self) -> &Harness<S> {
        &self.harness
    }

    /// Run the scenario registered as `id`.
    ///
    /// Race scenarios run differentially: every repetition yields one run in the scenario's
    /// fixture mode and one guarded control run, so `2 * repetitions` results come back. All
    /// other scenarios yield `repetitions` results.
    ///
    /// # Errors
    ///
    /// - `HarnessError::InvalidTimeout` if `timeout_millis` is negative
    /// - `HarnessError::UnknownScenario` if `id` is not registered
    /// - `HarnessError::TrackerCorrupted` if any run lost track of its resources
    pub async fn run(
        &self,
        id: &str,
        timeout_millis: i64,
        repetitions: usize,
    ) -> HarnessResult<Vec<ExecutionResult>> {
        let timeout = u64::try_from(timeout_millis)
            .map(Duration::from_millis)
            .map_err(|_| HarnessError::InvalidTimeout {
                millis: timeout_millis,
            })?;
        self.run_for(id, timeout, repetitions).await
    }

    /// Run with the scenario's own timeout budget.
    pub async fn run_default(
        &self,
        id: &str,
        repetitions: usize,
    ) -> HarnessResult<Vec<ExecutionResult>> {
        let timeout = self.registry.get(id)?.timeout();
        self.run_for(id, timeout, repetitions).await
    }

    /// Classify results previously produced for `id`.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::UnknownScenario` if `id` is not registered.
    pub fn classify(&self, id: &str, results: &[ExecutionResult]) -> HarnessResult<Verdict> {
        let scenario = self.registry.get(id)?;
        Ok(self.classifier.classify(scenario, results))
    }

    async fn run_for(
        &self,
        id: &str,
        timeout: Duration,
        repetitions: usize,
    ) -> HarnessResult<Vec<ExecutionResult>> {
        let scenario = self.registry.get(id)?;

        #[cfg(feature = "tracing")]
        info!(
            scenario_id = id,
            repetitions,
            differential = scenario.hazard_class().is_statistical(),
            "running scenario"
        );

        if scenario.hazard_class().is_statistical() {
            self.harness
                .run_differential(scenario, timeout, repetitions)
                .await
        } else {
            self.harness
                .run_repeated(scenario, timeout, repetitions)
                .await
        }
    }
}

impl<S> std::fmt::Debug for Lab<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lab")
            .field("registry", &self.registry)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}
