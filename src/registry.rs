//! Scenario registry: named, immutable scenarios in registration order.

use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::catalog::builtin_catalog;
use crate::error::{HarnessError, HarnessResult};
use crate::scenario::Scenario;

/// Holds scenarios by id.
///
/// Scenarios are registered once and never mutated or removed.
///
/// # Examples
///
/// ```
/// use hazardx::{Scenario, ScenarioRegistry, Workload};
///
/// let mut registry = ScenarioRegistry::new();
/// registry
///     .register(Scenario::builder("double-close", Workload::DoubleClose).build().unwrap())
///     .unwrap();
///
/// assert_eq!(registry.list(), vec!["double-close"]);
/// assert!(registry.get("double-close").is_ok());
/// assert!(registry.get("missing").is_err());
/// ```
#[derive(Debug, Default)]
pub struct ScenarioRegistry {
    scenarios: Vec<Scenario>,
    index: HashMap<String, usize>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in hazard catalog.
    pub fn with_builtin_catalog() -> HarnessResult<Self> {
        let mut registry = Self::new();
        for scenario in builtin_catalog()? {
            registry.register(scenario)?;
        }
        Ok(registry)
    }

    /// Add a scenario.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::DuplicateScenario` if the id is taken.
    pub fn register(&mut self, scenario: Scenario) -> HarnessResult<()> {
        if self.index.contains_key(scenario.id()) {
            return Err(HarnessError::DuplicateScenario {
                id: scenario.id().to_string(),
            });
        }

        #[cfg(feature = "tracing")]
        debug!(
            scenario_id = scenario.id(),
            hazard_class = %scenario.hazard_class(),
            "registered scenario"
        );

        self.index
            .insert(scenario.id().to_string(), self.scenarios.len());
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Ids in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.scenarios.iter().map(Scenario::id).collect()
    }

    /// Look up a scenario.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::UnknownScenario` if nothing is registered under `id`.
    pub fn get(&self, id: &str) -> HarnessResult<&Scenario> {
        self.index
            .get(id)
            .map(|&position| &self.scenarios[position])
            .ok_or_else(|| HarnessError::UnknownScenario { id: id.to_string() })
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }
}
