//! Error types for scenario registration and execution.
//!
//! Panicking scenario tasks are *not* errors: they are captured at the per-task fault boundary
//! and folded into [`ExecutionResult`](crate::ExecutionResult). Likewise an inconclusive
//! classification is an ordinary [`Verdict`](crate::Verdict). What remains here are
//! configuration mistakes made by the caller and internal integrity failures.

/// Errors that can occur while registering or running scenarios
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum HarnessError {
    /// No scenario with this id is registered
    UnknownScenario { id: String },

    /// A scenario with this id is already registered
    DuplicateScenario { id: String },

    /// Timeout budget is not usable (negative milliseconds)
    InvalidTimeout { millis: i64 },

    /// Scenario definition is inconsistent with its workload
    InvalidScenario { id: String, reason: String },

    /// The resource tracker observed an impossible transition; measurements are void
    TrackerCorrupted { scenario_id: String, detail: String },
}

impl HarnessError {
    /// True for errors caused by how the harness was called or configured.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarnessError::UnknownScenario { .. }
                | HarnessError::DuplicateScenario { .. }
                | HarnessError::InvalidTimeout { .. }
                | HarnessError::InvalidScenario { .. }
        )
    }

    /// True for errors that invalidate measurement integrity.
    pub fn is_internal(&self) -> bool {
        matches!(self, HarnessError::TrackerCorrupted { .. })
    }
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarnessError::UnknownScenario { id } => {
                write!(
                    f,
                    "Scenario '{}' is not registered.\n\
                     \n\
                     Use ScenarioRegistry::list() to see the registered ids.",
                    id
                )
            }
            HarnessError::DuplicateScenario { id } => {
                write!(
                    f,
                    "Scenario '{}' is already registered.\n\
                     \n\
                     Scenario ids must be unique; registered scenarios are never replaced.",
                    id
                )
            }
            HarnessError::InvalidTimeout { millis } => {
                write!(
                    f,
                    "Invalid timeout of {}ms: the timeout budget must not be negative",
                    millis
                )
            }
            HarnessError::InvalidScenario { id, reason } => {
                write!(f, "Scenario '{}' is invalid: {}", id, reason)
            }
            HarnessError::TrackerCorrupted {
                scenario_id,
                detail,
            } => {
                write!(
                    f,
                    "Resource tracker corrupted while running scenario '{}': {}\n\
                     \n\
                     Task and handle accounting can no longer be trusted. The run is aborted.",
                    scenario_id, detail
                )
            }
        }
    }
}

impl std::error::Error for HarnessError {}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;
