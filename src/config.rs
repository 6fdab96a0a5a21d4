//! Configuration for the harness and the classifier.
//!
//! Both are plain structs with `Default` and chaining `with_*` setters. There is no file or
//! environment configuration.

use std::time::Duration;

/// How long to wait after a run before a nonzero tracker snapshot counts as a confirmed leak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GracePeriod {
    /// Wait as long as the run's timeout.
    #[default]
    EqualToTimeout,
    /// Wait a fixed duration.
    Fixed(Duration),
}

impl GracePeriod {
    pub fn resolve(self, timeout: Duration) -> Duration {
        match self {
            GracePeriod::EqualToTimeout => timeout,
            GracePeriod::Fixed(duration) => duration,
        }
    }
}

/// Harness behaviour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use hazardx::{GracePeriod, HarnessConfig};
///
/// let config = HarnessConfig::default()
///     .with_grace(GracePeriod::Fixed(Duration::from_millis(50)))
///     .with_wait_cycle_detection(true);
///
/// assert_eq!(config.grace.resolve(Duration::from_secs(1)), Duration::from_millis(50));
/// assert!(config.detect_wait_cycles);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarnessConfig {
    pub grace: GracePeriod,
    /// Report [`Deadlocked`](crate::TerminationMode::Deadlocked) instead of `TimedOut` when the
    /// outstanding tasks form a lock wait-for cycle at watchdog time.
    pub detect_wait_cycles: bool,
}

impl HarnessConfig {
    pub fn with_grace(mut self, grace: GracePeriod) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_wait_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_wait_cycles = enabled;
        self
    }
}

/// Smallest sample per fixture mode the race oracles accept.
pub const DEFAULT_MIN_SAMPLE: usize = 2;

/// Classifier behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Runs of each fixture mode required before a race verdict is attempted. Values below 2 are
    /// raised to 2: single-run evidence is never enough.
    pub min_sample: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_sample: DEFAULT_MIN_SAMPLE,
        }
    }
}

impl ClassifierConfig {
    pub fn with_min_sample(mut self, min_sample: usize) -> Self {
        self.min_sample = min_sample.max(DEFAULT_MIN_SAMPLE);
        self
    }
}
