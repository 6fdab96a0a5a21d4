//! Outcome classification: turns run results into a [`Verdict`].
//!
//! Deterministic hazards (deadlock, leak, handle misuse) are confirmable from a single run whose
//! signals match the class's oracle. Races are statistical: they need a sample of raw runs and a
//! sample of guarded control runs of the same workload, and are only confirmed when the raw
//! fixture diverges while the guarded one never does.
//!
//! Insufficient evidence is a normal outcome ([`Outcome::Inconclusive`]), never an error.

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::handle::{CLOSED_SEND_SIGNATURE, DOUBLE_CLOSE_SIGNATURE, NIL_SEND_SIGNATURE};
use crate::output::{ExecutionResult, LeakSignal};
use crate::scenario::Scenario;
use crate::types::{FixtureMode, HazardClass, TerminationMode};

/// How a verdict came out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    /// Enough evidence, and it does not show the hazard.
    Refuted,
    /// Not enough evidence either way.
    Inconclusive,
}

/// Classification of a scenario's results.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub scenario_id: String,
    pub hazard_confirmed: bool,
    /// Most common termination mode among the results; `None` without results.
    pub observed_mode: Option<TerminationMode>,
    /// Human-readable explanation. Never parse this.
    pub notes: String,
    pub outcome: Outcome,
    pub runs: usize,
    /// Runs whose signals matched the oracle.
    pub confirming_runs: usize,
}

impl Verdict {
    pub fn is_inconclusive(&self) -> bool {
        self.outcome == Outcome::Inconclusive
    }
}

/// Applies hazard-specific oracles to run results.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify `results` of `scenario`.
    ///
    /// Results from other scenarios are not filtered out; callers pass the runs they produced.
    pub fn classify(&self, scenario: &Scenario, results: &[ExecutionResult]) -> Verdict {
        let draft = Draft {
            scenario_id: scenario.id().to_string(),
            observed_mode: dominant_mode(results),
            runs: results.len(),
        };

        if results.is_empty() {
            return draft.inconclusive(None);
        }

        let verdict = match scenario.hazard_class() {
            HazardClass::DataRace | HazardClass::UnsynchronizedGlobalMutation => {
                self.race_oracle(scenario, results, draft)
            }
            HazardClass::Deadlock => deterministic(scenario, results, draft, "blocked tasks", |r| {
                r.timed_out() && r.outstanding_task_count > 0 && r.panicked_task_count == 0
            }),
            HazardClass::GoroutineLeak => {
                deterministic(scenario, results, draft, "confirmed leaks", |r| {
                    r.leak == LeakSignal::Confirmed
                        && matches!(
                            r.termination_mode,
                            TerminationMode::Completed | TerminationMode::TimedOut
                        )
                })
            }
            HazardClass::ChannelMisuse => {
                deterministic(scenario, results, draft, "handle misuse", |r| {
                    r.panicked_with(CLOSED_SEND_SIGNATURE)
                        || (r.termination_mode == TerminationMode::TimedOut
                            && r.outstanding_task_count > 0
                            && r.outstanding_handle_count > 0)
                })
            }
            HazardClass::DoubleClose => {
                deterministic(scenario, results, draft, "double closes", |r| {
                    r.panicked_with(DOUBLE_CLOSE_SIGNATURE)
                })
            }
            HazardClass::NilOrClosedSend => {
                deterministic(scenario, results, draft, "invalid sends", |r| {
                    r.panicked_with(CLOSED_SEND_SIGNATURE) || r.panicked_with(NIL_SEND_SIGNATURE)
                })
            }
        };

        #[cfg(feature = "tracing")]
        debug!(
            scenario_id = %verdict.scenario_id,
            outcome = ?verdict.outcome,
            runs = verdict.runs,
            confirming_runs = verdict.confirming_runs,
            "classified results"
        );

        verdict
    }

    fn race_oracle(&self, scenario: &Scenario, results: &[ExecutionResult], draft: Draft) -> Verdict {
        let Some(expected) = scenario.expected_fixture_total() else {
            return draft.inconclusive(Some("no expected fixture total"));
        };

        let finals = |mode: FixtureMode| -> Vec<u64> {
            results
                .iter()
                .filter(|r| {
                    r.fixture_mode == Some(mode) && r.termination_mode == TerminationMode::Completed
                })
                .filter_map(|r| r.final_fixture_value)
                .collect()
        };
        let raw = finals(FixtureMode::Raw);
        let guarded = finals(FixtureMode::Guarded);

        let min_sample = self.config.min_sample;
        if raw.len() < min_sample || guarded.len() < min_sample {
            return draft.inconclusive(Some(&format!(
                "need {} completed runs per fixture mode, have {} raw and {} guarded",
                min_sample,
                raw.len(),
                guarded.len()
            )));
        }

        if let Some(bad) = guarded.iter().find(|&&value| value != expected) {
            return draft.inconclusive(Some(&format!(
                "guarded control reached {bad}, expected {expected}"
            )));
        }

        let divergent = raw.iter().filter(|&&value| value != expected).count();
        if divergent > 0 {
            let lowest = raw.iter().min().copied().unwrap_or(expected);
            draft.decided(
                Outcome::Confirmed,
                divergent,
                format!(
                    "{divergent}/{} raw runs diverged from {expected} (lowest {lowest}); guarded control exact in {} runs",
                    raw.len(),
                    guarded.len()
                ),
            )
        } else {
            draft.decided(
                Outcome::Refuted,
                0,
                format!(
                    "all {} raw runs reached {expected}; no divergence observed",
                    raw.len()
                ),
            )
        }
    }
}

/// Classify with the default configuration.
pub fn classify(scenario: &Scenario, results: &[ExecutionResult]) -> Verdict {
    Classifier::default().classify(scenario, results)
}

/// Fraction of runs that ended with a confirmed leak; `0.0` for no runs.
pub fn leak_rate(results: &[ExecutionResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let leaked = results.iter().filter(|r| r.has_confirmed_leak()).count();
    leaked as f64 / results.len() as f64
}

struct Draft {
    scenario_id: String,
    observed_mode: Option<TerminationMode>,
    runs: usize,
}

impl Draft {
    fn inconclusive(self, reason: Option<&str>) -> Verdict {
        let notes = match reason {
            Some(reason) => format!("inconclusive: {reason}"),
            None => "inconclusive".to_string(),
        };
        self.decided(Outcome::Inconclusive, 0, notes)
    }

    fn decided(self, outcome: Outcome, confirming_runs: usize, notes: String) -> Verdict {
        Verdict {
            scenario_id: self.scenario_id,
            hazard_confirmed: outcome == Outcome::Confirmed,
            observed_mode: self.observed_mode,
            notes,
            outcome,
            runs: self.runs,
            confirming_runs,
        }
    }
}

fn deterministic<F>(
    scenario: &Scenario,
    results: &[ExecutionResult],
    draft: Draft,
    what: &str,
    oracle: F,
) -> Verdict
where
    F: Fn(&ExecutionResult) -> bool,
{
    let confirming = results
        .iter()
        .filter(|r| scenario.expects(r.termination_mode) && oracle(r))
        .count();

    if confirming > 0 {
        draft.decided(
            Outcome::Confirmed,
            confirming,
            format!("{what} observed in {confirming}/{} runs", results.len()),
        )
    } else {
        draft.decided(
            Outcome::Refuted,
            0,
            format!("no {what} in {} runs", results.len()),
        )
    }
}

/// Most frequent mode; ties go to the higher-precedence mode.
fn dominant_mode(results: &[ExecutionResult]) -> Option<TerminationMode> {
    let mut counts: Vec<(TerminationMode, usize)> = Vec::new();
    for result in results {
        match counts.iter_mut().find(|(mode, _)| *mode == result.termination_mode) {
            Some((_, count)) => *count += 1,
            None => counts.push((result.termination_mode, 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(mode, count)| (count, mode.precedence()))
        .map(|(mode, _)| mode)
}
