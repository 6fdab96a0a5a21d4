//! # Classify the Built-in Hazard Catalog
//!
//! Runs every built-in scenario a few times and prints the verdict for each.
//!
//! ## What You'll Learn
//! - How to load the built-in catalog into a registry
//! - How to drive runs by id through a `Lab`
//! - How statistical (race) and deterministic hazards are classified
//!
//! ## Running This Example
//! ```bash
//! cargo run --example classify_catalog
//! ```
//!
//! ## Expected Output (race lines vary run to run)
//! ```text
//! data-race-counter           data race                       Confirmed     4/5 raw runs diverged ...
//! lock-order-deadlock         deadlock                        Confirmed     blocked tasks observed in 5/5 runs
//! goroutine-leak-cancellable  task leak                       Refuted       no confirmed leaks in 5 runs
//! double-checked-init         data race                       Refuted       all 5 raw runs reached 1; ...
//! ...
//! ```

use std::time::Duration;

use hazardx::{leak_rate, GracePeriod, Harness, HarnessConfig, Lab, ScenarioRegistry};

const REPETITIONS: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let harness = Harness::with_config(
        |fut| {
            tokio::spawn(fut);
        },
        HarnessConfig::default()
            .with_grace(GracePeriod::Fixed(Duration::from_millis(100)))
            .with_wait_cycle_detection(true),
    );
    let lab = Lab::new(ScenarioRegistry::with_builtin_catalog()?, harness);

    let ids: Vec<String> = lab.registry().list().into_iter().map(String::from).collect();
    for id in &ids {
        let scenario = lab.registry().get(id)?;
        let results = lab.run_default(id, REPETITIONS).await?;
        let verdict = lab.classify(id, &results)?;

        println!(
            "{:<28}{:<32}{:<14}{}",
            id,
            scenario.hazard_class().to_string(),
            format!("{:?}", verdict.outcome),
            verdict.notes
        );

        if scenario.hazard_class() == hazardx::HazardClass::GoroutineLeak {
            println!("{:<28}leak rate {:.2}", "", leak_rate(&results));
        }
    }

    Ok(())
}
