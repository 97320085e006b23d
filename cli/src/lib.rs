//! Command-line front end for the vehicle registry
//!
//! Replays JSON scenario files against a ledger and reports what happened.

pub mod scenario;

pub use scenario::{access_controls, Report, Runner, Scenario, Step};

use std::path::Path;

use anyhow::{Context, Result};

/// Read and parse a scenario file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening scenario {}", path.display()))?;
    let scenario = serde_json::from_reader(file)
        .with_context(|| format!("parsing scenario {}", path.display()))?;
    Ok(scenario)
}
