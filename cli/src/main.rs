use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use vehicle_registry_core::{AccessControls, Address, Ledger, RegistryConfig};
use vehicle_registry_cli::{access_controls, load_scenario, Runner};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Composable vehicle registry scenario runner")]
struct Args {
    /// Config file path
    #[clap(short, long, env = "REGISTRY_CONFIG", global = true)]
    config: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a scenario file and print the report as JSON
    Run {
        /// Scenario file
        scenario: PathBuf,

        /// Start from this snapshot instead of an empty ledger
        #[clap(long)]
        restore: Option<PathBuf>,

        /// Write a snapshot here when the run finishes
        #[clap(long, env = "REGISTRY_SNAPSHOT")]
        snapshot: Option<PathBuf>,

        /// Exit with an error if any step failed
        #[clap(long)]
        fail_on_error: bool,
    },

    /// Load a snapshot and check its event chain
    Verify {
        /// Snapshot file
        snapshot: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RegistryConfig::from_file(path)?,
        None => RegistryConfig::new(),
    };

    env_logger::init_from_env(
        env_logger::Env::default()
            .filter_or(env_logger::DEFAULT_FILTER_ENV, config.log_level.as_str()),
    );

    match args.command {
        Command::Run { scenario, restore, snapshot, fail_on_error } => {
            let scenario = load_scenario(&scenario)?;
            let controls = access_controls(&scenario)?;

            if snapshot.is_some() {
                config.snapshot_path = snapshot;
            }

            let ledger = match restore {
                Some(path) => Ledger::restore(&path, config, controls)?,
                None => Ledger::new(config, controls)?,
            };

            let report = Runner::new(&ledger)?.run(&scenario)?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Some(path) = ledger.persist()? {
                info!("Snapshot written to {}", path.display());
            }

            if fail_on_error && report.failures() > 0 {
                bail!("{} step(s) failed", report.failures());
            }
        }
        Command::Verify { snapshot } => {
            // Verification never mutates, so nobody needs a role
            let controls = std::sync::Arc::new(AccessControls::new(Address::zero()));
            let ledger = Ledger::restore(&snapshot, config, controls)?;

            let events = ledger.event_count()?;
            let retained = ledger.retained_event_count()?;
            if ledger.verify_event_chain()? {
                info!("Event chain verified ({} of {} events retained)", retained, events);
                println!(
                    "ok: {} events ({} retained), {} vehicle collections, {} history collections",
                    events,
                    retained,
                    ledger.vehicle_collections()?.len(),
                    ledger.history_collections()?.len()
                );
            } else {
                warn!("Event chain verification failed");
                bail!("event chain in {} does not verify", snapshot.display());
            }
        }
    }

    Ok(())
}
