//! Scenario files
//!
//! A scenario names its accounts and collections with plain labels and lists
//! the registry calls to make, in order. Every call is made against a fresh
//! (or restored) ledger and its outcome recorded. A rejected call does not
//! stop the run unless the scenario is strict.
//!
//! A collection is named by the label it was given in the scenario, by its
//! label in the ledger ("make model" or history name) when the ledger was
//! restored from a snapshot, or by its `0x` address.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use vehicle_registry_core::crypto::account_from_label;
use vehicle_registry_core::{
    AccessControls, Address, Ledger, MotEntry, RegistryError, RegistryEvent,
};

/// A scenario file
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Label of the account holding the administrator capability
    pub admin: String,

    /// Labels of accounts granted the issuer capability up front
    #[serde(default)]
    pub issuers: Vec<String>,

    /// Abort on the first failing step
    #[serde(default)]
    pub strict: bool,

    /// Calls to make, in order
    pub steps: Vec<Step>,
}

/// One registry call
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Create a vehicle collection and remember it as `name`
    CreateVehicleCollection {
        #[serde(rename = "as")]
        actor: String,
        name: String,
        make: String,
        model: String,
    },

    /// Create a history collection and remember it as `name`
    CreateHistoryCollection {
        #[serde(rename = "as")]
        actor: String,
        name: String,
        label: String,
    },

    /// Whitelist `child` on the vehicle collection `collection`
    Whitelist {
        #[serde(rename = "as")]
        actor: String,
        collection: String,
        child: String,
    },

    /// Mint a vehicle
    MintVehicle {
        #[serde(rename = "as")]
        actor: String,
        collection: String,
        vin: String,
        #[serde(default)]
        uri: String,
        to: String,
    },

    /// Mint an MOT entry onto a vehicle
    MintHistory {
        #[serde(rename = "as")]
        actor: String,
        collection: String,
        vehicles: String,
        vehicle_id: u64,
        #[serde(default)]
        uri: String,
        mileage: u64,
        pass: bool,
        #[serde(default)]
        advisories: String,
    },

    /// Transfer a vehicle
    Transfer {
        #[serde(rename = "as")]
        actor: String,
        collection: String,
        vehicle_id: u64,
        to: String,
    },

    /// Approve an operator for a vehicle
    Approve {
        #[serde(rename = "as")]
        actor: String,
        collection: String,
        vehicle_id: u64,
        operator: String,
    },

    /// Query the owner of a vehicle
    OwnerOf { collection: String, vehicle_id: u64 },

    /// Query the children a vehicle holds from one collection
    Children {
        collection: String,
        vehicle_id: u64,
        child_collection: String,
    },

    /// Query who owns a history entry, through its vehicle
    ResolveOwner {
        vehicles: String,
        collection: String,
        entry_id: u64,
    },

    /// Query every entry a vehicle holds from one history collection
    HistoryOf {
        collection: String,
        vehicles: String,
        vehicle_id: u64,
    },

    /// Query one history entry
    HistoryEntry { collection: String, entry_id: u64 },

    /// Query whether `child` may attach to vehicles of `collection`
    IsWhitelisted { collection: String, child: String },
}

impl Step {
    /// Operation name as written in the scenario
    pub fn name(&self) -> &'static str {
        match self {
            Step::CreateVehicleCollection { .. } => "create_vehicle_collection",
            Step::CreateHistoryCollection { .. } => "create_history_collection",
            Step::Whitelist { .. } => "whitelist",
            Step::MintVehicle { .. } => "mint_vehicle",
            Step::MintHistory { .. } => "mint_history",
            Step::Transfer { .. } => "transfer",
            Step::Approve { .. } => "approve",
            Step::OwnerOf { .. } => "owner_of",
            Step::Children { .. } => "children",
            Step::ResolveOwner { .. } => "resolve_owner",
            Step::HistoryOf { .. } => "history_of",
            Step::HistoryEntry { .. } => "history_entry",
            Step::IsWhitelisted { .. } => "is_whitelisted",
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Position of the step in the scenario
    pub index: usize,

    /// Operation name
    pub op: &'static str,

    /// Result value on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Collection labels and the addresses they were given
    pub collections: HashMap<String, Address>,

    /// Per-step outcomes
    pub outcomes: Vec<StepOutcome>,

    /// Events committed during the run
    pub events: Vec<RegistryEvent>,

    /// Whether the event chain verified at the end of the run
    pub chain_verified: bool,
}

impl Report {
    /// Number of failed steps
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.error.is_some()).count()
    }
}

/// Role table for a scenario: admin plus the listed issuers
pub fn access_controls(scenario: &Scenario) -> Result<Arc<AccessControls>> {
    let admin = account_from_label(&scenario.admin);
    let controls = AccessControls::new(admin);

    for issuer in &scenario.issuers {
        controls
            .grant_issuer(&admin, account_from_label(issuer))
            .with_context(|| format!("granting issuer role to '{}'", issuer))?;
    }

    Ok(Arc::new(controls))
}

/// Whether a failed step was turned down by the ledger, as opposed to the
/// ledger itself failing (poisoned lock, IO)
pub fn is_rejection(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RegistryError>().map_or(true, RegistryError::is_rejection)
}

/// Drives a ledger through the steps of a scenario
pub struct Runner<'a> {
    ledger: &'a Ledger,
    collections: HashMap<String, Address>,
}

impl<'a> Runner<'a> {
    /// Create a runner over `ledger`
    ///
    /// Collections already in the ledger are known by their ledger labels.
    /// When two share a label, a vehicle collection keeps it over a history
    /// collection, then the lower address wins.
    pub fn new(ledger: &'a Ledger) -> Result<Self> {
        let mut collections = HashMap::new();

        let existing = ledger
            .vehicle_collections()?
            .into_iter()
            .chain(ledger.history_collections()?);
        for address in existing {
            let label = ledger.collection_label(&address)?;
            if collections.contains_key(&label) {
                debug!("Label '{}' is taken; {:?} only by address", label, address);
                continue;
            }
            collections.insert(label, address);
        }

        Ok(Runner {
            ledger,
            collections,
        })
    }

    fn collection(&self, name: &str) -> Result<Address> {
        if let Some(address) = self.collections.get(name) {
            return Ok(*address);
        }
        if name.starts_with("0x") {
            return name
                .parse::<Address>()
                .with_context(|| format!("parsing collection address '{}'", name));
        }
        Err(anyhow!("unknown collection '{}'", name))
    }

    /// Run every step and collect the outcomes
    pub fn run(mut self, scenario: &Scenario) -> Result<Report> {
        let first_event = self.ledger.event_count()?;
        let mut outcomes = Vec::with_capacity(scenario.steps.len());

        for (index, step) in scenario.steps.iter().enumerate() {
            debug!("Step {}: {}", index, step.name());

            let outcome = match self.apply(step) {
                Ok(result) => StepOutcome {
                    index,
                    op: step.name(),
                    result: Some(result),
                    error: None,
                },
                Err(err) if !is_rejection(&err) => {
                    bail!("step {} ({}) could not run: {:#}", index, step.name(), err);
                }
                Err(err) if scenario.strict => {
                    bail!("step {} ({}) failed: {:#}", index, step.name(), err);
                }
                Err(err) => StepOutcome {
                    index,
                    op: step.name(),
                    result: None,
                    error: Some(format!("{:#}", err)),
                },
            };
            outcomes.push(outcome);
        }

        let report = Report {
            collections: self.collections,
            outcomes,
            events: self.ledger.events_since(first_event)?,
            chain_verified: self.ledger.verify_event_chain()?,
        };

        info!(
            "Scenario finished: {} steps, {} failed, {} events",
            report.outcomes.len(),
            report.failures(),
            report.events.len()
        );
        Ok(report)
    }

    fn apply(&mut self, step: &Step) -> Result<Value> {
        let ledger = self.ledger;

        let value = match step {
            Step::CreateVehicleCollection { actor, name, make, model } => {
                let address =
                    ledger.create_vehicle_collection(&account_from_label(actor), make, model)?;
                self.collections.insert(name.clone(), address);
                json!({ "collection": address })
            }
            Step::CreateHistoryCollection { actor, name, label } => {
                let address = ledger.create_history_collection(&account_from_label(actor), label)?;
                self.collections.insert(name.clone(), address);
                json!({ "collection": address })
            }
            Step::Whitelist { actor, collection, child } => {
                let newly_added = ledger.whitelist_child_collection(
                    &account_from_label(actor),
                    &self.collection(collection)?,
                    self.collection(child)?,
                )?;
                json!({ "newly_added": newly_added })
            }
            Step::MintVehicle { actor, collection, vin, uri, to } => {
                let id = ledger.mint_vehicle(
                    &account_from_label(actor),
                    &self.collection(collection)?,
                    vin,
                    uri,
                    account_from_label(to),
                )?;
                json!({ "vehicle_id": id })
            }
            Step::MintHistory {
                actor,
                collection,
                vehicles,
                vehicle_id,
                uri,
                mileage,
                pass,
                advisories,
            } => {
                let id = ledger.mint_history_entry(
                    &account_from_label(actor),
                    &self.collection(collection)?,
                    &self.collection(vehicles)?,
                    *vehicle_id,
                    uri,
                    MotEntry::new(*mileage, *pass, advisories.clone()),
                )?;
                json!({ "entry_id": id })
            }
            Step::Transfer { actor, collection, vehicle_id, to } => {
                let new_owner = account_from_label(to);
                ledger.transfer(
                    &account_from_label(actor),
                    &self.collection(collection)?,
                    *vehicle_id,
                    new_owner,
                )?;
                json!({ "new_owner": new_owner })
            }
            Step::Approve { actor, collection, vehicle_id, operator } => {
                let operator = account_from_label(operator);
                ledger.approve(
                    &account_from_label(actor),
                    &self.collection(collection)?,
                    *vehicle_id,
                    operator,
                )?;
                json!({ "approved": operator })
            }
            Step::OwnerOf { collection, vehicle_id } => {
                let owner = ledger.owner_of(&self.collection(collection)?, *vehicle_id)?;
                json!({ "owner": owner })
            }
            Step::Children { collection, vehicle_id, child_collection } => {
                let vehicles = self.collection(collection)?;
                let children = self.collection(child_collection)?;
                let count = ledger.child_count(&vehicles, *vehicle_id, &children)?;
                let ids = (0..count)
                    .map(|i| ledger.child_at(&vehicles, *vehicle_id, &children, i))
                    .collect::<vehicle_registry_core::Result<Vec<u64>>>()?;
                json!({ "count": count, "children": ids })
            }
            Step::ResolveOwner { vehicles, collection, entry_id } => {
                let (owner, vehicle_id) = ledger.resolve_owner(
                    &self.collection(vehicles)?,
                    &self.collection(collection)?,
                    *entry_id,
                )?;
                json!({ "owner": owner, "vehicle_id": vehicle_id })
            }
            Step::HistoryOf { collection, vehicles, vehicle_id } => {
                let entries = ledger.history_of(
                    &self.collection(collection)?,
                    &self.collection(vehicles)?,
                    *vehicle_id,
                )?;
                serde_json::to_value(entries)?
            }
            Step::HistoryEntry { collection, entry_id } => {
                let entry = ledger.history_entry(&self.collection(collection)?, *entry_id)?;
                serde_json::to_value(entry)?
            }
            Step::IsWhitelisted { collection, child } => {
                let whitelisted =
                    ledger.is_whitelisted(&self.collection(collection)?, &self.collection(child)?)?;
                json!({ "whitelisted": whitelisted })
            }
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use vehicle_registry_core::RegistryConfig;

    const SCENARIO: &str = r#"{
        "admin": "admin",
        "issuers": ["garage"],
        "steps": [
            {"op": "create_vehicle_collection", "as": "admin", "name": "vehicles", "make": "Tesla", "model": "Model S"},
            {"op": "create_history_collection", "as": "admin", "name": "mot", "label": "MOT History"},
            {"op": "create_history_collection", "as": "admin", "name": "service", "label": "Service History"},
            {"op": "whitelist", "as": "admin", "collection": "vehicles", "child": "mot"},
            {"op": "mint_vehicle", "as": "admin", "collection": "vehicles", "vin": "VIN1", "uri": "rand", "to": "O1"},
            {"op": "mint_history", "as": "garage", "collection": "mot", "vehicles": "vehicles", "vehicle_id": 1, "mileage": 32056, "pass": true},
            {"op": "mint_history", "as": "garage", "collection": "service", "vehicles": "vehicles", "vehicle_id": 1, "mileage": 1, "pass": true},
            {"op": "transfer", "as": "O1", "collection": "vehicles", "vehicle_id": 1, "to": "O2"},
            {"op": "resolve_owner", "vehicles": "vehicles", "collection": "mot", "entry_id": 1},
            {"op": "children", "collection": "vehicles", "vehicle_id": 1, "child_collection": "mot"}
        ]
    }"#;

    const DEMO: &str = include_str!("../../demos/mot_history.json");

    fn run(scenario: &Scenario) -> Result<Report> {
        let controls = access_controls(scenario)?;
        let ledger = Ledger::new(RegistryConfig::testing(), controls)?;
        Runner::new(&ledger)?.run(scenario)
    }

    #[test]
    fn test_scenario_runs_to_completion() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let report = run(&scenario).unwrap();

        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.failures(), 1);
        assert!(report.outcomes[6].error.as_deref().unwrap().contains("not whitelisted"));

        let resolved = report.outcomes[8].result.as_ref().unwrap();
        assert_eq!(resolved["owner"], json!(account_from_label("O2")));
        assert_eq!(resolved["vehicle_id"], 1);

        let children = report.outcomes[9].result.as_ref().unwrap();
        assert_eq!(children["count"], 1);

        // Every successful mutation produced one event; queries produced none
        assert_eq!(report.events.len(), 7);
        assert!(report.chain_verified);
    }

    #[test]
    fn test_strict_scenario_stops_at_first_failure() {
        let mut scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        scenario.strict = true;

        let err = run(&scenario).unwrap_err();
        assert!(err.to_string().contains("step 6"));
    }

    #[test]
    fn test_unknown_collection_label() {
        let scenario: Scenario = serde_json::from_str(
            r#"{"admin": "admin", "steps": [{"op": "owner_of", "collection": "nope", "vehicle_id": 1}]}"#,
        )
        .unwrap();

        let report = run(&scenario).unwrap();
        assert!(report.outcomes[0].error.as_deref().unwrap().contains("unknown collection 'nope'"));
    }

    #[test]
    fn test_demo_scenario() {
        let scenario: Scenario = serde_json::from_str(DEMO).unwrap();
        let report = run(&scenario).unwrap();

        assert_eq!(report.failures(), 0);
        assert_eq!(report.outcomes[6].result.as_ref().unwrap()["children"], json!([1, 2]));
        assert_eq!(
            report.outcomes[7].result.as_ref().unwrap()["owner"],
            json!(account_from_label("vehicle-owner"))
        );
        assert_eq!(
            report.outcomes[9].result.as_ref().unwrap()["owner"],
            json!(account_from_label("second-owner"))
        );

        let history = report.outcomes[10].result.as_ref().unwrap();
        assert_eq!(history[1]["mot"]["pass"], false);
        assert_eq!(report.outcomes[11].result.as_ref().unwrap(), &history[1]);
        assert_eq!(report.outcomes[12].result.as_ref().unwrap()["whitelisted"], true);
    }

    fn steps(body: &str) -> Scenario {
        serde_json::from_str(&format!(r#"{{"admin": "admin", "steps": {}}}"#, body)).unwrap()
    }

    #[test]
    fn test_restored_collections_are_reachable() {
        let demo: Scenario = serde_json::from_str(DEMO).unwrap();
        let controls = access_controls(&demo).unwrap();
        let ledger = Ledger::new(RegistryConfig::testing(), controls.clone()).unwrap();
        let first = Runner::new(&ledger).unwrap().run(&demo).unwrap();
        let mot = first.collections["mot"];

        let file = NamedTempFile::new().unwrap();
        ledger.save_snapshot(file.path()).unwrap();
        let restored = Ledger::restore(file.path(), RegistryConfig::testing(), controls).unwrap();

        let queries = steps(&format!(
            r#"[
                {{"op": "owner_of", "collection": "Tesla Model S", "vehicle_id": 1}},
                {{"op": "history_entry", "collection": "MOT History", "entry_id": 2}},
                {{"op": "is_whitelisted", "collection": "Tesla Model S", "child": "{:?}"}},
                {{"op": "owner_of", "collection": "vehicles", "vehicle_id": 1}}
            ]"#,
            mot
        ));
        let report = Runner::new(&restored).unwrap().run(&queries).unwrap();

        assert_eq!(
            report.outcomes[0].result.as_ref().unwrap()["owner"],
            json!(account_from_label("second-owner"))
        );
        assert_eq!(report.outcomes[1].result.as_ref().unwrap()["mot"]["mileage"], 41210);
        assert_eq!(report.outcomes[2].result.as_ref().unwrap()["whitelisted"], true);
        assert!(report.outcomes[3].error.as_deref().unwrap().contains("unknown collection"));
        assert_eq!(report.collections["MOT History"], mot);
        assert!(report.events.is_empty());
    }

    #[test]
    fn test_bad_address_is_a_step_failure() {
        let controls = access_controls(&steps("[]")).unwrap();
        let ledger = Ledger::new(RegistryConfig::testing(), controls).unwrap();

        let report = Runner::new(&ledger)
            .unwrap()
            .run(&steps(r#"[{"op": "owner_of", "collection": "0xnot-hex", "vehicle_id": 1}]"#))
            .unwrap();

        assert!(report.outcomes[0].error.as_deref().unwrap().contains("0xnot-hex"));
    }

    #[test]
    fn test_rejections_are_told_apart_from_failures() {
        assert!(is_rejection(&anyhow::Error::from(RegistryError::InvalidRecipient)));
        assert!(is_rejection(&anyhow!("unknown collection 'x'")));
        assert!(!is_rejection(&anyhow::Error::from(RegistryError::State("poisoned".to_string()))));
    }
}
