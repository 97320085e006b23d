//! Registry ledger
//!
//! The ledger owns every vehicle and history collection behind a single
//! lock. Each mutation runs start to finish under the write lock and either
//! commits with exactly one event or fails with no state change. Reads share
//! the read lock and always see the last committed state.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use ethers::types::Address;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::capability::{self, Capability, CapabilityRegistry};
use crate::config::RegistryConfig;
use crate::crypto;
use crate::error::{RegistryError, Result};
use crate::events::{EventListener, EventLog};
use crate::models::{CollectionKind, EventKind, HistoryEntry, MotEntry, RegistryEvent, Vehicle};
use crate::registry::{HistoryRegistry, VehicleRegistry};

/// Version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

fn unknown_vehicle_collection(collection: &Address) -> RegistryError {
    RegistryError::NotFound(format!("vehicle collection {:?}", collection))
}

fn unknown_history_collection(collection: &Address) -> RegistryError {
    RegistryError::NotFound(format!("history collection {:?}", collection))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    vehicle_collections: BTreeMap<Address, VehicleRegistry>,
    history_collections: BTreeMap<Address, HistoryRegistry>,

    /// Collections created per deployer, used to derive the next address
    deployer_nonces: HashMap<Address, u64>,

    events: EventLog,
}

impl LedgerState {
    fn vehicles(&self, collection: &Address) -> Result<&VehicleRegistry> {
        self.vehicle_collections
            .get(collection)
            .ok_or_else(|| unknown_vehicle_collection(collection))
    }

    fn vehicles_mut(&mut self, collection: &Address) -> Result<&mut VehicleRegistry> {
        self.vehicle_collections
            .get_mut(collection)
            .ok_or_else(|| unknown_vehicle_collection(collection))
    }

    fn history(&self, collection: &Address) -> Result<&HistoryRegistry> {
        self.history_collections
            .get(collection)
            .ok_or_else(|| unknown_history_collection(collection))
    }

    fn next_collection_address(&mut self, deployer: Address) -> Result<Address> {
        let nonce = self.deployer_nonces.get(&deployer).copied().unwrap_or_default();
        let address = crypto::collection_address(deployer, nonce);

        if self.vehicle_collections.contains_key(&address)
            || self.history_collections.contains_key(&address)
        {
            return Err(RegistryError::State(format!(
                "collection address {:?} is already taken",
                address
            )));
        }

        self.deployer_nonces.insert(deployer, nonce + 1);
        Ok(address)
    }
}

/// Serializable copy of the whole ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Snapshot format version
    pub version: u32,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    state: LedgerState,
}

impl LedgerSnapshot {
    /// Number of events ever committed by the ledger the snapshot came from
    pub fn event_count(&self) -> u64 {
        self.state.events.total()
    }
}

/// The registry ledger
pub struct Ledger {
    state: RwLock<LedgerState>,
    capabilities: Arc<dyn CapabilityRegistry>,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    config: RegistryConfig,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create an empty ledger
    pub fn new(config: RegistryConfig, capabilities: Arc<dyn CapabilityRegistry>) -> Result<Self> {
        Self::with_state(LedgerState::default(), config, capabilities)
    }

    fn with_state(
        state: LedgerState,
        config: RegistryConfig,
        capabilities: Arc<dyn CapabilityRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Ledger {
            state: RwLock::new(state),
            capabilities,
            listeners: RwLock::new(Vec::new()),
            config,
        })
    }

    /// Ledger configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a listener for committed events
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> Result<()> {
        let mut listeners = self.listeners.write()
            .map_err(|e| RegistryError::State(format!("Failed to write listeners: {}", e)))?;

        listeners.push(listener);
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
        self.state.read()
            .map_err(|e| RegistryError::State(format!("Failed to read ledger state: {}", e)))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
        self.state.write()
            .map_err(|e| RegistryError::State(format!("Failed to write ledger state: {}", e)))
    }

    /// Run one mutation under the write lock
    ///
    /// `apply` must validate everything before it changes anything. On
    /// success the returned event is appended before the lock is released
    /// and listeners are notified afterwards.
    fn mutate<T, F>(&self, operation: &str, actor: &Address, apply: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerState, &dyn CapabilityRegistry) -> Result<(T, EventKind)>,
    {
        let (value, event) = {
            let mut state = self.write_state()?;

            let (value, kind) = match apply(&mut *state, &*self.capabilities) {
                Ok(applied) => applied,
                Err(err) => {
                    warn!("Rejected {} by {:?}: {}", operation, actor, err);
                    return Err(err);
                }
            };

            let event = state.events.append(*actor, kind, self.config.max_event_log);
            info!("Committed {} by {:?} as event {}", event.kind.name(), actor, event.sequence);
            (value, event)
        };

        self.notify(&event);
        Ok(value)
    }

    fn notify(&self, event: &RegistryEvent) {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(e) => {
                warn!("Skipping listeners for event {}: {}", event.sequence, e);
                return;
            }
        };

        for listener in listeners {
            listener.on_event(event);
        }
    }

    fn read<T>(&self, query: impl FnOnce(&LedgerState) -> Result<T>) -> Result<T> {
        let state = self.read_state()?;
        query(&state)
    }

    /// Create a vehicle collection; requires the administrator capability
    pub fn create_vehicle_collection(
        &self,
        caller: &Address,
        make: &str,
        model: &str,
    ) -> Result<Address> {
        self.mutate("create_vehicle_collection", caller, |state, capabilities| {
            capability::require(capabilities, caller, Capability::Administrator)?;

            let address = state.next_collection_address(*caller)?;
            state
                .vehicle_collections
                .insert(address, VehicleRegistry::new(address, make, model));

            Ok((
                address,
                EventKind::CollectionCreated {
                    collection: address,
                    collection_kind: CollectionKind::Vehicle,
                    label: format!("{} {}", make, model),
                },
            ))
        })
    }

    /// Create an MOT history collection; requires the administrator capability
    pub fn create_history_collection(&self, caller: &Address, name: &str) -> Result<Address> {
        self.mutate("create_history_collection", caller, |state, capabilities| {
            capability::require(capabilities, caller, Capability::Administrator)?;

            let address = state.next_collection_address(*caller)?;
            state
                .history_collections
                .insert(address, HistoryRegistry::new(address, name));

            Ok((
                address,
                EventKind::CollectionCreated {
                    collection: address,
                    collection_kind: CollectionKind::History,
                    label: name.to_string(),
                },
            ))
        })
    }

    /// Addresses of all vehicle collections
    pub fn vehicle_collections(&self) -> Result<Vec<Address>> {
        self.read(|state| Ok(state.vehicle_collections.keys().copied().collect()))
    }

    /// Addresses of all history collections
    pub fn history_collections(&self) -> Result<Vec<Address>> {
        self.read(|state| Ok(state.history_collections.keys().copied().collect()))
    }

    /// Human-readable label of a collection ("make model" or history name)
    pub fn collection_label(&self, collection: &Address) -> Result<String> {
        self.read(|state| {
            if let Some(vehicles) = state.vehicle_collections.get(collection) {
                return Ok(format!("{} {}", vehicles.make(), vehicles.model()));
            }
            state.history(collection).map(|history| history.name().to_string())
        })
    }

    /// Mint a vehicle; requires the issuer capability
    ///
    /// A rejected mint never consumes an id.
    pub fn mint_vehicle(
        &self,
        caller: &Address,
        collection: &Address,
        vin: &str,
        uri: &str,
        recipient: Address,
    ) -> Result<u64> {
        self.mutate("mint_vehicle", caller, |state, capabilities| {
            capability::require(capabilities, caller, Capability::Issuer)?;

            let vehicle_id = state.vehicles_mut(collection)?.mint(vin, uri, recipient)?;

            Ok((
                vehicle_id,
                EventKind::VehicleMinted {
                    collection: *collection,
                    vehicle_id,
                    owner: recipient,
                    vin: vin.to_string(),
                },
            ))
        })
    }

    /// Allow `child` to attach records to the collection's vehicles
    ///
    /// Requires the administrator capability. Whitelisting twice is not an
    /// error; the return value says whether the address was new.
    pub fn whitelist_child_collection(
        &self,
        caller: &Address,
        collection: &Address,
        child: Address,
    ) -> Result<bool> {
        self.mutate("whitelist_child_collection", caller, |state, capabilities| {
            capability::require(capabilities, caller, Capability::Administrator)?;

            let newly_added = state.vehicles_mut(collection)?.whitelist(child);

            Ok((
                newly_added,
                EventKind::ChildCollectionWhitelisted {
                    collection: *collection,
                    child_collection: child,
                    newly_added,
                },
            ))
        })
    }

    /// Transfer a vehicle; the caller must own it or be approved for it
    pub fn transfer(
        &self,
        caller: &Address,
        collection: &Address,
        vehicle_id: u64,
        new_owner: Address,
    ) -> Result<()> {
        self.mutate("transfer", caller, |state, _| {
            let old_owner = state
                .vehicles_mut(collection)?
                .transfer(caller, vehicle_id, new_owner)?;

            Ok((
                (),
                EventKind::Transfer {
                    collection: *collection,
                    vehicle_id,
                    old_owner,
                    new_owner,
                },
            ))
        })
    }

    /// Approve an operator for a vehicle; only the owner may do this
    pub fn approve(
        &self,
        caller: &Address,
        collection: &Address,
        vehicle_id: u64,
        operator: Address,
    ) -> Result<()> {
        self.mutate("approve", caller, |state, _| {
            let owner = state.vehicles_mut(collection)?.approve(caller, vehicle_id, operator)?;

            Ok((
                (),
                EventKind::Approval {
                    collection: *collection,
                    vehicle_id,
                    owner,
                    approved: operator,
                },
            ))
        })
    }

    /// Current owner of a vehicle
    pub fn owner_of(&self, collection: &Address, vehicle_id: u64) -> Result<Address> {
        self.read(|state| state.vehicles(collection)?.owner_of(vehicle_id))
    }

    /// Full vehicle record
    pub fn vehicle(&self, collection: &Address, vehicle_id: u64) -> Result<Vehicle> {
        self.read(|state| state.vehicles(collection)?.vehicle(vehicle_id).cloned())
    }

    /// VIN recorded for a vehicle
    pub fn vin_of(&self, collection: &Address, vehicle_id: u64) -> Result<String> {
        self.vehicle(collection, vehicle_id).map(|vehicle| vehicle.vin)
    }

    /// Metadata URI of a vehicle
    pub fn token_uri(&self, collection: &Address, vehicle_id: u64) -> Result<String> {
        self.vehicle(collection, vehicle_id).map(|vehicle| vehicle.uri)
    }

    /// Approved operator of a vehicle, if any
    pub fn get_approved(&self, collection: &Address, vehicle_id: u64) -> Result<Option<Address>> {
        self.read(|state| state.vehicles(collection)?.get_approved(vehicle_id))
    }

    /// Number of vehicles in a collection
    pub fn total_supply(&self, collection: &Address) -> Result<u64> {
        self.read(|state| Ok(state.vehicles(collection)?.total_supply()))
    }

    /// Number of vehicles an account owns in a collection
    pub fn balance_of(&self, collection: &Address, account: &Address) -> Result<u64> {
        self.read(|state| Ok(state.vehicles(collection)?.balance_of(account)))
    }

    /// Whether `child` may attach records to the collection's vehicles
    pub fn is_whitelisted(&self, collection: &Address, child: &Address) -> Result<bool> {
        self.read(|state| Ok(state.vehicles(collection)?.is_whitelisted(child)))
    }

    /// Child collections whitelisted by a vehicle collection
    pub fn whitelisted_collections(&self, collection: &Address) -> Result<Vec<Address>> {
        self.read(|state| Ok(state.vehicles(collection)?.whitelisted()))
    }

    /// Number of `child_collection` records attached to a vehicle
    pub fn child_count(
        &self,
        collection: &Address,
        vehicle_id: u64,
        child_collection: &Address,
    ) -> Result<usize> {
        self.read(|state| {
            Ok(state
                .vehicles(collection)?
                .child_count(vehicle_id, child_collection))
        })
    }

    /// Attached child at `index`, in attachment order
    pub fn child_at(
        &self,
        collection: &Address,
        vehicle_id: u64,
        child_collection: &Address,
        index: usize,
    ) -> Result<u64> {
        self.read(|state| state.vehicles(collection)?.child_at(vehicle_id, child_collection, index))
    }

    /// Current owner and vehicle id of an attached child
    pub fn resolve_owner(
        &self,
        collection: &Address,
        child_collection: &Address,
        child_id: u64,
    ) -> Result<(Address, u64)> {
        self.read(|state| state.vehicles(collection)?.owner_of_child(child_collection, child_id))
    }

    /// Mint an MOT history entry bound to a vehicle
    ///
    /// Requires the issuer capability, and the history collection must be
    /// whitelisted by the vehicle collection. The entry is created and
    /// attached together or not at all.
    pub fn mint_history_entry(
        &self,
        caller: &Address,
        history_collection: &Address,
        root_collection: &Address,
        root_id: u64,
        uri: &str,
        mot: MotEntry,
    ) -> Result<u64> {
        let max_advisory_length = self.config.max_advisory_length;

        self.mutate("mint_history_entry", caller, |state, capabilities| {
            capability::require(capabilities, caller, Capability::Issuer)?;

            if mot.advisories.len() > max_advisory_length {
                return Err(RegistryError::InvalidPayload(format!(
                    "advisories are {} bytes, limit is {}",
                    mot.advisories.len(),
                    max_advisory_length
                )));
            }

            let LedgerState {
                vehicle_collections,
                history_collections,
                ..
            } = state;

            let history = history_collections
                .get_mut(history_collection)
                .ok_or_else(|| unknown_history_collection(history_collection))?;
            let vehicles = vehicle_collections
                .get_mut(root_collection)
                .ok_or_else(|| unknown_vehicle_collection(root_collection))?;

            // Attach validates whitelist and vehicle; recording cannot fail
            let root_owner =
                vehicles.attach_child(root_id, *history_collection, history.next_id())?;
            let entry = history.record(*root_collection, root_id, uri, *caller, mot);

            Ok((
                entry.id,
                EventKind::HistoryEntryMinted {
                    collection: *history_collection,
                    entry_id: entry.id,
                    root_collection: *root_collection,
                    root_id,
                    root_owner,
                    entry_digest: hex::encode(entry.digest()),
                },
            ))
        })
    }

    /// Number of entries minted by a history collection
    pub fn history_supply(&self, history_collection: &Address) -> Result<u64> {
        self.read(|state| Ok(state.history(history_collection)?.total_supply()))
    }

    /// History entry by id
    pub fn history_entry(
        &self,
        history_collection: &Address,
        entry_id: u64,
    ) -> Result<HistoryEntry> {
        self.read(|state| state.history(history_collection)?.get(entry_id).cloned())
    }

    /// Current owner and vehicle id of a history entry
    pub fn history_owner(
        &self,
        history_collection: &Address,
        entry_id: u64,
    ) -> Result<(Address, u64)> {
        self.read(|state| {
            let entry = state.history(history_collection)?.get(entry_id)?;
            state
                .vehicles(&entry.root_collection)?
                .owner_of_child(history_collection, entry_id)
        })
    }

    /// Every entry of `history_collection` attached to a vehicle, oldest first
    pub fn history_of(
        &self,
        history_collection: &Address,
        root_collection: &Address,
        root_id: u64,
    ) -> Result<Vec<HistoryEntry>> {
        self.read(|state| {
            let history = state.history(history_collection)?;
            let vehicles = state.vehicles(root_collection)?;
            vehicles.vehicle(root_id)?;

            let entries = vehicles
                .children(root_id, history_collection)
                .iter()
                .map(|id| history.get(*id).cloned())
                .collect::<Result<Vec<_>>>()?;

            debug!(
                "Read {} history entries for vehicle {} of {:?}",
                entries.len(),
                root_id,
                root_collection
            );
            Ok(entries)
        })
    }

    /// Retained events with sequence number `sequence` or later
    pub fn events_since(&self, sequence: u64) -> Result<Vec<RegistryEvent>> {
        self.read(|state| Ok(state.events.since(sequence)))
    }

    /// Most recently committed event still held in memory
    pub fn latest_event(&self) -> Result<Option<RegistryEvent>> {
        self.read(|state| Ok(state.events.last().cloned()))
    }

    /// Number of events ever committed
    pub fn event_count(&self) -> Result<u64> {
        self.read(|state| Ok(state.events.total()))
    }

    /// Number of events still held in memory
    pub fn retained_event_count(&self) -> Result<usize> {
        self.read(|state| Ok(state.events.retained()))
    }

    /// Check the hash chain of the retained events
    pub fn verify_event_chain(&self) -> Result<bool> {
        self.read(|state| Ok(state.events.verify_chain()))
    }

    /// Copy the whole ledger state
    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.read(|state| {
            Ok(LedgerSnapshot {
                version: SNAPSHOT_VERSION,
                taken_at: Utc::now(),
                state: state.clone(),
            })
        })
    }

    /// Write a snapshot to `path`
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &snapshot)?;

        info!("Saved snapshot with {} events to {}", snapshot.event_count(), path.display());
        Ok(())
    }

    /// Write a snapshot to the configured snapshot path, if there is one
    pub fn persist(&self) -> Result<Option<PathBuf>> {
        match &self.config.snapshot_path {
            Some(path) => {
                self.save_snapshot(path)?;
                Ok(Some(path.clone()))
            }
            None => Ok(None),
        }
    }

    /// Rebuild a ledger from a snapshot
    pub fn from_snapshot(
        snapshot: LedgerSnapshot,
        config: RegistryConfig,
        capabilities: Arc<dyn CapabilityRegistry>,
    ) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RegistryError::State(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        Self::with_state(snapshot.state, config, capabilities)
    }

    /// Load a ledger from a snapshot file
    pub fn restore(
        path: &Path,
        config: RegistryConfig,
        capabilities: Arc<dyn CapabilityRegistry>,
    ) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: LedgerSnapshot = bincode::deserialize_from(reader)?;

        info!("Restoring snapshot taken at {} from {}", snapshot.taken_at, path.display());
        Self::from_snapshot(snapshot, config, capabilities)
    }
}

/// Thread-safe ledger handle
pub type SharedLedger = Arc<Ledger>;

/// Create a new shared ledger
pub fn create_ledger(
    config: RegistryConfig,
    capabilities: Arc<dyn CapabilityRegistry>,
) -> Result<SharedLedger> {
    let ledger = Ledger::new(config, capabilities)?;
    Ok(Arc::new(ledger))
}
