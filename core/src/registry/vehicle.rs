//! Vehicle collection (root asset registry)
//!
//! Holds the vehicles of one collection, their owners and approvals, the
//! whitelist of history collections allowed to attach to them, and the
//! composability index of what has been attached so far.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use super::index::ChildIndex;
use crate::error::{Denial, RegistryError, Result};
use crate::models::Vehicle;

/// One vehicle collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRegistry {
    address: Address,
    make: String,
    model: String,

    /// Next id to hand out; ids start at 1 and are never reused
    next_id: u64,

    vehicles: BTreeMap<u64, Vehicle>,
    approvals: HashMap<u64, Address>,
    balances: HashMap<Address, u64>,
    whitelist: BTreeSet<Address>,
    index: ChildIndex,
}

impl VehicleRegistry {
    /// Create an empty collection
    pub fn new(address: Address, make: impl Into<String>, model: impl Into<String>) -> Self {
        VehicleRegistry {
            address,
            make: make.into(),
            model: model.into(),
            next_id: 1,
            vehicles: BTreeMap::new(),
            approvals: HashMap::new(),
            balances: HashMap::new(),
            whitelist: BTreeSet::new(),
            index: ChildIndex::new(),
        }
    }

    /// Manufacturer label
    pub fn make(&self) -> &str {
        &self.make
    }

    /// Model label
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Mint a vehicle to `recipient` and return its id
    ///
    /// VINs are labels, not keys: two vehicles may carry the same VIN.
    pub fn mint(&mut self, vin: &str, uri: &str, recipient: Address) -> Result<u64> {
        if recipient.is_zero() {
            return Err(RegistryError::InvalidRecipient);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.vehicles
            .insert(id, Vehicle::new(id, recipient, vin.to_string(), uri.to_string()));
        *self.balances.entry(recipient).or_default() += 1;

        Ok(id)
    }

    /// Allow `child` to attach records to any vehicle of this collection
    ///
    /// Returns false when it was already allowed.
    pub fn whitelist(&mut self, child: Address) -> bool {
        self.whitelist.insert(child)
    }

    /// Whether `child` may attach records
    pub fn is_whitelisted(&self, child: &Address) -> bool {
        self.whitelist.contains(child)
    }

    /// Whitelisted child collections in address order
    pub fn whitelisted(&self) -> Vec<Address> {
        self.whitelist.iter().copied().collect()
    }

    /// Move vehicle `id` to `new_owner`, returning the previous owner
    ///
    /// Only the owner or the approved operator may transfer. The approval is
    /// cleared. Attached children are untouched: their owner is derived.
    pub fn transfer(&mut self, caller: &Address, id: u64, new_owner: Address) -> Result<Address> {
        if new_owner.is_zero() {
            return Err(RegistryError::InvalidRecipient);
        }

        let old_owner = self.owner_of(id)?;
        let approved = self.approvals.get(&id);
        if *caller != old_owner && approved != Some(caller) {
            return Err(RegistryError::Unauthorized {
                principal: *caller,
                denial: Denial::NotOwnerOrApproved(id),
            });
        }

        self.approvals.remove(&id);
        if let Some(balance) = self.balances.get_mut(&old_owner) {
            *balance = balance.saturating_sub(1);
        }
        *self.balances.entry(new_owner).or_default() += 1;
        if let Some(vehicle) = self.vehicles.get_mut(&id) {
            vehicle.owner = new_owner;
        }

        Ok(old_owner)
    }

    /// Approve `operator` to transfer vehicle `id`; the zero address clears it
    pub fn approve(&mut self, caller: &Address, id: u64, operator: Address) -> Result<Address> {
        let owner = self.owner_of(id)?;
        if *caller != owner {
            return Err(RegistryError::Unauthorized {
                principal: *caller,
                denial: Denial::NotOwner(id),
            });
        }

        if operator.is_zero() {
            self.approvals.remove(&id);
        } else {
            self.approvals.insert(id, operator);
        }

        Ok(owner)
    }

    /// Approved operator of vehicle `id`, if any
    pub fn get_approved(&self, id: u64) -> Result<Option<Address>> {
        self.vehicle(id)?;
        Ok(self.approvals.get(&id).copied())
    }

    /// Current owner of vehicle `id`
    pub fn owner_of(&self, id: u64) -> Result<Address> {
        self.vehicle(id).map(|vehicle| vehicle.owner)
    }

    /// Vehicle record
    pub fn vehicle(&self, id: u64) -> Result<&Vehicle> {
        self.vehicles
            .get(&id)
            .ok_or_else(|| RegistryError::NotFound(format!("vehicle {} in {:?}", id, self.address)))
    }

    /// Number of vehicles minted
    pub fn total_supply(&self) -> u64 {
        self.vehicles.len() as u64
    }

    /// Number of vehicles owned by `account`
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Attach `child_id` of `collection` to vehicle `root_id`
    ///
    /// The whitelist is checked first, then the vehicle. Nothing changes
    /// unless both pass. Returns the vehicle's owner at attach time.
    pub fn attach_child(
        &mut self,
        root_id: u64,
        collection: Address,
        child_id: u64,
    ) -> Result<Address> {
        if !self.is_whitelisted(&collection) {
            return Err(RegistryError::NotWhitelisted {
                collection,
                registry: self.address,
            });
        }
        let owner = self.owner_of(root_id)?;

        self.index.attach(root_id, collection, child_id)?;
        Ok(owner)
    }

    /// Number of children of `collection` attached to `root_id`
    pub fn child_count(&self, root_id: u64, collection: &Address) -> usize {
        self.index.child_count(root_id, collection)
    }

    /// Child of `collection` at `index` for `root_id`
    pub fn child_at(&self, root_id: u64, collection: &Address, index: usize) -> Result<u64> {
        self.index.child_at(root_id, collection, index)
    }

    /// All children of `collection` attached to `root_id`
    pub fn children(&self, root_id: u64, collection: &Address) -> &[u64] {
        self.index.children(root_id, collection)
    }

    /// Owner and vehicle id of an attached child
    ///
    /// Ownership is read from the vehicle on every call, so a transfer is
    /// reflected immediately.
    pub fn owner_of_child(&self, collection: &Address, child_id: u64) -> Result<(Address, u64)> {
        let root_id = self
            .index
            .parent_of(collection, child_id)
            .ok_or(RegistryError::NotAttached {
                collection: *collection,
                id: child_id,
            })?;

        Ok((self.owner_of(root_id)?, root_id))
    }
}
