//! MOT history collection (dependent record registry)
//!
//! Stores entries and hands out ids. Binding an entry to its vehicle is the
//! ledger's job: it attaches first and only then records the entry, inside
//! one write critical section.

use std::collections::BTreeMap;

use chrono::Utc;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::models::{HistoryEntry, MotEntry};

/// One history collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRegistry {
    address: Address,
    name: String,

    /// Next id to hand out; ids start at 1 and are never reused
    next_id: u64,

    entries: BTreeMap<u64, HistoryEntry>,
}

impl HistoryRegistry {
    /// Create an empty collection
    pub fn new(address: Address, name: impl Into<String>) -> Self {
        HistoryRegistry {
            address,
            name: name.into(),
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id the next recorded entry will receive
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Store an entry under the next id and return it
    pub fn record(
        &mut self,
        root_collection: Address,
        root_id: u64,
        uri: &str,
        issuer: Address,
        mot: MotEntry,
    ) -> &HistoryEntry {
        let id = self.next_id;
        self.next_id += 1;

        self.entries.entry(id).or_insert(HistoryEntry {
            id,
            root_collection,
            root_id,
            uri: uri.to_string(),
            issuer,
            recorded_at: Utc::now(),
            mot,
        })
    }

    /// Entry by id
    pub fn get(&self, id: u64) -> Result<&HistoryEntry> {
        self.entries.get(&id).ok_or_else(|| {
            RegistryError::NotFound(format!("history entry {} in {:?}", id, self.address))
        })
    }

    /// Number of entries recorded
    pub fn total_supply(&self) -> u64 {
        self.entries.len() as u64
    }
}
