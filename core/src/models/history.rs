//! MOT history entries (dependent records)
//!
//! An entry is bound to exactly one vehicle when it is minted and never
//! carries an owner of its own. Who owns it is always answered by looking up
//! the vehicle.

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use super::domains;
use crate::crypto;

/// Result of a single MOT inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotEntry {
    /// Odometer reading at the inspection
    pub mileage: u64,

    /// Whether the vehicle passed
    pub pass: bool,

    /// Free-text advisories (may be empty)
    pub advisories: String,
}

impl MotEntry {
    /// Create an inspection result
    pub fn new(mileage: u64, pass: bool, advisories: impl Into<String>) -> Self {
        MotEntry {
            mileage,
            pass,
            advisories: advisories.into(),
        }
    }
}

/// A minted history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Token id, unique within its history collection
    pub id: u64,

    /// Vehicle collection the entry is bound to
    pub root_collection: Address,

    /// Vehicle the entry is bound to
    pub root_id: u64,

    /// Metadata URI
    pub uri: String,

    /// Garage that issued the entry
    pub issuer: Address,

    /// When the entry was minted
    pub recorded_at: DateTime<Utc>,

    /// Inspection payload
    pub mot: MotEntry,
}

impl HistoryEntry {
    /// Digest over the immutable fields of the entry
    pub fn digest(&self) -> [u8; 32] {
        let id_bytes = self.id.to_be_bytes();
        let root_id_bytes = self.root_id.to_be_bytes();
        let recorded_bytes = self.recorded_at.timestamp_millis().to_be_bytes();
        let mileage_bytes = self.mot.mileage.to_be_bytes();
        let pass_bytes = [self.mot.pass as u8];

        crypto::secure_hash_multiple(
            domains::HISTORY_ENTRY,
            &[
                &id_bytes,
                self.root_collection.as_bytes(),
                &root_id_bytes,
                self.uri.as_bytes(),
                self.issuer.as_bytes(),
                &recorded_bytes,
                &mileage_bytes,
                &pass_bytes,
                self.mot.advisories.as_bytes(),
            ],
        )
    }
}
