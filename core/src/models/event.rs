//! Registry events
//!
//! Every successful mutation appends exactly one event to the ledger's log.
//! Events are chained: each one commits to the hash of its predecessor.

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use super::domains;
use crate::crypto;

/// Which kind of collection was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// A vehicle (root asset) collection
    Vehicle,

    /// An MOT history (dependent record) collection
    History,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A collection was created
    CollectionCreated {
        /// Address assigned to the collection
        collection: Address,
        /// Vehicle or history collection
        collection_kind: CollectionKind,
        /// Human-readable label ("make model" or history name)
        label: String,
    },

    /// A vehicle was minted
    VehicleMinted {
        /// Vehicle collection
        collection: Address,
        /// New vehicle id
        vehicle_id: u64,
        /// Initial owner
        owner: Address,
        /// VIN supplied at mint
        vin: String,
    },

    /// A child collection was whitelisted by a vehicle collection
    ChildCollectionWhitelisted {
        /// Vehicle collection
        collection: Address,
        /// Child collection now allowed to attach
        child_collection: Address,
        /// False when the collection was already whitelisted
        newly_added: bool,
    },

    /// A vehicle changed hands
    Transfer {
        /// Vehicle collection
        collection: Address,
        /// Vehicle id
        vehicle_id: u64,
        /// Owner before the transfer
        old_owner: Address,
        /// Owner after the transfer
        new_owner: Address,
    },

    /// The owner approved an operator for a vehicle
    Approval {
        /// Vehicle collection
        collection: Address,
        /// Vehicle id
        vehicle_id: u64,
        /// Owner granting the approval
        owner: Address,
        /// Approved operator (zero clears the approval)
        approved: Address,
    },

    /// A history entry was minted and attached to a vehicle
    HistoryEntryMinted {
        /// History collection
        collection: Address,
        /// New entry id
        entry_id: u64,
        /// Vehicle collection the entry is attached to
        root_collection: Address,
        /// Vehicle the entry is attached to
        root_id: u64,
        /// Owner of the vehicle when the entry was attached
        root_owner: Address,
        /// Hex digest of the entry's immutable fields
        entry_digest: String,
    },
}

impl EventKind {
    /// Short name of the event kind
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CollectionCreated { .. } => "collection_created",
            EventKind::VehicleMinted { .. } => "vehicle_minted",
            EventKind::ChildCollectionWhitelisted { .. } => "child_collection_whitelisted",
            EventKind::Transfer { .. } => "transfer",
            EventKind::Approval { .. } => "approval",
            EventKind::HistoryEntryMinted { .. } => "history_entry_minted",
        }
    }
}

/// An entry in the ledger's event log
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// Position in the log, starting at 0
    pub sequence: u64,

    /// When the mutation committed
    pub timestamp: DateTime<Utc>,

    /// Principal that performed the mutation
    pub actor: Address,

    /// What happened
    pub kind: EventKind,

    /// Hash of the previous event (zero for the first)
    pub prev_hash: [u8; 32],

    /// Hash of this event
    pub hash: [u8; 32],
}

impl Debug for RegistryEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RegistryEvent")
            .field("sequence", &self.sequence)
            .field("actor", &self.actor)
            .field("kind", &self.kind)
            .field("hash", &hex::encode(self.hash))
            .finish()
    }
}

impl RegistryEvent {
    /// Create an event chained onto `prev_hash`
    pub fn new(sequence: u64, actor: Address, kind: EventKind, prev_hash: [u8; 32]) -> Self {
        let mut event = RegistryEvent {
            sequence,
            timestamp: Utc::now(),
            actor,
            kind,
            prev_hash,
            hash: [0; 32],
        };

        event.hash = event.calculate_hash();

        event
    }

    /// Calculate the hash of the event with domain separation
    pub fn calculate_hash(&self) -> [u8; 32] {
        let sequence_bytes = self.sequence.to_be_bytes();
        let timestamp_bytes = self
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_be_bytes();
        let kind_json = serde_json::to_string(&self.kind).unwrap_or_default();

        crypto::secure_hash_multiple(
            domains::EVENT,
            &[
                &sequence_bytes,
                &timestamp_bytes,
                self.actor.as_bytes(),
                kind_json.as_bytes(),
                &self.prev_hash,
            ],
        )
    }

    /// Verify the stored hash against the event contents
    pub fn verify_hash(&self) -> bool {
        crypto::verify_hash(&self.hash, &self.calculate_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> EventKind {
        EventKind::Transfer {
            collection: Address::from_low_u64_be(10),
            vehicle_id: 1,
            old_owner: Address::from_low_u64_be(1),
            new_owner: Address::from_low_u64_be(2),
        }
    }

    #[test]
    fn test_event_hash() {
        let event = RegistryEvent::new(0, Address::from_low_u64_be(1), transfer(), [0; 32]);
        assert!(event.verify_hash());

        let mut tampered = event.clone();
        tampered.actor = Address::from_low_u64_be(3);
        assert!(!tampered.verify_hash());
    }

    #[test]
    fn test_chaining_changes_hash() {
        let first = RegistryEvent::new(0, Address::zero(), transfer(), [0; 32]);
        let mut second = first.clone();
        second.prev_hash = first.hash;
        assert_ne!(second.calculate_hash(), first.hash);
    }

    #[test]
    fn test_kind_serialization_is_externally_tagged() {
        let json = serde_json::to_value(transfer()).unwrap();
        assert_eq!(json["transfer"]["vehicle_id"], 1);
        assert_eq!(transfer().name(), "transfer");
    }
}
