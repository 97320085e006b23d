//! Data models for the vehicle registry
//!
//! This module provides the records stored by the ledger: vehicles (root
//! assets), MOT history entries (dependent records) and the events emitted
//! by every successful mutation.

mod event;
mod history;
mod vehicle;

pub use event::{CollectionKind, EventKind, RegistryEvent};
pub use history::{HistoryEntry, MotEntry};
pub use vehicle::Vehicle;

/// Domain constants for hashing
pub mod domains {
    /// Domain for registry events
    pub const EVENT: &str = "VEHICLEREGISTRY_EVENT";

    /// Domain for MOT history entries
    pub const HISTORY_ENTRY: &str = "VEHICLEREGISTRY_MOT";
}
