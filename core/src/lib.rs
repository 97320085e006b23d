//! # Vehicle Registry Core
//!
//! Core ledger for composable vehicle records. Vehicles are root assets with
//! a single owner; MOT history entries are minted by separate collections,
//! bound to one vehicle for good, and owned by whoever owns that vehicle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod capability;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod registry;

/// Re-export common types for ease of use
pub use capability::{AccessControls, Capability, CapabilityRegistry};
pub use config::RegistryConfig;
pub use error::{Denial, RegistryError, Result};
pub use events::{EventListener, EventLog};
pub use ledger::{create_ledger, Ledger, LedgerSnapshot, SharedLedger};
pub use models::{CollectionKind, EventKind, HistoryEntry, MotEntry, RegistryEvent, Vehicle};
pub use registry::{ChildIndex, HistoryRegistry, VehicleRegistry};

/// Ethereum-style address used for accounts and collections
pub use ethers::types::Address;

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
