//! Registries held by the ledger
//!
//! These types carry no locking of their own. The ledger serializes every
//! mutation across all of them.

mod history;
mod index;
mod vehicle;

pub use history::HistoryRegistry;
pub use index::ChildIndex;
pub use vehicle::VehicleRegistry;
