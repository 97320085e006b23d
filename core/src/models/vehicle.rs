//! Vehicle records (root assets)

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// A minted vehicle
///
/// Only `owner` ever changes, and only through a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Token id, unique within its collection
    pub id: u64,

    /// Current owner
    pub owner: Address,

    /// Vehicle identification number as supplied at mint time
    pub vin: String,

    /// Metadata URI
    pub uri: String,

    /// When the vehicle was minted
    pub minted_at: DateTime<Utc>,
}

impl Vehicle {
    /// Create a vehicle record
    pub fn new(id: u64, owner: Address, vin: String, uri: String) -> Self {
        Vehicle {
            id,
            owner,
            vin,
            uri,
            minted_at: Utc::now(),
        }
    }
}
