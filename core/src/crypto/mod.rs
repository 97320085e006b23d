//! Hashing primitives for the registry ledger
//!
//! Event hashes use domain-separated SHA-256. Addresses follow Ethereum
//! conventions: collections get contract-style addresses derived from their
//! deployer and a per-deployer nonce.

use constant_time_eq::constant_time_eq;
use ethers::types::Address;
use ethers::utils::{get_contract_address, keccak256};
use sha2::{Digest, Sha256};

/// Create a domain-separated secure hash using SHA-256
///
/// # Arguments
///
/// * `domain` - Domain prefix (e.g., "EVENT")
/// * `data` - Data to hash
///
/// # Returns
///
/// A 32-byte secure hash with domain separation
pub fn secure_hash(domain: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update(domain.as_bytes());

    // Domain length byte keeps variable-length domains from colliding
    hasher.update([domain.len() as u8]);

    hasher.update(data);

    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Create a domain-separated secure hash of multiple inputs
///
/// # Arguments
///
/// * `domain` - Domain prefix (e.g., "EVENT")
/// * `data` - Vector of data to hash
///
/// # Returns
///
/// A 32-byte secure hash with domain separation
pub fn secure_hash_multiple(domain: &str, data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update(domain.as_bytes());
    hasher.update([domain.len() as u8]);
    hasher.update([data.len() as u8]);

    // Length-prefix every element so concatenations hash differently
    for element in data {
        hasher.update((element.len() as u32).to_be_bytes());
        hasher.update(element);
    }

    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Verify a hash in constant time
pub fn verify_hash(expected: &[u8; 32], actual: &[u8; 32]) -> bool {
    constant_time_eq(expected, actual)
}

/// Address of the `nonce`-th collection created by `deployer`
pub fn collection_address(deployer: Address, nonce: u64) -> Address {
    get_contract_address(deployer, nonce)
}

/// Stable account address for a human-readable label
///
/// Used by the scenario runner so that "garage" or "alice" map to the same
/// account on every run.
pub fn account_from_label(label: &str) -> Address {
    let hash = keccak256(label.as_bytes());
    Address::from_slice(&hash[12..])
}
