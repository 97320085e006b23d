//! Error types for the core crate
//!
//! Every rejected registry operation surfaces as one of the variants below.
//! A rejection never leaves partial state behind.

use ethers::types::Address;
use std::fmt;
use std::io;
use thiserror::Error;

use crate::capability::Capability;

/// Reason an [`RegistryError::Unauthorized`] rejection was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// A capability check against the capability registry failed
    MissingCapability(Capability),

    /// Transfer attempted by someone other than the owner or approved operator
    NotOwnerOrApproved(u64),

    /// Approval attempted by someone other than the owner
    NotOwner(u64),
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::MissingCapability(capability) => {
                write!(f, "lacks the {} capability", capability)
            }
            Denial::NotOwnerOrApproved(id) => {
                write!(f, "is neither owner nor approved for vehicle {}", id)
            }
            Denial::NotOwner(id) => write!(f, "does not own vehicle {}", id),
        }
    }
}

/// Core error type
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The caller is not allowed to perform the operation
    #[error("Unauthorized: {principal:?} {denial}")]
    Unauthorized {
        /// Principal that attempted the operation
        principal: Address,
        /// Why the principal was turned away
        denial: Denial,
    },

    /// A referenced collection, asset or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The dependent collection has not been whitelisted by the root registry
    #[error("Collection {collection:?} is not whitelisted by registry {registry:?}")]
    NotWhitelisted {
        /// Dependent collection that tried to attach
        collection: Address,
        /// Root registry that rejected it
        registry: Address,
    },

    /// Reverse lookup for a dependent record found nothing
    #[error("Record {id} of collection {collection:?} is not attached to any vehicle")]
    NotAttached {
        /// Dependent collection
        collection: Address,
        /// Dependent record id
        id: u64,
    },

    /// Child enumeration index is beyond the child count
    #[error("Index {index} out of range (child count {count})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of children attached
        count: usize,
    },

    /// Assets cannot be minted or transferred to the zero address
    #[error("Invalid recipient: the zero address cannot own vehicles")]
    InvalidRecipient,

    /// A record payload failed validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// State management error
    #[error("State management error: {0}")]
    State(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode error
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl RegistryError {
    /// Whether this error is a caller-side rejection rather than an
    /// infrastructure failure (lock poisoning, IO, encoding).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            RegistryError::State(_)
                | RegistryError::Config(_)
                | RegistryError::Io(_)
                | RegistryError::Json(_)
                | RegistryError::Bincode(_)
        )
    }
}

/// Result type for the core crate
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Convert a lock poisoning (or any displayable) error to a State error
pub fn to_state_error<E: std::fmt::Display>(err: E) -> RegistryError {
    RegistryError::State(err.to_string())
}

/// Convert a displayable error to a Config error
pub fn to_config_error<E: std::fmt::Display>(err: E) -> RegistryError {
    RegistryError::Config(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: RegistryError = io_err.into();
        match err {
            RegistryError::Io(_) => {}
            _ => panic!("Expected Io variant"),
        }

        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: RegistryError = json_err.into();
        match err {
            RegistryError::Json(_) => {}
            _ => panic!("Expected Json variant"),
        }

        match to_state_error("poisoned") {
            RegistryError::State(msg) => assert_eq!(msg, "poisoned"),
            _ => panic!("Expected State variant"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::IndexOutOfRange { index: 3, count: 1 };
        assert_eq!(err.to_string(), "Index 3 out of range (child count 1)");

        let err = RegistryError::Unauthorized {
            principal: Address::zero(),
            denial: Denial::MissingCapability(Capability::Issuer),
        };
        assert!(err.to_string().contains("lacks the issuer capability"));

        let err = RegistryError::Unauthorized {
            principal: Address::zero(),
            denial: Denial::NotOwnerOrApproved(4),
        };
        assert!(err.to_string().ends_with("is neither owner nor approved for vehicle 4"));

        let err = RegistryError::NotFound("vehicle 7".to_string());
        assert_eq!(err.to_string(), "Not found: vehicle 7");
    }

    #[test]
    fn test_rejection_classification() {
        assert!(RegistryError::InvalidRecipient.is_rejection());
        assert!(RegistryError::NotAttached { collection: Address::zero(), id: 1 }.is_rejection());
        assert!(!RegistryError::State("x".to_string()).is_rejection());
    }
}
