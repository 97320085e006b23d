//! Capability boundary
//!
//! The ledger never decides who is an issuer or an administrator. It asks a
//! [`CapabilityRegistry`] and treats the answer as final. [`AccessControls`]
//! is the in-process implementation used by the CLI and the tests.

use std::collections::HashSet;
use std::fmt;
use std::sync::RwLock;

use ethers::types::Address;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{to_state_error, Denial, RegistryError, Result};

/// Named permission checked before a mutating operation proceeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May mint vehicles and MOT history entries (a garage)
    Issuer,

    /// May create collections and manage whitelists
    Administrator,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Issuer => write!(f, "issuer"),
            Capability::Administrator => write!(f, "administrator"),
        }
    }
}

/// Answers "does principal P hold capability C"
#[cfg_attr(test, mockall::automock)]
pub trait CapabilityRegistry: Send + Sync {
    /// Check a single capability
    fn has_capability(&self, principal: &Address, capability: Capability) -> bool;
}

/// Fail with `Unauthorized` unless `principal` holds `capability`
pub fn require(
    registry: &dyn CapabilityRegistry,
    principal: &Address,
    capability: Capability,
) -> Result<()> {
    if registry.has_capability(principal, capability) {
        Ok(())
    } else {
        Err(RegistryError::Unauthorized {
            principal: *principal,
            denial: Denial::MissingCapability(capability),
        })
    }
}

#[derive(Debug, Default)]
struct Roles {
    administrators: HashSet<Address>,
    issuers: HashSet<Address>,
}

/// In-memory role table
///
/// The account the table is created with becomes an administrator and an
/// issuer. Administrators grant and revoke the issuer role and may add
/// further administrators.
#[derive(Debug)]
pub struct AccessControls {
    roles: RwLock<Roles>,
}

impl AccessControls {
    /// Create a role table administered by `admin`
    pub fn new(admin: Address) -> Self {
        let mut roles = Roles::default();
        roles.administrators.insert(admin);
        roles.issuers.insert(admin);

        AccessControls {
            roles: RwLock::new(roles),
        }
    }

    /// Give `account` the issuer role
    pub fn grant_issuer(&self, caller: &Address, account: Address) -> Result<()> {
        let mut roles = self.roles.write().map_err(to_state_error)?;
        Self::require_admin(&roles, caller)?;
        if roles.issuers.insert(account) {
            info!("Granted issuer role to {:?}", account);
        }
        Ok(())
    }

    /// Take the issuer role away from `account`
    pub fn revoke_issuer(&self, caller: &Address, account: &Address) -> Result<()> {
        let mut roles = self.roles.write().map_err(to_state_error)?;
        Self::require_admin(&roles, caller)?;
        if roles.issuers.remove(account) {
            info!("Revoked issuer role from {:?}", account);
        }
        Ok(())
    }

    /// Give `account` the administrator role
    pub fn grant_administrator(&self, caller: &Address, account: Address) -> Result<()> {
        let mut roles = self.roles.write().map_err(to_state_error)?;
        Self::require_admin(&roles, caller)?;
        if roles.administrators.insert(account) {
            info!("Granted administrator role to {:?}", account);
        }
        Ok(())
    }

    fn require_admin(roles: &Roles, caller: &Address) -> Result<()> {
        if roles.administrators.contains(caller) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized {
                principal: *caller,
                denial: Denial::MissingCapability(Capability::Administrator),
            })
        }
    }
}

impl CapabilityRegistry for AccessControls {
    fn has_capability(&self, principal: &Address, capability: Capability) -> bool {
        // A poisoned table grants nothing
        let Ok(roles) = self.roles.read() else {
            return false;
        };
        match capability {
            Capability::Issuer => roles.issuers.contains(principal),
            Capability::Administrator => roles.administrators.contains(principal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_admin_holds_both_capabilities() {
        let controls = AccessControls::new(account(1));

        assert!(controls.has_capability(&account(1), Capability::Administrator));
        assert!(controls.has_capability(&account(1), Capability::Issuer));
        assert!(!controls.has_capability(&account(2), Capability::Issuer));
    }

    #[test]
    fn test_grant_and_revoke_issuer() {
        let controls = AccessControls::new(account(1));
        let garage = account(2);

        controls.grant_issuer(&account(1), garage).unwrap();
        assert!(controls.has_capability(&garage, Capability::Issuer));
        assert!(!controls.has_capability(&garage, Capability::Administrator));

        controls.revoke_issuer(&account(1), &garage).unwrap();
        assert!(!controls.has_capability(&garage, Capability::Issuer));
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let controls = AccessControls::new(account(1));

        let err = controls.grant_issuer(&account(2), account(3)).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Unauthorized {
                denial: Denial::MissingCapability(Capability::Administrator),
                ..
            }
        ));
        assert!(!controls.has_capability(&account(3), Capability::Issuer));
    }

    #[test]
    fn test_require_uses_registry_answer() {
        let mut mock = MockCapabilityRegistry::new();
        mock.expect_has_capability()
            .withf(|_, capability| *capability == Capability::Issuer)
            .return_const(false);

        let err = require(&mock, &account(5), Capability::Issuer).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Unauthorized { principal, .. } if principal == account(5)
        ));
    }
}
