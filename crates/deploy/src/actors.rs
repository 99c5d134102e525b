//! Named actor identities that send deployment transactions.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

/// Role an actor plays during a deployment run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActorRole {
    /// Funds environment-level prerequisites.
    Funder,
    /// Deploys every resource and sends wiring and seed transactions.
    Creator,
    /// Operates the deployed system afterwards.
    Operator,
}

/// Actor identities matching the deployment roles.
///
/// These map to the environment's unlocked accounts:
/// - Index 0: funder
/// - Index 1: creator
/// - Index 2: operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actors {
    pub funder: Address,
    pub creator: Address,
    pub operator: Address,
}

/// Optional per-role address overrides, usually read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funder: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Address>,
}

impl Actors {
    /// The minimum number of environment accounts required for a run.
    pub const MIN_REQUIRED_ACCOUNTS: usize = 3;

    /// Create named actors from the environment's account list.
    ///
    /// Returns an error if fewer than 3 accounts are provided.
    pub fn from_accounts(accounts: &[Address]) -> Result<Self, anyhow::Error> {
        match accounts {
            [funder, creator, operator, ..] => Ok(Self {
                funder: *funder,
                creator: *creator,
                operator: *operator,
            }),
            _ => anyhow::bail!(
                "Not enough accounts provided. Need at least {}, got {}",
                Self::MIN_REQUIRED_ACCOUNTS,
                accounts.len()
            ),
        }
    }

    /// Replace any role that has an explicit override.
    pub fn with_overrides(self, overrides: &ActorOverrides) -> Self {
        Self {
            funder: overrides.funder.unwrap_or(self.funder),
            creator: overrides.creator.unwrap_or(self.creator),
            operator: overrides.operator.unwrap_or(self.operator),
        }
    }

    /// Address of the actor playing `role`.
    pub fn address_of(&self, role: ActorRole) -> Address {
        match role {
            ActorRole::Funder => self.funder,
            ActorRole::Creator => self.creator,
            ActorRole::Operator => self.operator,
        }
    }
}
