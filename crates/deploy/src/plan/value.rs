//! Call arguments and remote operations.

use alloy_core::primitives::{Address, B256, U256, keccak256};
use serde::{Deserialize, Serialize};

use crate::actors::ActorRole;

/// A resolved argument value. Every variant encodes to a single static ABI word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Bytes32(B256),
    Bool(bool),
}

impl ArgValue {
    pub fn uint(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }

    /// A `bytes32` holding `value` left-padded with zeros.
    pub fn bytes32(value: u64) -> Self {
        Self::Bytes32(B256::from(U256::from(value)))
    }

    /// The value as a 32-byte ABI word.
    pub fn to_word(&self) -> B256 {
        match self {
            Self::Address(address) => address.into_word(),
            Self::Uint(value) => B256::from(*value),
            Self::Bytes32(word) => *word,
            Self::Bool(flag) => B256::with_last_byte(u8::from(*flag)),
        }
    }
}

/// An argument as written in a plan or seed script.
///
/// References are resolved at execution time against the handles created so far
/// and the run's actor identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    Literal(ArgValue),
    /// Address of a previously created resource.
    Resource(String),
    /// Address of the actor playing this role.
    Actor(ActorRole),
}

impl Arg {
    pub fn resource(name: impl Into<String>) -> Self {
        Self::Resource(name.into())
    }

    pub fn uint(value: u64) -> Self {
        Self::Literal(ArgValue::uint(value))
    }

    pub fn bytes32(value: u64) -> Self {
        Self::Literal(ArgValue::bytes32(value))
    }

    pub fn bool(flag: bool) -> Self {
        Self::Literal(ArgValue::Bool(flag))
    }

    pub fn address(address: Address) -> Self {
        Self::Literal(ArgValue::Address(address))
    }

    /// Name of the referenced resource, if this argument is a resource reference.
    pub fn referenced_resource(&self) -> Option<&str> {
        match self {
            Self::Resource(name) => Some(name),
            _ => None,
        }
    }
}

/// Whether an operation mutates state or only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Access {
    Transact,
    View,
}

/// A named remote call, identified by its Solidity function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub signature: String,
    pub access: Access,
}

impl Operation {
    /// A state-changing call, e.g. `transferOwnership(address)`.
    pub fn transact(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            access: Access::Transact,
        }
    }

    /// A read-only call, e.g. `owner()`.
    pub fn view(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            access: Access::View,
        }
    }

    /// Function name without the parameter list.
    pub fn name(&self) -> &str {
        self.signature
            .split_once('(')
            .map_or(self.signature.as_str(), |(name, _)| name)
    }

    /// The 4-byte function selector.
    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    pub fn is_view(&self) -> bool {
        self.access == Access::View
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature)
    }
}
