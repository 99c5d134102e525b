//! Resource factories: the execution environment seen by a deployment run.
//!
//! The run only ever talks to the ledger through [`ResourceFactory`]: create a
//! resource, or call an operation on one. Both are opaque, fallible remote calls.

pub mod abi;
mod artifacts;
mod memory;
mod rpc;

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256, address};
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use artifacts::{ArtifactStore, ERC1820_DEPLOYMENT_FILE};
pub use memory::{InMemoryLedger, RecordedCall};
pub use rpc::{ReceiptPolicy, RpcFactory};

use crate::plan::{ArgValue, Operation, ResourceKind};

/// The ERC-1820 interface registry, at the same address on every chain.
///
/// ERC-777 tokens register their interfaces with it in their constructor, so it
/// must exist before the treasury mints its token.
pub const ERC1820_REGISTRY: Address = address!("1820a4B7618BdE71Dce8cdc73aAB6C95905faD24");

/// One-time sender of the registry's pre-signed deployment transaction.
pub const ERC1820_DEPLOYER: Address = address!("a990077c3205cbDf861e17Fa532eeB069cE9fF96");

/// Wei the deployer needs to pay for the registry deployment: 0.08 ether.
pub const ERC1820_DEPLOYMENT_COST: U256 = U256::from_limbs([80_000_000_000_000_000, 0, 0, 0]);

/// A live, deployed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub name: String,
    pub address: Address,
    pub kind: ResourceKind,
}

/// Output of a remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOutput {
    /// Transaction hash, for state-changing calls.
    pub tx_hash: Option<B256>,
    /// Returned data, for read-only calls.
    pub data: Bytes,
}

impl CallOutput {
    pub fn transaction(tx_hash: B256) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            data: Bytes::new(),
        }
    }

    pub fn returned(data: impl Into<Bytes>) -> Self {
        Self {
            tx_hash: None,
            data: data.into(),
        }
    }

    /// The first returned word.
    pub fn word(&self) -> Option<B256> {
        abi::first_word(&self.data)
    }

    /// The first returned word, decoded as an address.
    pub fn address(&self) -> Result<Address> {
        abi::decode_address(&self.data)
    }
}

/// The execution environment's contract for creating and calling resources.
///
/// Calls are awaited one at a time by the run; implementations do not need to
/// support concurrent use, only `Send` futures.
pub trait ResourceFactory: Send + Sync {
    /// Accounts the environment can send from, in a stable order.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    /// Create a resource of `kind`, sent by `from` with the given constructor args.
    fn create(
        &self,
        name: &str,
        kind: ResourceKind,
        from: Address,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<ResourceHandle>> + Send;

    /// Make sure the ERC-1820 registry exists, funding its deployment from `funder`.
    ///
    /// Returns `true` when the registry had to be deployed, `false` when it was
    /// already present.
    fn ensure_registry_singleton(
        &self,
        funder: Address,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Call `operation` on `target`. View operations must not change state.
    fn call(
        &self,
        target: &ResourceHandle,
        from: Address,
        operation: &Operation,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<CallOutput>> + Send;
}
