//! In-process ledger simulating the deployed contracts.
//!
//! Used for dry runs and tests. It models just enough of the contracts to make
//! ordering mistakes observable: ownership, the controller's authority over its
//! registry, the token minted by the treasury, and point registration. The
//! ERC-1820 singleton is only tracked as present or absent.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use alloy_core::primitives::{Address, B256, U256, keccak256};
use anyhow::{Context, Result};

use super::{CallOutput, ERC1820_REGISTRY, ResourceFactory, ResourceHandle};
use crate::plan::{Access, ArgValue, Operation, ResourceKind};

/// Number of development accounts the ledger exposes.
const DEV_ACCOUNTS: usize = 5;

/// Points below this are galaxies.
const GALAXY_LIMIT: u32 = 0x100;
/// Points below this (and above galaxies) are stars.
const STAR_LIMIT: u32 = 0x1_0000;

/// A remote call observed by the ledger, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Create {
        name: String,
        kind: ResourceKind,
        from: Address,
    },
    Call {
        target: String,
        operation: String,
        from: Address,
    },
    /// Deployment of an environment-level singleton, funded by `from`.
    Singleton { address: Address, from: Address },
}

#[derive(Debug, Clone)]
struct Contract {
    name: String,
    kind: ResourceKind,
    owner: Address,
    args: Vec<ArgValue>,
    /// Token minted on creation (treasury only).
    token: Option<Address>,
}

#[derive(Debug, Clone, Copy)]
struct Point {
    owner: Address,
    keys: Option<(B256, B256, u32)>,
}

#[derive(Debug, Default)]
struct LedgerState {
    nonce: u64,
    contracts: HashMap<Address, Contract>,
    /// Points per registry address.
    points: HashMap<Address, HashMap<u32, Point>>,
    log: Vec<RecordedCall>,
    singletons: HashSet<Address>,
    failing_singletons: bool,
    failing_kinds: HashSet<ResourceKind>,
    failing_operations: HashSet<String>,
}

/// Simulated execution environment.
#[derive(Debug)]
pub struct InMemoryLedger {
    salt: B256,
    accounts: Vec<Address>,
    state: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let accounts = (0..DEV_ACCOUNTS)
            .map(|i| Address::from_word(keccak256(format!("starkup-dev-account-{i}"))))
            .collect();

        Self {
            salt: B256::from(rand::random::<[u8; 32]>()),
            accounts,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Make every creation of `kind` fail.
    pub fn fail_creation(&self, kind: ResourceKind) {
        if let Ok(mut state) = self.state() {
            state.failing_kinds.insert(kind);
        }
    }

    /// Make every call to an operation with this function name fail.
    pub fn fail_operation(&self, name: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.failing_operations.insert(name.into());
        }
    }

    /// Make the ERC-1820 singleton deployment fail.
    pub fn fail_registry_singleton(&self) {
        if let Ok(mut state) = self.state() {
            state.failing_singletons = true;
        }
    }

    /// Whether the ERC-1820 registry exists on this ledger.
    pub fn has_registry_singleton(&self) -> bool {
        self.state()
            .map(|state| state.singletons.contains(&ERC1820_REGISTRY))
            .unwrap_or(false)
    }

    /// Every remote call attempted so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().map(|state| state.log.clone()).unwrap_or_default()
    }

    /// Number of resources that exist on the ledger.
    pub fn contract_count(&self) -> usize {
        self.state().map(|state| state.contracts.len()).unwrap_or(0)
    }

    /// Current owner of a point registered in `registry`.
    pub fn point_owner(&self, registry: Address, point: u32) -> Option<Address> {
        let state = self.state().ok()?;
        state.points.get(&registry)?.get(&point).map(|p| p.owner)
    }

    /// Networking keys of a point: encryption key, authentication key, crypto suite.
    pub fn point_keys(&self, registry: Address, point: u32) -> Option<(B256, B256, u32)> {
        let state = self.state().ok()?;
        state.points.get(&registry)?.get(&point)?.keys
    }

    fn state(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("In-memory ledger state is poisoned"))
    }

    fn next_address(&self, state: &mut LedgerState) -> Address {
        state.nonce += 1;
        let mut preimage = self.salt.to_vec();
        preimage.extend(state.nonce.to_be_bytes());
        Address::from_word(keccak256(preimage))
    }

    fn create_contract(
        &self,
        name: &str,
        kind: ResourceKind,
        from: Address,
        args: &[ArgValue],
    ) -> Result<Address> {
        let mut state = self.state()?;
        state.log.push(RecordedCall::Create {
            name: name.to_string(),
            kind,
            from,
        });

        if state.failing_kinds.contains(&kind) {
            anyhow::bail!("Creation of {} rejected by the ledger", kind);
        }

        match kind {
            ResourceKind::Registry => {}
            ResourceKind::Governance => {
                uint_arg(args, 0)?;
                uint_arg(args, 1)?;
            }
            ResourceKind::Claims | ResourceKind::Treasury => {
                require_kind(&state, address_arg(args, 0)?, ResourceKind::Registry)?;
            }
            ResourceKind::Controller => {
                if args.len() != 4 {
                    anyhow::bail!("Controller takes 4 constructor arguments, got {}", args.len());
                }
                address_arg(args, 0)?;
                require_kind(&state, address_arg(args, 1)?, ResourceKind::Registry)?;
                require_kind(&state, address_arg(args, 2)?, ResourceKind::Governance)?;
                require_kind(&state, address_arg(args, 3)?, ResourceKind::Claims)?;
            }
            ResourceKind::Token => anyhow::bail!("Tokens are only minted by a treasury"),
        }

        let address = self.next_address(&mut state);

        let token = if kind == ResourceKind::Treasury {
            let token = self.next_address(&mut state);
            state.contracts.insert(
                token,
                Contract {
                    name: format!("{name}:token"),
                    kind: ResourceKind::Token,
                    owner: address,
                    args: Vec::new(),
                    token: None,
                },
            );
            Some(token)
        } else {
            None
        };

        state.contracts.insert(
            address,
            Contract {
                name: name.to_string(),
                kind,
                owner: from,
                args: args.to_vec(),
                token,
            },
        );

        Ok(address)
    }

    fn call_contract(
        &self,
        target: Address,
        from: Address,
        operation: &Operation,
        args: &[ArgValue],
    ) -> Result<CallOutput> {
        let mut state = self.state()?;
        let contract = state
            .contracts
            .get(&target)
            .cloned()
            .with_context(|| format!("No resource at {}", target))?;

        state.log.push(RecordedCall::Call {
            target: contract.name.clone(),
            operation: operation.signature.clone(),
            from,
        });

        if state.failing_operations.contains(operation.name()) {
            anyhow::bail!("Call to {} rejected by the ledger", operation);
        }

        match (contract.kind, operation.signature.as_str()) {
            (_, "owner()") => {
                require_access(operation, Access::View)?;
                Ok(CallOutput::returned(contract.owner.into_word()))
            }
            (_, "transferOwnership(address)") => {
                require_access(operation, Access::Transact)?;
                if from != contract.owner {
                    anyhow::bail!("Ownable: caller {} is not the owner of {}", from, contract.name);
                }
                let new_owner = address_arg(args, 0)?;
                if new_owner == Address::ZERO {
                    anyhow::bail!("Ownable: new owner is the zero address");
                }
                if let Some(entry) = state.contracts.get_mut(&target) {
                    entry.owner = new_owner;
                }
                Ok(self.receipt(&mut state))
            }
            (ResourceKind::Treasury, "startoken()") => {
                require_access(operation, Access::View)?;
                let token = contract.token.context("Treasury has no token")?;
                Ok(CallOutput::returned(token.into_word()))
            }
            (ResourceKind::Controller, "createGalaxy(uint32,address)") => {
                require_access(operation, Access::Transact)?;
                let registry = controller_authority(&state, target, &contract)?;
                if from != contract.owner {
                    anyhow::bail!("Only the owner of {} can create galaxies", contract.name);
                }
                let point = point_arg(args, 0)?;
                let owner = address_arg(args, 1)?;
                if point >= GALAXY_LIMIT {
                    anyhow::bail!("Point {} is not a galaxy", point);
                }
                register_point(&mut state, registry, point, owner)?;
                Ok(self.receipt(&mut state))
            }
            (ResourceKind::Controller, "spawn(uint32,address)") => {
                require_access(operation, Access::Transact)?;
                let registry = controller_authority(&state, target, &contract)?;
                let point = point_arg(args, 0)?;
                let owner = address_arg(args, 1)?;
                let parent = parent_of(point)
                    .with_context(|| format!("Galaxy {} cannot be spawned", point))?;
                let parent_owner = state
                    .points
                    .get(&registry)
                    .and_then(|points| points.get(&parent))
                    .map(|p| p.owner)
                    .with_context(|| format!("Parent point {} of {} is not active", parent, point))?;
                if from != parent_owner {
                    anyhow::bail!("Caller {} does not own parent point {}", from, parent);
                }
                register_point(&mut state, registry, point, owner)?;
                Ok(self.receipt(&mut state))
            }
            (ResourceKind::Controller, "configureKeys(uint32,bytes32,bytes32,uint32,bool)") => {
                require_access(operation, Access::Transact)?;
                let registry = controller_authority(&state, target, &contract)?;
                let point = point_arg(args, 0)?;
                let encryption = bytes32_arg(args, 1)?;
                let authentication = bytes32_arg(args, 2)?;
                let suite = point_arg(args, 3)?;
                let entry = state
                    .points
                    .get_mut(&registry)
                    .and_then(|points| points.get_mut(&point))
                    .with_context(|| format!("Point {} is not active", point))?;
                if from != entry.owner {
                    anyhow::bail!("Caller {} does not own point {}", from, point);
                }
                entry.keys = Some((encryption, authentication, suite));
                Ok(self.receipt(&mut state))
            }
            (kind, signature) => anyhow::bail!("{} does not implement {}", kind, signature),
        }
    }

    /// A synthetic transaction hash for a successful state change.
    fn receipt(&self, state: &mut LedgerState) -> CallOutput {
        state.nonce += 1;
        let mut preimage = self.salt.to_vec();
        preimage.extend(b"tx");
        preimage.extend(state.nonce.to_be_bytes());
        CallOutput::transaction(keccak256(preimage))
    }
}

impl ResourceFactory for InMemoryLedger {
    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.accounts.clone())
    }

    async fn create(
        &self,
        name: &str,
        kind: ResourceKind,
        from: Address,
        args: &[ArgValue],
    ) -> Result<ResourceHandle> {
        let address = self.create_contract(name, kind, from, args)?;
        Ok(ResourceHandle {
            name: name.to_string(),
            address,
            kind,
        })
    }

    async fn ensure_registry_singleton(&self, funder: Address) -> Result<bool> {
        let mut state = self.state()?;
        if state.singletons.contains(&ERC1820_REGISTRY) {
            return Ok(false);
        }

        state.log.push(RecordedCall::Singleton {
            address: ERC1820_REGISTRY,
            from: funder,
        });
        if state.failing_singletons {
            anyhow::bail!("Deployment of {} rejected by the ledger", ERC1820_REGISTRY);
        }

        state.singletons.insert(ERC1820_REGISTRY);
        Ok(true)
    }

    async fn call(
        &self,
        target: &ResourceHandle,
        from: Address,
        operation: &Operation,
        args: &[ArgValue],
    ) -> Result<CallOutput> {
        self.call_contract(target.address, from, operation, args)
    }
}

/// The registry a controller manages, provided the controller currently owns it.
fn controller_authority(state: &LedgerState, controller: Address, contract: &Contract) -> Result<Address> {
    let registry = address_arg(&contract.args, 1)?;
    let registry_contract = state
        .contracts
        .get(&registry)
        .context("Controller registry does not exist")?;

    if registry_contract.owner != controller {
        anyhow::bail!(
            "{} does not hold authority over {} (owned by {})",
            contract.name,
            registry_contract.name,
            registry_contract.owner
        );
    }

    Ok(registry)
}

fn register_point(state: &mut LedgerState, registry: Address, point: u32, owner: Address) -> Result<()> {
    let points = state.points.entry(registry).or_default();
    if points.contains_key(&point) {
        anyhow::bail!("Point {} is already active", point);
    }
    points.insert(point, Point { owner, keys: None });
    Ok(())
}

/// Parent of a star (its galaxy) or planet (its star). Galaxies have none.
fn parent_of(point: u32) -> Option<u32> {
    match point {
        p if p < GALAXY_LIMIT => None,
        p if p < STAR_LIMIT => Some(p & 0xff),
        p => Some(p & 0xffff),
    }
}

fn require_access(operation: &Operation, access: Access) -> Result<()> {
    if operation.access != access {
        anyhow::bail!("{} must be called as {}, not {}", operation, access, operation.access);
    }
    Ok(())
}

fn require_kind(state: &LedgerState, address: Address, kind: ResourceKind) -> Result<()> {
    match state.contracts.get(&address) {
        Some(contract) if contract.kind == kind => Ok(()),
        Some(contract) => anyhow::bail!("{} at {} is not a {}", contract.kind, address, kind),
        None => anyhow::bail!("No {} at {}", kind, address),
    }
}

fn arg(args: &[ArgValue], index: usize) -> Result<&ArgValue> {
    args.get(index)
        .with_context(|| format!("Missing argument #{}", index))
}

fn address_arg(args: &[ArgValue], index: usize) -> Result<Address> {
    match arg(args, index)? {
        ArgValue::Address(address) => Ok(*address),
        other => anyhow::bail!("Argument #{} must be an address, got {:?}", index, other),
    }
}

fn uint_arg(args: &[ArgValue], index: usize) -> Result<U256> {
    match arg(args, index)? {
        ArgValue::Uint(value) => Ok(*value),
        other => anyhow::bail!("Argument #{} must be a uint, got {:?}", index, other),
    }
}

fn point_arg(args: &[ArgValue], index: usize) -> Result<u32> {
    let value = uint_arg(args, index)?;
    if value > U256::from(u32::MAX) {
        anyhow::bail!("Argument #{} does not fit in uint32", index);
    }
    Ok(value.to::<u32>())
}

fn bytes32_arg(args: &[ArgValue], index: usize) -> Result<B256> {
    match arg(args, index)? {
        ArgValue::Bytes32(word) => Ok(*word),
        other => anyhow::bail!("Argument #{} must be bytes32, got {:?}", index, other),
    }
}
