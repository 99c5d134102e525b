//! Wiring executor: creates the plan's resources in order and wires them.

use alloy_core::primitives::Address;
use serde::Serialize;

use crate::{
    actors::Actors,
    error::DeployError,
    factory::{ResourceFactory, ResourceHandle},
    plan::{Arg, ArgValue, DeploymentPlan, DeploymentStep, Provision, WiringAction},
};

/// Handles created so far, in creation order.
///
/// Names are unique. A map on its own may be partial; only a
/// [`DeploymentResult`] is guaranteed to cover a whole plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, derive_more::Deref)]
#[serde(transparent)]
pub struct HandleMap {
    #[deref]
    handles: Vec<ResourceHandle>,
}

impl HandleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle, rejecting a name that is already present.
    pub fn insert(&mut self, handle: ResourceHandle) -> Result<(), DeployError> {
        if self.get(&handle.name).is_some() {
            return Err(DeployError::DuplicateResource(handle.name));
        }
        self.handles.push(handle);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ResourceHandle> {
        self.handles.iter().find(|handle| handle.name == name)
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.get(name).map(|handle| handle.address)
    }
}

impl TryFrom<Vec<ResourceHandle>> for HandleMap {
    type Error = DeployError;

    fn try_from(handles: Vec<ResourceHandle>) -> Result<Self, Self::Error> {
        let mut map = Self::new();
        for handle in handles {
            map.insert(handle)?;
        }
        Ok(map)
    }
}

/// Every resource of a plan, created and wired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentResult {
    handles: HandleMap,
}

impl DeploymentResult {
    pub fn handles(&self) -> &HandleMap {
        &self.handles
    }

    pub fn get(&self, name: &str) -> Option<&ResourceHandle> {
        self.handles.get(name)
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.handles.address_of(name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn into_handles(self) -> HandleMap {
        self.handles
    }
}

/// Resolve plan arguments against the handles created so far and the actors.
pub(crate) fn resolve_args(
    args: &[Arg],
    handles: &HandleMap,
    actors: &Actors,
    referenced_by: &str,
) -> Result<Vec<ArgValue>, DeployError> {
    args.iter()
        .map(|arg| resolve_arg(arg, handles, actors, referenced_by))
        .collect()
}

pub(crate) fn resolve_arg(
    arg: &Arg,
    handles: &HandleMap,
    actors: &Actors,
    referenced_by: &str,
) -> Result<ArgValue, DeployError> {
    match arg {
        Arg::Literal(value) => Ok(*value),
        Arg::Resource(name) => handles
            .address_of(name)
            .map(ArgValue::Address)
            .ok_or_else(|| DeployError::unresolved(name.as_str(), referenced_by)),
        Arg::Actor(role) => Ok(ArgValue::Address(actors.address_of(*role))),
    }
}

/// Walks a plan in order against a [`ResourceFactory`].
///
/// A single forward pass: the first failure aborts the remaining steps and
/// nothing already created is rolled back.
pub struct WiringExecutor<'a, F> {
    factory: &'a F,
    actors: &'a Actors,
}

impl<'a, F: ResourceFactory> WiringExecutor<'a, F> {
    pub fn new(factory: &'a F, actors: &'a Actors) -> Self {
        Self { factory, actors }
    }

    /// Create every resource of `plan` and run its wiring.
    pub async fn deploy_all(&self, plan: &DeploymentPlan) -> Result<DeploymentResult, DeployError> {
        let mut handles = HandleMap::new();

        for step in plan.steps() {
            let handle = self.provision(step, &handles).await?;

            tracing::info!(
                name = %handle.name,
                kind = %handle.kind,
                address = %handle.address,
                "Resource deployed"
            );

            handles.insert(handle)?;

            for action in &step.wiring {
                self.wire(step, action, &handles).await?;
            }
        }

        Ok(DeploymentResult { handles })
    }

    async fn provision(
        &self,
        step: &DeploymentStep,
        handles: &HandleMap,
    ) -> Result<ResourceHandle, DeployError> {
        let spec = &step.resource;
        let context = format!("step `{}`", spec.name);
        let from = self.actors.address_of(spec.deployer);

        let creation_failed = |cause: anyhow::Error| DeployError::CreationFailed {
            name: spec.name.clone(),
            cause: cause.into(),
        };

        match &spec.provision {
            Provision::Create { args } => {
                let args = resolve_args(args, handles, self.actors, &context)?;

                tracing::debug!(name = %spec.name, kind = %spec.kind, %from, "Creating resource");

                self.factory
                    .create(&spec.name, spec.kind, from, &args)
                    .await
                    .map_err(creation_failed)
            }
            Provision::Derived { parent, getter } => {
                let parent = handles
                    .get(parent)
                    .ok_or_else(|| DeployError::unresolved(parent.as_str(), context.as_str()))?;

                tracing::debug!(
                    name = %spec.name,
                    parent = %parent.name,
                    %getter,
                    "Reading derived resource address"
                );

                let address = self
                    .factory
                    .call(parent, from, getter, &[])
                    .await
                    .and_then(|output| output.address())
                    .map_err(creation_failed)?;

                Ok(ResourceHandle {
                    name: spec.name.clone(),
                    address,
                    kind: spec.kind,
                })
            }
        }
    }

    async fn wire(
        &self,
        step: &DeploymentStep,
        action: &WiringAction,
        handles: &HandleMap,
    ) -> Result<(), DeployError> {
        let step_name = &step.resource.name;
        let context = format!("wiring `{}` of step `{}`", action.operation.name(), step_name);

        let target = handles
            .get(&action.target)
            .ok_or_else(|| DeployError::unresolved(action.target.as_str(), context.as_str()))?;
        let args = resolve_args(&action.args, handles, self.actors, &context)?;
        let from = self.actors.address_of(action.sender);

        let wiring_failed = |cause: crate::error::Cause| DeployError::WiringFailed {
            step: step_name.clone(),
            target: target.name.clone(),
            operation: action.operation.signature.clone(),
            cause,
        };

        let output = self
            .factory
            .call(target, from, &action.operation, &args)
            .await
            .map_err(|err| wiring_failed(err.into()))?;

        tracing::info!(
            step = %step_name,
            target = %target.name,
            operation = %action.operation,
            tx_hash = ?output.tx_hash,
            "Wiring applied"
        );

        let Some(expect) = &action.expect else {
            return Ok(());
        };

        let expected = resolve_arg(&expect.equals, handles, self.actors, &context)?.to_word();
        let actual = self
            .factory
            .call(target, from, &expect.operation, &[])
            .await
            .map_err(|err| wiring_failed(err.into()))?
            .word();

        if actual != Some(expected) {
            return Err(wiring_failed(
                format!(
                    "{} on {} returned {}, expected {}",
                    expect.operation,
                    target.name,
                    actual.map_or_else(|| "nothing".to_string(), |word| word.to_string()),
                    expected
                )
                .into(),
            ));
        }

        tracing::debug!(target = %target.name, check = %expect.operation, "Wiring verified");

        Ok(())
    }
}
