//! Deployment plan: the ordered resource steps of a run and their wiring.
//!
//! A plan is validated once, at construction. Declaration order is dependency
//! order: a step may only reference resources declared before it, and its
//! wiring may additionally reference the resource the step itself creates.

mod standard;
mod value;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use standard::{
    AZIMUTH, CLAIMS, ECLIPTIC, POLL_DURATION_SECS, POLLS, STARTOKEN, TREASURY, standard_plan,
};
pub use value::{Access, Arg, ArgValue, Operation};

use crate::{actors::ActorRole, error::DeployError};

/// Kind of on-chain resource in the fixed topology.
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
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    Registry,
    Governance,
    Claims,
    Controller,
    Treasury,
    Token,
}

impl ResourceKind {
    /// Name of the compiled contract implementing this kind.
    pub fn contract_name(&self) -> &'static str {
        match self {
            Self::Registry => "AzimuthWrapper",
            Self::Governance => "PollsWrapper",
            Self::Claims => "ClaimsWrapper",
            Self::Controller => "EclipticWrapper",
            Self::Treasury => "Treasury",
            Self::Token => "StarToken",
        }
    }
}

/// How a resource comes into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provision {
    /// A creation transaction with these constructor arguments.
    Create { args: Vec<Arg> },
    /// Created as a side effect of `parent`; its address is read with `getter`.
    Derived { parent: String, getter: Operation },
}

/// A resource to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: String,
    pub kind: ResourceKind,
    /// Actor sending the creation transaction.
    pub deployer: ActorRole,
    pub provision: Provision,
}

impl ResourceSpec {
    /// A resource created by the `creator` actor.
    pub fn create(name: impl Into<String>, kind: ResourceKind, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            kind,
            deployer: ActorRole::Creator,
            provision: Provision::Create { args },
        }
    }

    /// A resource whose address is read from `parent` after `parent` is created.
    pub fn derived(
        name: impl Into<String>,
        kind: ResourceKind,
        parent: impl Into<String>,
        getter: Operation,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            deployer: ActorRole::Creator,
            provision: Provision::Derived {
                parent: parent.into(),
                getter,
            },
        }
    }

    pub fn deployed_by(mut self, role: ActorRole) -> Self {
        self.deployer = role;
        self
    }

    /// Names of the resources this spec depends on, in argument order.
    pub fn dependencies(&self) -> Vec<&str> {
        match &self.provision {
            Provision::Create { args } => args.iter().filter_map(Arg::referenced_resource).collect(),
            Provision::Derived { parent, .. } => vec![parent.as_str()],
        }
    }
}

/// Read check run after a wiring call: `operation` must return `equals`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub operation: Operation,
    pub equals: Arg,
}

/// A single post-creation call against an existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringAction {
    /// Resource the call is sent to.
    pub target: String,
    pub sender: ActorRole,
    pub operation: Operation,
    pub args: Vec<Arg>,
    pub expect: Option<Expectation>,
}

impl WiringAction {
    pub fn new(target: impl Into<String>, operation: Operation, args: Vec<Arg>) -> Self {
        Self {
            target: target.into(),
            sender: ActorRole::Creator,
            operation,
            args,
            expect: None,
        }
    }

    /// Move exclusive control of `resource` to `new_authority`, verified by
    /// reading `owner()` back.
    pub fn transfer_authority(resource: impl Into<String>, new_authority: impl Into<String>) -> Self {
        let new_authority = new_authority.into();
        Self::new(
            resource,
            Operation::transact("transferOwnership(address)"),
            vec![Arg::resource(new_authority.clone())],
        )
        .expecting(Operation::view("owner()"), Arg::resource(new_authority))
    }

    pub fn sent_by(mut self, role: ActorRole) -> Self {
        self.sender = role;
        self
    }

    pub fn expecting(mut self, operation: Operation, equals: Arg) -> Self {
        self.expect = Some(Expectation { operation, equals });
        self
    }

    fn references(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.target.as_str())
            .chain(self.args.iter().filter_map(Arg::referenced_resource))
            .chain(
                self.expect
                    .iter()
                    .filter_map(|expect| expect.equals.referenced_resource()),
            )
    }
}

/// One plan step: a resource and the wiring performed right after it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStep {
    pub resource: ResourceSpec,
    pub wiring: Vec<WiringAction>,
}

impl DeploymentStep {
    pub fn new(resource: ResourceSpec) -> Self {
        Self {
            resource,
            wiring: Vec::new(),
        }
    }

    pub fn wire(mut self, action: WiringAction) -> Self {
        self.wiring.push(action);
        self
    }
}

impl From<ResourceSpec> for DeploymentStep {
    fn from(resource: ResourceSpec) -> Self {
        Self::new(resource)
    }
}

/// A validated, topologically ordered list of deployment steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    /// Build a plan, checking name uniqueness and that every reference points
    /// at a resource available at that point in the sequence.
    pub fn new(steps: impl IntoIterator<Item = impl Into<DeploymentStep>>) -> Result<Self, DeployError> {
        let steps: Vec<DeploymentStep> = steps.into_iter().map(Into::into).collect();
        let mut declared: HashSet<&str> = HashSet::new();

        for step in &steps {
            let name = step.resource.name.as_str();
            let context = format!("step `{name}`");

            for dependency in step.resource.dependencies() {
                if !declared.contains(dependency) {
                    return Err(DeployError::unresolved(dependency, context));
                }
            }

            if !declared.insert(name) {
                return Err(DeployError::DuplicateResource(name.to_string()));
            }

            for action in &step.wiring {
                if let Some(missing) = action.references().find(|r| !declared.contains(r)) {
                    return Err(DeployError::unresolved(
                        missing,
                        format!("wiring `{}` of {context}", action.operation.name()),
                    ));
                }
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    /// Declared resource names, in plan order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.resource.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|declared| declared == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
