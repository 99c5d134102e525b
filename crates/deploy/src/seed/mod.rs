//! Seed script: initial state-mutating calls against a wired deployment.

mod standard;

pub use standard::{
    GALAXY, KEY_REVISION_SUITE, PLANET, STARS, STARS_WITH_KEYS, configure_keys, create_galaxy,
    spawn, standard_seed_script,
};

use crate::{
    actors::{ActorRole, Actors},
    error::DeployError,
    executor::{DeploymentResult, resolve_args},
    factory::ResourceFactory,
    plan::{Arg, DeploymentPlan, Operation},
};

/// One seed call. It depends only on deployed handles, never on the output of
/// another seed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedStep {
    /// Human-readable label used in logs and errors.
    pub label: String,
    pub target: String,
    pub sender: ActorRole,
    pub operation: Operation,
    pub args: Vec<Arg>,
}

impl SeedStep {
    pub fn new(
        label: impl Into<String>,
        target: impl Into<String>,
        operation: Operation,
        args: Vec<Arg>,
    ) -> Self {
        Self {
            label: label.into(),
            target: target.into(),
            sender: ActorRole::Creator,
            operation,
            args,
        }
    }

    pub fn sent_by(mut self, role: ActorRole) -> Self {
        self.sender = role;
        self
    }

    fn references(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.target.as_str())
            .chain(self.args.iter().filter_map(Arg::referenced_resource))
    }
}

/// Fixed, ordered list of seed steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedScript {
    steps: Vec<SeedStep>,
}

impl SeedScript {
    pub fn new(steps: impl IntoIterator<Item = SeedStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// A script that seeds nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[SeedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check that every target and resource argument is declared by `plan`.
    pub fn validate(&self, plan: &DeploymentPlan) -> Result<(), DeployError> {
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(missing) = step.references().find(|name| !plan.contains(name)) {
                return Err(DeployError::unresolved(
                    missing,
                    format!("seed step #{index} ({})", step.label),
                ));
            }
        }
        Ok(())
    }

    /// Apply every step in order, stopping at the first failure.
    ///
    /// Returns the number of applied steps. Effects of steps applied before a
    /// failure stay in place, and `result` is never modified.
    pub async fn seed<F: ResourceFactory>(
        &self,
        factory: &F,
        actors: &Actors,
        result: &DeploymentResult,
    ) -> Result<usize, DeployError> {
        for (index, step) in self.steps.iter().enumerate() {
            let seed_failed = |cause: crate::error::Cause| DeployError::SeedFailed {
                index,
                label: step.label.clone(),
                cause,
            };

            let context = format!("seed step #{index} ({})", step.label);
            let target = result.get(&step.target).ok_or_else(|| {
                seed_failed(DeployError::unresolved(step.target.as_str(), context.as_str()).into())
            })?;
            let args = resolve_args(&step.args, result.handles(), actors, &context)
                .map_err(|err| seed_failed(err.into()))?;

            let output = factory
                .call(target, actors.address_of(step.sender), &step.operation, &args)
                .await
                .map_err(|err| seed_failed(err.into()))?;

            tracing::info!(
                index,
                label = %step.label,
                target = %target.name,
                operation = %step.operation,
                tx_hash = ?output.tx_hash,
                "Seed step applied"
            );
        }

        Ok(self.steps.len())
    }
}

impl FromIterator<SeedStep> for SeedScript {
    fn from_iter<I: IntoIterator<Item = SeedStep>>(iter: I) -> Self {
        Self::new(iter)
    }
}
