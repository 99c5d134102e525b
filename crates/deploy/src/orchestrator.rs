//! Drives one deployment run through its stages.

use std::path::PathBuf;

use serde::Serialize;

use crate::{
    actors::{ActorOverrides, Actors},
    error::{DeployError, RunStage, RunState},
    executor::{DeploymentResult, WiringExecutor},
    export::ExportSink,
    factory::ResourceFactory,
    plan::DeploymentPlan,
    seed::SeedScript,
};

/// Name of the ERC-1820 registry prerequisite in errors.
const REGISTRY_SINGLETON: &str = "erc1820-registry";

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub result: DeploymentResult,
    /// Path of the written export artifact.
    pub artifact: PathBuf,
    /// Number of seed steps applied.
    pub seeded: usize,
}

/// Owns the environment of a single deployment run.
///
/// An orchestrator runs exactly once. Whether the run succeeds or fails, a
/// later call to [`Orchestrator::run`] is rejected with
/// [`DeployError::RunFinished`].
pub struct Orchestrator<F> {
    factory: F,
    actors: Actors,
    state: RunState,
}

impl<F: ResourceFactory> Orchestrator<F> {
    pub fn new(factory: F, actors: Actors) -> Self {
        Self {
            factory,
            actors,
            state: RunState::Active(RunStage::Planning),
        }
    }

    /// Build an orchestrator with actors taken from the factory's accounts.
    pub async fn from_environment(factory: F, overrides: &ActorOverrides) -> anyhow::Result<Self> {
        let accounts = factory.accounts().await?;
        let actors = Actors::from_accounts(&accounts)?.with_overrides(overrides);

        tracing::info!(
            funder = %actors.funder,
            creator = %actors.creator,
            operator = %actors.operator,
            "Actors resolved"
        );

        Ok(Self::new(factory, actors))
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn actors(&self) -> &Actors {
        &self.actors
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Deploy, seed and export.
    pub async fn run(
        &mut self,
        plan: &DeploymentPlan,
        seed: &SeedScript,
        sink: &ExportSink,
    ) -> Result<RunReport, DeployError> {
        if self.state != RunState::Active(RunStage::Planning) {
            let stage = match &self.state {
                RunState::Active(stage) | RunState::Failed { stage, .. } => *stage,
            };
            return Err(DeployError::RunFinished(stage));
        }

        match self.execute(plan, seed, sink).await {
            Ok(report) => {
                self.enter(RunStage::Done);
                Ok(report)
            }
            Err(err) => {
                let stage = err.stage();
                tracing::error!(%stage, error = %err, "Deployment run failed");
                self.state = RunState::Failed {
                    stage,
                    cause: error_chain(&err),
                };
                Err(err)
            }
        }
    }

    async fn execute(
        &mut self,
        plan: &DeploymentPlan,
        seed: &SeedScript,
        sink: &ExportSink,
    ) -> Result<RunReport, DeployError> {
        seed.validate(plan)?;

        self.enter(RunStage::Deploying);
        let deployed = self
            .factory
            .ensure_registry_singleton(self.actors.funder)
            .await
            .map_err(|cause| DeployError::PrerequisiteFailed {
                name: REGISTRY_SINGLETON.to_string(),
                cause: cause.into(),
            })?;
        tracing::debug!(deployed, funder = %self.actors.funder, "ERC1820 registry available");

        let result = WiringExecutor::new(&self.factory, &self.actors)
            .deploy_all(plan)
            .await?;

        // Wiring is interleaved with creation, so this stage is only passed through.
        self.enter(RunStage::Wiring);

        self.enter(RunStage::Seeding);
        let seeded = seed.seed(&self.factory, &self.actors, &result).await?;

        self.enter(RunStage::Exporting);
        let artifact = sink.export(plan, result.handles())?;

        Ok(RunReport {
            result,
            artifact,
            seeded,
        })
    }

    fn enter(&mut self, stage: RunStage) {
        tracing::debug!(%stage, "Entering stage");
        self.state = RunState::Active(stage);
    }
}

/// Render an error with its sources, `outer: inner: ...`.
fn error_chain(err: &DeployError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
