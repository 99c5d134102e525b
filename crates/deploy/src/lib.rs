//! starkup-deploy - One-shot deployment of the Azimuth contract suite.
//!
//! A run creates a fixed, ordered set of contracts through a [`ResourceFactory`],
//! wires ownership between them, seeds initial state and exports the resulting
//! addresses. Runs are forward-only: there is no resume and no rollback.

pub mod actors;
pub mod config;
mod error;
pub mod executor;
pub mod export;
pub mod factory;
pub mod orchestrator;
pub mod plan;
pub mod seed;

pub use actors::{ActorOverrides, ActorRole, Actors};
pub use config::{CONFIG_FILENAME, DeployConfig};
pub use error::{Cause, DeployError, RunStage, RunState};
pub use executor::{DeploymentResult, HandleMap, WiringExecutor};
pub use export::{ExportConfig, ExportSink};
pub use factory::{
    ArtifactStore, CallOutput, InMemoryLedger, ReceiptPolicy, RecordedCall, ResourceFactory,
    ResourceHandle, RpcFactory,
};
pub use orchestrator::{Orchestrator, RunReport};
pub use plan::{
    Access, Arg, ArgValue, DeploymentPlan, DeploymentStep, Operation, Provision, ResourceKind,
    ResourceSpec, WiringAction, standard_plan,
};
pub use seed::{SeedScript, SeedStep, standard_seed_script};
