//! Error taxonomy for a deployment run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Boxed cause of a remote or I/O failure.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stages of a deployment run, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum RunStage {
    Planning,
    Deploying,
    Wiring,
    Seeding,
    Exporting,
    Done,
}

/// Any failure that aborts a deployment run.
///
/// There is no recovery from any of these: the run stops at the stage reported
/// by [`DeployError::stage`], and resources created before the failure stay live.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("unresolved reference to `{name}` from {referenced_by}")]
    UnresolvedReference { name: String, referenced_by: String },

    #[error("resource `{0}` is declared more than once")]
    DuplicateResource(String),

    #[error("failed to provide prerequisite `{name}`")]
    PrerequisiteFailed {
        name: String,
        #[source]
        cause: Cause,
    },

    #[error("failed to create `{name}`")]
    CreationFailed {
        name: String,
        #[source]
        cause: Cause,
    },

    #[error("wiring `{operation}` on `{target}` (step `{step}`) failed")]
    WiringFailed {
        step: String,
        target: String,
        operation: String,
        #[source]
        cause: Cause,
    },

    #[error("seed step #{index} ({label}) failed")]
    SeedFailed {
        index: usize,
        label: String,
        #[source]
        cause: Cause,
    },

    #[error("cannot export an incomplete deployment, missing: {}", .missing.join(", "))]
    IncompleteResult { missing: Vec<String> },

    #[error("export key `{key}` is shared by {}", .names.join(", "))]
    ExportKeyCollision { key: String, names: Vec<String> },

    #[error("failed to write export artifact {}", .path.display())]
    ExportFailed {
        path: PathBuf,
        #[source]
        cause: Cause,
    },

    #[error("this run already ended at stage {0}")]
    RunFinished(RunStage),
}

impl DeployError {
    /// The stage this error aborts.
    pub fn stage(&self) -> RunStage {
        match self {
            Self::UnresolvedReference { .. } | Self::DuplicateResource(_) => RunStage::Planning,
            Self::PrerequisiteFailed { .. } | Self::CreationFailed { .. } => RunStage::Deploying,
            Self::WiringFailed { .. } => RunStage::Wiring,
            Self::SeedFailed { .. } => RunStage::Seeding,
            Self::IncompleteResult { .. }
            | Self::ExportKeyCollision { .. }
            | Self::ExportFailed { .. } => RunStage::Exporting,
            Self::RunFinished(stage) => *stage,
        }
    }

    pub(crate) fn unresolved(name: impl Into<String>, referenced_by: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            name: name.into(),
            referenced_by: referenced_by.into(),
        }
    }
}

/// State of a run: progressing through a stage, or terminally failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Active(RunStage),
    Failed { stage: RunStage, cause: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active(RunStage::Done) | Self::Failed { .. })
    }
}
