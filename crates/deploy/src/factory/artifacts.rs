//! Compiled contract artifacts.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::plan::ResourceKind;

/// File holding the published pre-signed ERC-1820 deployment transaction, as hex.
pub const ERC1820_DEPLOYMENT_FILE: &str = "ERC1820Registry.tx";

/// The subset of a Hardhat artifact file needed to deploy a contract.
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    #[serde(rename = "contractName")]
    contract_name: Option<String>,
    bytecode: Bytes,
}

/// Reads contract bytecode from a directory of `<ContractName>.json` artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for a resource kind.
    pub fn artifact_path(&self, kind: ResourceKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.contract_name()))
    }

    /// Load the creation bytecode for a resource kind.
    pub fn bytecode(&self, kind: ResourceKind) -> Result<Bytes> {
        let path = self.artifact_path(kind);
        if !path.exists() {
            anyhow::bail!(
                "Artifact for {} not found: {}",
                kind.contract_name(),
                path.display()
            );
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let artifact: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if let Some(name) = &artifact.contract_name {
            if name != kind.contract_name() {
                anyhow::bail!(
                    "Artifact {} holds contract {}, expected {}",
                    path.display(),
                    name,
                    kind.contract_name()
                );
            }
        }

        if artifact.bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        tracing::debug!(
            kind = %kind,
            path = %path.display(),
            size = artifact.bytecode.len(),
            "Loaded contract bytecode"
        );

        Ok(artifact.bytecode)
    }

    /// Load the raw, signed transaction that deploys the ERC-1820 registry.
    pub fn registry_deployment(&self) -> Result<Bytes> {
        let path = self.dir.join(ERC1820_DEPLOYMENT_FILE);
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read ERC1820 deployment transaction {}", path.display())
        })?;

        let raw = Bytes::from_str(content.trim()).with_context(|| {
            format!("{} does not hold a hex-encoded transaction", path.display())
        })?;
        if raw.is_empty() {
            anyhow::bail!("{} is empty", path.display());
        }

        Ok(raw)
    }
}
