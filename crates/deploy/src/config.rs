//! Run configuration, stored as `Starkup.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    actors::ActorOverrides,
    export::{ExportConfig, ExportSink},
    factory::{ArtifactStore, ReceiptPolicy, RpcFactory},
};

/// Default configuration filename.
pub const CONFIG_FILENAME: &str = "Starkup.toml";

/// Default JSON-RPC endpoint of a local development node.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545/";

fn default_rpc_url() -> Url {
    Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid")
}

/// Everything a deployment run needs from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// JSON-RPC endpoint of the target ledger.
    pub rpc_url: Url,
    /// Directory of compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    pub export: ExportConfig,
    /// Explicit actor addresses, replacing the environment's accounts.
    pub actors: ActorOverrides,
    pub receipts: ReceiptPolicy,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            artifacts_dir: PathBuf::from("artifacts"),
            export: ExportConfig::default(),
            actors: ActorOverrides::default(),
            receipts: ReceiptPolicy::default(),
        }
    }
}

impl DeployConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deploy config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Starkup.toml` inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file or directory not found: {}", path.display());
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Where `--save-config` writes: next to the export artifact.
    pub fn default_save_path(&self) -> PathBuf {
        match self.export.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(CONFIG_FILENAME),
            _ => PathBuf::from(CONFIG_FILENAME),
        }
    }

    pub fn export_sink(&self) -> ExportSink {
        ExportSink::from(self.export.clone())
    }

    /// A JSON-RPC factory for the configured endpoint and artifacts.
    pub fn rpc_factory(&self) -> Result<RpcFactory> {
        RpcFactory::new(
            self.rpc_url.clone(),
            ArtifactStore::new(&self.artifacts_dir),
            self.receipts,
        )
    }
}
