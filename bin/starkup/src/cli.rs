use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use starkup_deploy::{CONFIG_FILENAME, DeployConfig, ExportSink};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Prefix of every environment variable read by starkup.
const ENV_PREFIX: &str = "STARKUP_";

#[derive(Parser)]
#[command(name = "starkup")]
#[command(
    author,
    version,
    about = "Deploy, wire and seed the Azimuth contracts on a development chain"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "STARKUP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Starkup.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Starkup.toml is used when it exists.
    #[arg(long, alias = "conf", env = "STARKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// The JSON-RPC endpoint of the target chain.
    ///
    /// Transactions are sent from the node's unlocked accounts.
    #[arg(long, alias = "rpc", env = "STARKUP_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// Directory of compiled contract artifacts (`<ContractName>.json`).
    #[arg(long, env = "STARKUP_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// Path of the exported address file.
    #[arg(short, long, env = "STARKUP_OUT")]
    pub out: Option<PathBuf>,

    /// Prefix of every exported key.
    #[arg(long, env = "STARKUP_KEY_PREFIX")]
    pub key_prefix: Option<String>,

    /// Deploy against an in-memory ledger instead of the RPC endpoint.
    ///
    /// The export goes to `<out>.dry-run` so a real address file is never replaced.
    #[arg(long, env = "STARKUP_DRY_RUN")]
    pub dry_run: bool,

    /// Write the effective configuration next to the export file.
    #[arg(long, env = "STARKUP_SAVE_CONFIG")]
    pub save_config: bool,
}

impl Cli {
    /// Effective configuration: defaults, then the TOML file, then `STARKUP_*`
    /// variables, then explicit flags.
    pub fn load_config(&self) -> anyhow::Result<DeployConfig> {
        let file = match &self.config {
            Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
            Some(path) if path.exists() => path.clone(),
            Some(path) => anyhow::bail!(
                "Configuration file or directory not found: {}",
                path.display()
            ),
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let config = Figment::from(Serialized::defaults(DeployConfig::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;

        Ok(self.apply_overrides(config))
    }

    fn apply_overrides(&self, mut config: DeployConfig) -> DeployConfig {
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }
        if let Some(artifacts) = &self.artifacts {
            config.artifacts_dir = artifacts.clone();
        }
        if let Some(out) = &self.out {
            config.export.path = out.clone();
        }
        if let Some(prefix) = &self.key_prefix {
            config.export.key_prefix = prefix.clone();
        }
        config
    }

    /// The sink this invocation exports to.
    ///
    /// A dry run is redirected here rather than in the configuration, so a saved
    /// configuration always names the real export file.
    pub fn export_sink(&self, config: &DeployConfig) -> ExportSink {
        if !self.dry_run {
            return config.export_sink();
        }
        let mut export = config.export.clone();
        export.path = dry_run_path(&export.path);
        ExportSink::from(export)
    }
}

fn dry_run_path(path: &Path) -> PathBuf {
    let mut path = path.as_os_str().to_owned();
    path.push(".dry-run");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_flags_override_file() {
        let temp_dir = TempDir::new("starkup-cli").unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            "rpc_url = \"http://10.0.0.2:8545/\"\nartifacts_dir = \"build\"\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "starkup",
            "--config",
            temp_dir.path().to_str().unwrap(),
            "--rpc-url",
            "http://10.0.0.3:8545/",
        ]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.rpc_url.as_str(), "http://10.0.0.3:8545/");
        assert_eq!(config.artifacts_dir, PathBuf::from("build"));
        assert_eq!(config.export.key_suffix, "_ADDRESS");
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let cli = Cli::parse_from(["starkup", "--config", "/nonexistent/Starkup.toml"]);
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_dry_run_never_targets_the_real_file() {
        let cli = Cli::parse_from(["starkup", "--dry-run", "--out", "web/.env"]);
        let config = cli.apply_overrides(DeployConfig::default());
        assert_eq!(config.export.path, PathBuf::from("web/.env"));
        assert_eq!(cli.export_sink(&config).path(), Path::new("web/.env.dry-run"));

        let cli = Cli::parse_from(["starkup", "--out", "web/.env"]);
        assert_eq!(cli.export_sink(&config).path(), Path::new("web/.env"));
    }

    #[test]
    fn test_saved_dry_run_config_keeps_the_real_export_path() {
        let temp_dir = TempDir::new("starkup-cli").unwrap();
        let out = temp_dir.path().join(".env");

        let cli = Cli::parse_from([
            "starkup",
            "--dry-run",
            "--save-config",
            "--out",
            out.to_str().unwrap(),
        ]);
        let config = cli.load_config().unwrap();
        config.save_to_file(&config.default_save_path()).unwrap();
        assert_eq!(cli.export_sink(&config).path(), temp_dir.path().join(".env.dry-run"));

        let cli = Cli::parse_from(["starkup", "--config", temp_dir.path().to_str().unwrap()]);
        let reloaded = cli.load_config().unwrap();
        assert_eq!(reloaded.export.path, out);
        assert_eq!(cli.export_sink(&reloaded).path(), out);
    }
}
