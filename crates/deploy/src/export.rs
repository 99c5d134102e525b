//! Export sink: writes the deployed addresses as `KEY=VALUE` lines.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{error::DeployError, executor::HandleMap, plan::DeploymentPlan};

/// Export artifact settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File replaced on every export.
    pub path: PathBuf,
    pub key_prefix: String,
    pub key_suffix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".env"),
            key_prefix: "REACT_APP_".to_string(),
            key_suffix: "_ADDRESS".to_string(),
        }
    }
}

/// Serializes a complete deployment into its export artifact.
#[derive(Debug, Clone)]
pub struct ExportSink {
    config: ExportConfig,
}

impl From<ExportConfig> for ExportSink {
    fn from(config: ExportConfig) -> Self {
        Self { config }
    }
}

impl ExportSink {
    /// A sink writing to `path` with the default key format.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            config: ExportConfig {
                path: path.into(),
                ..Default::default()
            },
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn with_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.key_suffix = suffix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Export key for a resource name, e.g. `azimuth` -> `REACT_APP_AZIMUTH_ADDRESS`.
    pub fn export_key(&self, name: &str) -> String {
        let name: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}{}", self.config.key_prefix, name, self.config.key_suffix)
    }

    /// Render one line per declared resource, in plan order.
    ///
    /// Fails without producing anything if two resources map to the same key, or
    /// if any declared resource has no handle.
    pub fn render(&self, plan: &DeploymentPlan, handles: &HandleMap) -> Result<String, DeployError> {
        let keys: Vec<(String, &str)> = plan
            .names()
            .map(|name| (self.export_key(name), name))
            .collect();

        let mut owners: HashMap<&str, Vec<String>> = HashMap::new();
        for (key, name) in &keys {
            owners.entry(key.as_str()).or_default().push(name.to_string());
        }
        if let Some((key, names)) = keys.iter().find_map(|(key, _)| {
            owners
                .get(key.as_str())
                .filter(|names| names.len() > 1)
                .map(|names| (key, names))
        }) {
            return Err(DeployError::ExportKeyCollision {
                key: key.clone(),
                names: names.clone(),
            });
        }

        let missing: Vec<String> = plan
            .names()
            .filter(|name| handles.get(name).is_none())
            .map(str::to_string)
            .collect();

        if !missing.is_empty() {
            return Err(DeployError::IncompleteResult { missing });
        }

        Ok(keys
            .iter()
            .filter_map(|(key, name)| handles.address_of(name).map(|address| (key, address)))
            .map(|(key, address)| format!("{}={}\n", key, address.to_checksum(None)))
            .collect())
    }

    /// Render and atomically replace the export artifact.
    pub fn export(&self, plan: &DeploymentPlan, handles: &HandleMap) -> Result<PathBuf, DeployError> {
        let content = self.render(plan, handles)?;
        let path = self.config.path.clone();

        write_atomic(&path, content.as_bytes()).map_err(|err| DeployError::ExportFailed {
            path: path.clone(),
            cause: err.into(),
        })?;

        tracing::info!(path = %path.display(), entries = plan.len(), "Export artifact written");

        Ok(path)
    }
}

/// Replace `path` with `content`.
///
/// Concurrent writers are serialized by an exclusive lock on a hidden sibling,
/// see [`lock_path`]. The content goes to a temporary sibling file that is synced and renamed over
/// `path`, so readers see either the old or the new file.
fn write_atomic(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let file_name = path
        .file_name()
        .with_context(|| format!("Export path {} has no file name", path.display()))?
        .to_string_lossy()
        .into_owned();

    let lock_path = lock_path(&dir, &file_name);
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;
    lock.lock_exclusive()
        .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

    let tmp_path = dir.join(format!(".{file_name}.{:016x}.tmp", rand::random::<u64>()));
    let written = write_and_sync(&tmp_path, content).and_then(|()| {
        std::fs::rename(&tmp_path, path).with_context(|| {
            format!("Failed to move {} to {}", tmp_path.display(), path.display())
        })
    });

    if written.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }

    // Unlocking also happens when `lock` is dropped.
    let _ = FileExt::unlock(&lock);

    written
}

/// Lock file guarding the artifact `file_name` in `dir`.
///
/// The lock file is left in place after the export: removing it would let a
/// waiting writer lock a file that no longer has a name. It is hidden and named
/// after the tool, `.env` gives `.env.starkup-lock`.
fn lock_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!(".{}.starkup-lock", file_name.trim_start_matches('.')))
}

fn write_and_sync(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        factory::ResourceHandle,
        plan::{Arg, ResourceKind, ResourceSpec},
    };
    use alloy_core::primitives::Address;
    use tempdir::TempDir;

    fn plan() -> DeploymentPlan {
        DeploymentPlan::new([
            ResourceSpec::create("azimuth", ResourceKind::Registry, vec![]),
            ResourceSpec::create("claims", ResourceKind::Claims, vec![Arg::resource("azimuth")]),
        ])
        .unwrap()
    }

    fn handle(name: &str, address: &str) -> ResourceHandle {
        ResourceHandle {
            name: name.to_string(),
            address: address.parse::<Address>().unwrap(),
            kind: ResourceKind::Registry,
        }
    }

    fn handles() -> HandleMap {
        HandleMap::try_from(vec![
            handle("azimuth", "0x5fbdb2315678afecb367f032d93f642f64180aa3"),
            handle("claims", "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512"),
        ])
        .unwrap()
    }

    #[test]
    fn test_export_key() {
        let sink = ExportSink::new(".env");
        assert_eq!(sink.export_key("azimuth"), "REACT_APP_AZIMUTH_ADDRESS");
        assert_eq!(sink.export_key("star-token.v2"), "REACT_APP_STAR_TOKEN_V2_ADDRESS");

        let sink = sink.with_key_prefix("").with_key_suffix("");
        assert_eq!(sink.export_key("polls"), "POLLS");
    }

    #[test]
    fn test_render_uses_plan_order_and_checksums() {
        let rendered = ExportSink::new(".env").render(&plan(), &handles()).unwrap();
        assert_eq!(
            rendered,
            "REACT_APP_AZIMUTH_ADDRESS=0x5FbDB2315678afecb367f032d93F642f64180aa3\n\
             REACT_APP_CLAIMS_ADDRESS=0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512\n"
        );
    }

    #[test]
    fn test_partial_result_writes_nothing() {
        let temp_dir = TempDir::new("starkup-test").unwrap();
        let path = temp_dir.path().join(".env");
        let partial =
            HandleMap::try_from(vec![handle("azimuth", "0x5fbdb2315678afecb367f032d93f642f64180aa3")])
                .unwrap();

        let err = ExportSink::new(&path).export(&plan(), &partial).unwrap_err();
        match err {
            DeployError::IncompleteResult { missing } => assert_eq!(missing, vec!["claims"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_export_replaces_previous_artifact() {
        let temp_dir = TempDir::new("starkup-test").unwrap();
        let path = temp_dir.path().join("nested").join(".env");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "STALE=1\n").unwrap();

        let written = ExportSink::new(&path).export(&plan(), &handles()).unwrap();
        assert_eq!(written, path);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("STALE"));
        assert_eq!(content.lines().count(), 2);

        // Only the artifact and its lock file remain.
        let mut entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec![".env", ".env.starkup-lock"]);
    }

    #[test]
    fn test_lock_file_is_hidden() {
        let dir = Path::new("app");
        assert_eq!(lock_path(dir, ".env"), dir.join(".env.starkup-lock"));
        assert_eq!(
            lock_path(dir, "addresses.env"),
            dir.join(".addresses.env.starkup-lock")
        );
    }

    #[test]
    fn test_colliding_export_keys_are_rejected() {
        let temp_dir = TempDir::new("starkup-test").unwrap();
        let path = temp_dir.path().join(".env");
        let plan = DeploymentPlan::new([
            ResourceSpec::create("star-token", ResourceKind::Registry, vec![]),
            ResourceSpec::create("star_token", ResourceKind::Registry, vec![]),
        ])
        .unwrap();
        let handles = HandleMap::try_from(vec![
            handle("star-token", "0x5fbdb2315678afecb367f032d93f642f64180aa3"),
            handle("star_token", "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512"),
        ])
        .unwrap();

        let err = ExportSink::new(&path).export(&plan, &handles).unwrap_err();
        match &err {
            DeployError::ExportKeyCollision { key, names } => {
                assert_eq!(key, "REACT_APP_STAR_TOKEN_ADDRESS");
                assert_eq!(names, &vec!["star-token", "star_token"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.stage(), crate::error::RunStage::Exporting);
        assert!(!path.exists());
    }

    #[test]
    fn test_keys_differing_only_in_case_collide() {
        let plan = DeploymentPlan::new([
            ResourceSpec::create("Azimuth", ResourceKind::Registry, vec![]),
            ResourceSpec::create("azimuth", ResourceKind::Registry, vec![]),
        ])
        .unwrap();

        let err = ExportSink::new(".env").render(&plan, &HandleMap::new()).unwrap_err();
        assert!(matches!(err, DeployError::ExportKeyCollision { .. }));
    }

    #[test]
    fn test_export_failure_reports_path() {
        let temp_dir = TempDir::new("starkup-test").unwrap();
        // A directory where the artifact should be makes the final rename fail.
        let path = temp_dir.path().join("taken");
        std::fs::create_dir_all(path.join("child")).unwrap();

        let err = ExportSink::new(&path).export(&plan(), &handles()).unwrap_err();
        assert!(matches!(&err, DeployError::ExportFailed { path: failed, .. } if *failed == path));
    }
}
