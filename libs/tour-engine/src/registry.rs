/// Toolchain Registry - discovers installed Go toolchains once, then serves lookups
///
/// **Discovery rules:**
/// - Every configured candidate is probed with `<path> version`
/// - A path that exists but fails to run is recorded as unavailable
/// - The full version (e.g. `1.18.10`) is parsed from the probe output
///
/// Discovery happens at most once per registry unless `reload()` is called.
/// Lookups share a read lock; discovery takes the write lock.

use crate::error::{ExecError, Result};
use crate::validator;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tour_common::config::ToolchainConfigManager;
use tour_common::{ToolchainEntry, VersionToken};
use tracing::{debug, info, warn};

lazy_static! {
    // "go version go1.18.10 linux/amd64" -> "1.18.10"
    static ref FULL_VERSION: Regex = Regex::new(r"go(\d+\.\d+\.\d+)").unwrap();
}

#[derive(Default)]
struct RegistryState {
    initialized: bool,
    entries: HashMap<VersionToken, ToolchainEntry>,
}

/// Snapshot of the registry for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub total_versions: usize,
    pub available_versions: usize,
    pub multi_version_support: bool,
    pub explicit_version_required: bool,
    pub versions: Vec<ToolchainEntry>,
}

pub struct Registry {
    candidates: Vec<(VersionToken, PathBuf)>,
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new(candidates: Vec<(VersionToken, PathBuf)>) -> Self {
        Self {
            candidates,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn from_config(config: &ToolchainConfigManager) -> Self {
        Self::new(config.candidates())
    }

    /// Probe every candidate. No-op if discovery already ran.
    pub fn initialize(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.initialized {
            return;
        }
        state.entries = self.discover();
        state.initialized = true;
    }

    /// Re-probe every candidate, replacing the previous map.
    pub fn reload(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries = self.discover();
        state.initialized = true;
    }

    fn discover(&self) -> HashMap<VersionToken, ToolchainEntry> {
        let entries: HashMap<_, _> = self
            .candidates
            .iter()
            .map(|(version, path)| (*version, probe(*version, path)))
            .collect();

        let available = entries.values().filter(|e| e.available).count();
        info!(
            configured = entries.len(),
            available = available,
            "Toolchain discovery complete"
        );
        entries
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if state.initialized {
                return state;
            }
        }
        self.initialize();
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a runnable toolchain
    pub fn get_entry(&self, version: &VersionToken) -> Result<ToolchainEntry> {
        let state = self.read_state();
        let entry = state
            .entries
            .get(version)
            .ok_or_else(|| ExecError::NotSupported {
                version: version.to_string(),
            })?;

        if !entry.available {
            return Err(ExecError::Unavailable {
                version: entry.version,
                path: entry.path.clone(),
            });
        }

        Ok(entry.clone())
    }

    /// Versions whose toolchain is runnable; order unspecified
    pub fn list_available(&self) -> Vec<VersionToken> {
        self.read_state()
            .entries
            .values()
            .filter(|entry| entry.available)
            .map(|entry| entry.version)
            .collect()
    }

    /// Copy of every entry, available or not, oldest version first
    pub fn all_entries(&self) -> Vec<ToolchainEntry> {
        let mut entries: Vec<ToolchainEntry> = self.read_state().entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.version);
        entries
    }

    pub fn status(&self) -> RegistryStatus {
        let versions = self.all_entries();
        RegistryStatus {
            total_versions: versions.len(),
            available_versions: versions.iter().filter(|e| e.available).count(),
            multi_version_support: true,
            explicit_version_required: true,
            versions,
        }
    }

    /// Check that a runnable toolchain supports every named feature
    pub fn check_features(&self, version: &VersionToken, features: &[&str]) -> Result<()> {
        let entry = self.get_entry(version)?;
        for feature in features {
            if let Some(required) = validator::feature_requirement(feature) {
                if entry.version < required {
                    return Err(ExecError::VersionFeatureMismatch {
                        feature: feature.to_string(),
                        required,
                        resolved: entry.version,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Run `<path> version` and build the entry from what happens
fn probe(version: VersionToken, path: &Path) -> ToolchainEntry {
    let mut entry = ToolchainEntry {
        version,
        path: path.to_path_buf(),
        full_version: String::new(),
        available: false,
    };

    if !path.exists() {
        debug!(version = %version, path = %path.display(), "Toolchain not installed");
        return entry;
    }

    let output = match Command::new(path).arg("version").output() {
        Ok(output) => output,
        Err(e) => {
            warn!(version = %version, path = %path.display(), error = %e, "Toolchain failed to start");
            return entry;
        }
    };

    if !output.status.success() {
        warn!(
            version = %version,
            path = %path.display(),
            status = %output.status,
            "Toolchain version probe failed"
        );
        return entry;
    }

    entry.available = true;
    match parse_full_version(&String::from_utf8_lossy(&output.stdout)) {
        Some(full) => entry.full_version = full,
        None => warn!(version = %version, "Could not parse toolchain version output"),
    }

    debug!(version = %version, full_version = %entry.full_version, "Toolchain available");
    entry
}

pub(crate) fn parse_full_version(output: &str) -> Option<String> {
    FULL_VERSION
        .captures(output)
        .map(|caps| caps[1].to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{fake_toolchains, FakeToolchains};

    fn registry(fakes: &FakeToolchains) -> Registry {
        Registry::new(vec![
            (VersionToken::new(1, 18), fakes.working("1.18.10")),
            (VersionToken::new(1, 21), fakes.working("1.21.5")),
            (VersionToken::new(1, 22), fakes.broken()),
            (VersionToken::new(1, 23), fakes.missing()),
        ])
    }

    #[test]
    fn test_parse_full_version() {
        assert_eq!(
            parse_full_version("go version go1.18.10 linux/amd64\n").as_deref(),
            Some("1.18.10")
        );
        assert_eq!(parse_full_version("go version devel +abc linux/amd64"), None);
    }

    #[test]
    fn test_get_entry_returns_configured_version() {
        let fakes = fake_toolchains();
        let registry = registry(fakes);

        for token in ["1.18", "1.21"] {
            let token: VersionToken = token.parse().unwrap();
            let entry = registry.get_entry(&token).unwrap();
            assert_eq!(entry.version, token);
            assert!(entry.available);
        }

        assert_eq!(
            registry.get_entry(&VersionToken::new(1, 21)).unwrap().full_version,
            "1.21.5"
        );
    }

    #[test]
    fn test_unknown_version_is_not_supported() {
        let registry = registry(fake_toolchains());
        let err = registry.get_entry(&VersionToken::new(1, 99)).unwrap_err();
        assert!(matches!(err, ExecError::NotSupported { .. }));
    }

    #[test]
    fn test_broken_and_missing_toolchains_are_unavailable() {
        let registry = registry(fake_toolchains());

        // Present but exits non-zero on `version`
        let err = registry.get_entry(&VersionToken::new(1, 22)).unwrap_err();
        assert!(matches!(err, ExecError::Unavailable { .. }));

        let err = registry.get_entry(&VersionToken::new(1, 23)).unwrap_err();
        assert!(matches!(err, ExecError::Unavailable { .. }));
    }

    #[test]
    fn test_unparseable_banner_is_available_without_full_version() {
        let registry = Registry::new(vec![(VersionToken::new(1, 25), fake_toolchains().devel())]);

        let entry = registry.get_entry(&VersionToken::new(1, 25)).unwrap();
        assert!(entry.available);
        assert_eq!(entry.full_version, "");
    }

    #[test]
    fn test_list_available() {
        let registry = registry(fake_toolchains());
        let mut available = registry.list_available();
        available.sort();
        assert_eq!(available, vec![VersionToken::new(1, 18), VersionToken::new(1, 21)]);
    }

    #[test]
    fn test_status_counts() {
        let status = registry(fake_toolchains()).status();
        assert_eq!(status.total_versions, 4);
        assert_eq!(status.available_versions, 2);
        assert_eq!(status.versions[0].version, VersionToken::new(1, 18));
    }

    #[test]
    fn test_initialize_is_idempotent_and_reload_reprobes() {
        let dir = tempfile::tempdir().unwrap();
        let late_path = dir.path().join("go");
        let fakes = fake_toolchains();

        let registry = Registry::new(vec![(VersionToken::new(1, 24), late_path.clone())]);
        registry.initialize();
        assert!(registry.list_available().is_empty());

        // Installing the toolchain after discovery changes nothing until reload
        std::fs::copy(fakes.working("1.24.2"), &late_path).unwrap();
        registry.initialize();
        assert!(registry.list_available().is_empty());

        registry.reload();
        assert_eq!(registry.list_available(), vec![VersionToken::new(1, 24)]);
    }

    #[test]
    fn test_check_features() {
        let registry = registry(fake_toolchains());
        let v1_18 = VersionToken::new(1, 18);

        assert!(registry.check_features(&v1_18, &["generics", "workspace"]).is_ok());
        assert!(registry.check_features(&v1_18, &["unknown-feature"]).is_ok());

        let err = registry.check_features(&v1_18, &["generics", "iterators"]).unwrap_err();
        match err {
            ExecError::VersionFeatureMismatch { feature, required, .. } => {
                assert_eq!(feature, "iterators");
                assert_eq!(required, VersionToken::new(1, 23));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
