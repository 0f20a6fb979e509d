// Toolchain configuration for the tour runner
use crate::types::{VersionToken, DEFAULT_TIMEOUT};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "config/toolchains.json";
pub const CONFIG_PATH_ENV: &str = "TOUR_CONFIG";
pub const SCRATCH_DIR_ENV: &str = "TOUR_SCRATCH_DIR";

/// Versions shipped in the runtime image, each under `/opt/go<x.y>/bin/go`.
const BUILTIN_VERSIONS: &[(u32, u32)] = &[
    (1, 18),
    (1, 19),
    (1, 20),
    (1, 21),
    (1, 22),
    (1, 23),
    (1, 24),
    (1, 25),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    pub version: VersionToken,
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolchainsJson {
    #[serde(default)]
    scratch_dir: Option<PathBuf>,
    #[serde(default)]
    default_timeout_ms: Option<u64>,
    toolchains: Vec<ToolchainConfig>,
}

/// Static table of candidate toolchains plus execution defaults.
///
/// The table only says where a toolchain *should* be; whether it actually
/// runs is decided later by the registry.
#[derive(Debug, Clone)]
pub struct ToolchainConfigManager {
    toolchains: BTreeMap<VersionToken, PathBuf>,
    scratch_dir: PathBuf,
    default_timeout: Duration,
}

impl ToolchainConfigManager {
    /// Load toolchain configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Toolchain config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let parsed: ToolchainsJson = serde_json::from_str(content)?;

        if parsed.toolchains.is_empty() {
            bail!("No toolchains configured");
        }

        let mut toolchains = BTreeMap::new();
        for toolchain in parsed.toolchains {
            if toolchains.insert(toolchain.version, toolchain.path).is_some() {
                bail!("Toolchain version {} configured more than once", toolchain.version);
            }
        }

        Ok(Self {
            toolchains,
            scratch_dir: parsed.scratch_dir.unwrap_or_else(std::env::temp_dir),
            default_timeout: parsed
                .default_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    /// The `/opt/go<x.y>/bin/go` table used when no config file exists.
    pub fn builtin() -> Self {
        let toolchains = BUILTIN_VERSIONS
            .iter()
            .map(|&(major, minor)| {
                let token = VersionToken::new(major, minor);
                (token, PathBuf::from(format!("/opt/go{}/bin/go", token)))
            })
            .collect();

        Self {
            toolchains,
            scratch_dir: std::env::temp_dir(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load from `$TOUR_CONFIG` or `config/toolchains.json`, falling back to
    /// the built-in table when neither exists. `$TOUR_SCRATCH_DIR` overrides
    /// the scratch directory either way.
    pub fn load_default() -> Result<Self> {
        let mut manager = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    debug!("No {} found, using built-in toolchain table", DEFAULT_CONFIG_PATH);
                    Self::builtin()
                }
            }
        };

        if let Ok(dir) = std::env::var(SCRATCH_DIR_ENV) {
            manager.scratch_dir = PathBuf::from(dir);
        }

        info!(
            toolchains = manager.toolchains.len(),
            scratch_dir = %manager.scratch_dir.display(),
            "Toolchain configuration loaded"
        );
        Ok(manager)
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Get the configured executable path for a version
    pub fn get_path(&self, version: &VersionToken) -> Option<&Path> {
        self.toolchains.get(version).map(PathBuf::as_path)
    }

    /// Every configured `(version, path)` pair, oldest first
    pub fn candidates(&self) -> Vec<(VersionToken, PathBuf)> {
        self.toolchains
            .iter()
            .map(|(version, path)| (*version, path.clone()))
            .collect()
    }

    pub fn list_versions(&self) -> Vec<VersionToken> {
        self.toolchains.keys().copied().collect()
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}
