use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Timeout applied when a request does not carry one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A `major.minor` toolchain version such as `1.21`.
///
/// Ordering is by `(major, minor)` as integers, so `1.3 < 1.21 < 1.30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionToken {
    pub major: u32,
    pub minor: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version token '{0}': expected <major>.<minor>")]
pub struct ParseVersionError(pub String);

impl VersionToken {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for VersionToken {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(err)?;

        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(major) || !all_digits(minor) {
            return Err(err());
        }

        Ok(Self {
            major: major.parse().map_err(|_| err())?,
            minor: minor.parse().map_err(|_| err())?,
        })
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl TryFrom<String> for VersionToken {
    type Error = ParseVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionToken> for String {
    fn from(token: VersionToken) -> Self {
        token.to_string()
    }
}

/// One installed toolchain as discovered by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainEntry {
    pub version: VersionToken,
    pub path: PathBuf,
    /// Full version reported by the binary, e.g. `1.18.10`. Empty when the
    /// binary ran but its output could not be parsed.
    pub full_version: String,
    pub available: bool,
}

/// A single run submitted by a caller.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    /// Explicit version; wins over every detection strategy.
    pub version: Option<String>,
    pub auto_detect: bool,
    pub timeout: Duration,
    pub environment: HashMap<String, String>,
    /// Comma separated `KEY=VALUE` pairs appended verbatim, e.g. `GOEXPERIMENT=jsonv2`.
    pub env_vars: Option<String>,
    /// Used only to infer a version. Never becomes the child's working directory.
    pub path_hint: Option<String>,
    pub strict_version: bool,
}

impl Default for ExecutionRequest {
    fn default() -> Self {
        Self {
            code: String::new(),
            version: None,
            auto_detect: false,
            timeout: DEFAULT_TIMEOUT,
            environment: HashMap::new(),
            env_vars: None,
            path_hint: None,
            strict_version: false,
        }
    }
}

impl ExecutionRequest {
    /// Run `code` under exactly `version`.
    pub fn with_version(code: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            version: Some(version.into()),
            strict_version: true,
            ..Default::default()
        }
    }

    /// Run `code` under whatever version its comments or embedded paths name.
    pub fn with_auto_detect(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            auto_detect: true,
            ..Default::default()
        }
    }

    /// Raw env pairs split on commas, trimmed, empties dropped.
    pub fn raw_env_pairs(&self) -> impl Iterator<Item = &str> {
        self.env_vars
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
    }
}

/// Machine-readable failure category carried by a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotSupported,
    Unavailable,
    VersionIndeterminate,
    VersionMismatch,
    VersionFeatureMismatch,
    ForbiddenConstruct,
    EmptySource,
    IoFailure,
    SpawnFailure,
    Timeout,
    NonZeroExit,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::VersionIndeterminate => "version_indeterminate",
            ErrorKind::VersionMismatch => "version_mismatch",
            ErrorKind::VersionFeatureMismatch => "version_feature_mismatch",
            ErrorKind::ForbiddenConstruct => "forbidden_construct",
            ErrorKind::EmptySource => "empty_source",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::SpawnFailure => "spawn_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NonZeroExit => "non_zero_exit",
        }
    }

    /// True when the submission never ran, as opposed to running and failing.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ErrorKind::Timeout | ErrorKind::NonZeroExit)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one run. `error` is empty exactly when every stage succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub error_kind: Option<ErrorKind>,
    pub exit_code: i32,
    pub elapsed: Duration,
    pub used_version: Option<VersionToken>,
    pub detected_version: Option<VersionToken>,
    pub go_version: String,
    pub version_path: Option<PathBuf>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    pub fn timed_out(&self) -> bool {
        self.error_kind == Some(ErrorKind::Timeout)
    }
}
