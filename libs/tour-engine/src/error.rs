use std::path::PathBuf;
use std::time::Duration;
use tour_common::{ErrorKind, VersionToken};

/// Everything that can stop a submission from running to a clean exit.
///
/// The executor never returns these to its caller directly; each one is
/// folded into an `ExecutionResult` via [`ExecError::kind`] and `Display`.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("unsupported Go version: {version}")]
    NotSupported { version: String },

    #[error("Go {version} is not installed or not runnable at {}", path.display())]
    Unavailable { version: VersionToken, path: PathBuf },

    #[error("could not determine Go version: pass an explicit version or a lesson path (releases/v/<x.y>/...)")]
    VersionIndeterminate,

    #[error("strict mode: requested Go {requested} but resolved Go {resolved}")]
    VersionMismatch { requested: String, resolved: VersionToken },

    #[error("{feature} requires Go {required} or later (resolved: Go {resolved})")]
    VersionFeatureMismatch {
        feature: String,
        required: VersionToken,
        resolved: VersionToken,
    },

    #[error("code containing '{token}' cannot be executed for security reasons")]
    ForbiddenConstruct { token: String },

    #[error("empty source cannot be executed")]
    EmptySource,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("execution timed out ({budget:?})")]
    Timeout { budget: Duration },

    #[error("exit status {code}")]
    NonZeroExit { code: i32 },
}

impl ExecError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ExecError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::NotSupported { .. } => ErrorKind::NotSupported,
            ExecError::Unavailable { .. } => ErrorKind::Unavailable,
            ExecError::VersionIndeterminate => ErrorKind::VersionIndeterminate,
            ExecError::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            ExecError::VersionFeatureMismatch { .. } => ErrorKind::VersionFeatureMismatch,
            ExecError::ForbiddenConstruct { .. } => ErrorKind::ForbiddenConstruct,
            ExecError::EmptySource => ErrorKind::EmptySource,
            ExecError::Io { .. } => ErrorKind::IoFailure,
            ExecError::Spawn { .. } => ErrorKind::SpawnFailure,
            ExecError::Timeout { .. } => ErrorKind::Timeout,
            ExecError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
