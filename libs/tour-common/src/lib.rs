pub mod config;
pub mod types;

pub use types::{
    ErrorKind, ExecutionRequest, ExecutionResult, ParseVersionError, ToolchainEntry, VersionToken,
    DEFAULT_TIMEOUT,
};
