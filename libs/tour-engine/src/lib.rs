//! Multi-version Go execution engine.
//!
//! [`Executor::run`] takes an [`ExecutionRequest`], picks a Go version
//! ([`resolver`]), looks it up in the [`Registry`], screens the source
//! ([`validator`]) and runs it under a hard timeout.

pub mod detector;
pub mod error;
pub mod executor;
pub mod registry;
pub mod resolver;
mod scratch;
pub mod validator;

#[cfg(all(test, unix))]
mod testing;

pub use error::{ExecError, Result};
pub use executor::{Executor, VersionInfo, NOT_RUN_EXIT_CODE, TIMEOUT_EXIT_CODE};
pub use registry::{Registry, RegistryStatus};
pub use resolver::{Resolution, ResolutionSource};
pub use tour_common::{ErrorKind, ExecutionRequest, ExecutionResult, ToolchainEntry, VersionToken};
