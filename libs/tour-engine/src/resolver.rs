/// Version Resolver - picks exactly one version per request
///
/// **Precedence (first match wins, results are never merged):**
/// 1. Explicit version on the request
/// 2. Path hint (`releases/v/<x.y>/...`)
/// 3. Source sniffing, only when the request opts into auto-detect
///
/// Nothing here checks whether the version is installed; that is the
/// registry's job once a version has been chosen.

use crate::detector::{self, CodeSignal};
use crate::error::{ExecError, Result};
use tour_common::{ExecutionRequest, VersionToken};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Explicit,
    PathHint,
    Code(CodeSignal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub version: VersionToken,
    pub source: ResolutionSource,
}

pub fn resolve(request: &ExecutionRequest) -> Result<Resolution> {
    if let Some(explicit) = request.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        let version = explicit.parse().map_err(|_| ExecError::NotSupported {
            version: explicit.to_string(),
        })?;
        debug!(version = %version, "Using explicit version");
        return Ok(Resolution {
            version,
            source: ResolutionSource::Explicit,
        });
    }

    if let Some(hint) = request.path_hint.as_deref() {
        match detector::version_from_path(hint) {
            Some(version) => {
                debug!(version = %version, hint = hint, "Version taken from path hint");
                return Ok(Resolution {
                    version,
                    source: ResolutionSource::PathHint,
                });
            }
            None => debug!(hint = hint, "Path hint carries no version"),
        }
    }

    if request.auto_detect {
        if let Some((version, signal)) = detector::version_from_code(&request.code) {
            debug!(version = %version, signal = ?signal, "Version detected from source");
            return Ok(Resolution {
                version,
                source: ResolutionSource::Code(signal),
            });
        }
        debug!(code_len = request.code.len(), "No version found in source");
    }

    Err(ExecError::VersionIndeterminate)
}
