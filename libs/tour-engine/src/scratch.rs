// Scratch files: one per run, removed on every exit path
use crate::error::{ExecError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const MAX_CREATE_ATTEMPTS: usize = 8;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `gocode_<unix secs>_<nanos>_<pid>_<seq>.go`
fn unique_name() -> String {
    let now = chrono::Utc::now();
    format!(
        "gocode_{}_{:09}_{}_{}.go",
        now.timestamp(),
        now.timestamp_subsec_nanos(),
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// Owns a source file in the scratch directory.
///
/// `release()` removes it and reports failure; if the guard is dropped
/// without being released (early return, timeout, panic) `Drop` removes it.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    released: bool,
}

impl ScratchFile {
    pub fn create(dir: &Path, contents: &str) -> Result<Self> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let path = dir.join(unique_name());
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(ExecError::io(
                        format!("failed to create scratch file {}", path.display()),
                        e,
                    ))
                }
            };

            // Guard first, so a failed write still removes the file
            let guard = Self {
                path,
                released: false,
            };
            file.write_all(contents.as_bytes()).map_err(|e| {
                ExecError::io(format!("failed to write scratch file {}", guard.path.display()), e)
            })?;

            debug!(path = %guard.path.display(), bytes = contents.len(), "Scratch file created");
            return Ok(guard);
        }

        Err(ExecError::io(
            "failed to create scratch file",
            std::io::Error::new(ErrorKind::AlreadyExists, "no unique name after retries"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| {
            ExecError::io(format!("failed to remove scratch file {}", self.path.display()), e)
        })
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Scratch file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file"),
        }
    }
}
