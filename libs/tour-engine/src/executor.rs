/// Sandboxed Executor - runs one submission against one Go toolchain
///
/// **Pipeline per request:**
/// 1. Resolve a version (explicit, path hint, auto-detect)
/// 2. Registry lookup, then the strict-version check
/// 3. Safety validation; nothing is spawned if it fails
/// 4. Write a scratch file, spawn `<go> run <file>` under a hard timeout
/// 5. Collect combined output and the exit code
///
/// **Guarantees:**
/// - `run` never fails; every outcome is folded into an `ExecutionResult`
/// - Scratch files are removed on every exit path (see `ScratchFile`)
/// - On timeout the whole process group is killed and reaped, exit code 124
///
/// The executor holds no per-request state, so one instance can serve any
/// number of concurrent callers.

use crate::error::{ExecError, Result};
use crate::registry::{Registry, RegistryStatus};
use crate::resolver;
use crate::scratch::ScratchFile;
use crate::{detector, validator};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tour_common::config::ToolchainConfigManager;
use tour_common::{ExecutionRequest, ExecutionResult, ToolchainEntry, VersionToken, DEFAULT_TIMEOUT};
use tracing::{debug, info, warn};

/// Exit code reported for timed-out runs
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when no child process was ever started
pub const NOT_RUN_EXIT_CODE: i32 = -1;

/// Snapshot served by the version-info endpoint
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub supported_versions: Vec<VersionToken>,
    pub registry: RegistryStatus,
    pub scratch_dir: PathBuf,
    pub default_timeout_ms: u64,
}

pub struct Executor {
    registry: Arc<Registry>,
    scratch_dir: PathBuf,
    default_timeout: Duration,
}

impl Executor {
    /// Fails if the scratch directory cannot be created or is not a writable
    /// directory; nothing can run without it.
    pub fn new(registry: Arc<Registry>, scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let scratch_dir = scratch_dir.into();
        fs::create_dir_all(&scratch_dir).map_err(|e| {
            ExecError::io(format!("cannot create scratch dir {}", scratch_dir.display()), e)
        })?;

        let metadata = fs::metadata(&scratch_dir).map_err(|e| {
            ExecError::io(format!("cannot stat scratch dir {}", scratch_dir.display()), e)
        })?;
        if !metadata.is_dir() || metadata.permissions().readonly() {
            return Err(ExecError::io(
                format!("scratch dir {} is not a writable directory", scratch_dir.display()),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "unusable scratch dir"),
            ));
        }

        info!(scratch_dir = %scratch_dir.display(), "Executor ready");

        Ok(Self {
            registry,
            scratch_dir,
            default_timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn from_config(config: &ToolchainConfigManager, registry: Arc<Registry>) -> Result<Self> {
        Ok(Self::new(registry, config.scratch_dir())?.with_default_timeout(config.default_timeout()))
    }

    /// Budget used when a request carries a zero timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Installed versions, newest first
    pub fn supported_versions(&self) -> Vec<VersionToken> {
        let mut versions = self.registry.list_available();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions
    }

    pub fn version_info(&self) -> VersionInfo {
        VersionInfo {
            supported_versions: self.supported_versions(),
            registry: self.registry.status(),
            scratch_dir: self.scratch_dir.clone(),
            default_timeout_ms: self.default_timeout.as_millis() as u64,
        }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            explicit = request.version.as_deref().unwrap_or(""),
            auto_detect = request.auto_detect,
            code_len = request.code.len()
        )
    )]
    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        let start = Instant::now();
        let mut result = ExecutionResult {
            exit_code: NOT_RUN_EXIT_CODE,
            ..Default::default()
        };

        if request.auto_detect {
            result.detected_version = detector::version_from_code(&request.code).map(|(v, _)| v);
        }

        if let Err(e) = self.run_stages(request, &mut result).await {
            match &e {
                ExecError::Timeout { .. } => {
                    result.output.clear();
                    result.exit_code = TIMEOUT_EXIT_CODE;
                }
                ExecError::NonZeroExit { .. } => {}
                _ if e.kind().is_rejection() => {
                    debug!(error_kind = %e.kind(), "Request rejected before spawn");
                }
                _ => {}
            }
            result.error = e.to_string();
            result.error_kind = Some(e.kind());
        }

        result.elapsed = start.elapsed();

        if result.is_success() {
            info!(
                version = %display_version(result.used_version),
                execution_time_ms = result.elapsed.as_millis() as u64,
                "Run succeeded"
            );
        } else {
            warn!(
                version = %display_version(result.used_version),
                execution_time_ms = result.elapsed.as_millis() as u64,
                exit_code = result.exit_code,
                error_kind = result.error_kind.map(|k| k.as_str()).unwrap_or(""),
                error = %result.error,
                "Run failed"
            );
        }

        result
    }

    async fn run_stages(&self, request: &ExecutionRequest, result: &mut ExecutionResult) -> Result<()> {
        let resolution = resolver::resolve(request)?;
        let version = resolution.version;
        result.used_version = Some(version);
        debug!(version = %version, source = ?resolution.source, "Version resolved");

        let entry = self.registry.get_entry(&version)?;
        result.go_version = entry.full_version.clone();
        result.version_path = Some(entry.path.clone());

        if request.strict_version {
            if let Some(requested) = request
                .version
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
            {
                if requested != version.to_string() {
                    return Err(ExecError::VersionMismatch {
                        requested: requested.to_string(),
                        resolved: version,
                    });
                }
            }
        }

        validator::validate(&request.code, &version)?;

        let scratch = ScratchFile::create(&self.scratch_dir, &request.code)?;
        let outcome = self.spawn_and_wait(&entry, scratch.path(), request).await;
        let cleanup = scratch.release();

        let (output, exit_code) = outcome?;
        result.output = output;
        result.exit_code = exit_code;

        if exit_code != 0 {
            if let Err(e) = cleanup {
                warn!(error = %e, "Scratch cleanup failed after non-zero exit");
            }
            return Err(ExecError::NonZeroExit { code: exit_code });
        }
        cleanup
    }

    async fn spawn_and_wait(
        &self,
        entry: &ToolchainEntry,
        source: &Path,
        request: &ExecutionRequest,
    ) -> Result<(String, i32)> {
        let budget = if request.timeout.is_zero() {
            self.default_timeout
        } else {
            request.timeout
        };

        let mut command = Command::new(&entry.path);
        command
            .arg("run")
            .arg(source)
            .current_dir(&self.scratch_dir)
            .envs(&request.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for pair in request.raw_env_pairs() {
            match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    command.env(key, value);
                }
                _ => warn!(pair = pair, "Ignoring malformed env pair"),
            }
        }

        // Own process group, so a timeout takes out `go run` and the
        // compiled program it spawned
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| ExecError::Spawn {
            path: entry.path.clone(),
            source: e,
        })?;
        let pid = child.id();
        debug!(pid = ?pid, path = %entry.path.display(), timeout_ms = budget.as_millis() as u64, "Toolchain spawned");

        let mut stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let execution_future = async {
            let status = child.wait().await;
            let stdout = join_output(&mut stdout_task).await;
            let stderr = join_output(&mut stderr_task).await;
            (status, stdout, stderr)
        };

        match tokio::time::timeout(budget, execution_future).await {
            Ok((status, stdout, stderr)) => {
                let status = status.map_err(|e| ExecError::io("failed to wait for toolchain", e))?;
                let mut output = String::from_utf8_lossy(&stdout).into_owned();
                output.push_str(&String::from_utf8_lossy(&stderr));
                Ok((output, status.code().unwrap_or(1)))
            }
            Err(_) => {
                warn!(pid = ?pid, timeout_ms = budget.as_millis() as u64, "Execution timed out, killing process group");
                kill_tree(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(ExecError::Timeout { budget })
            }
        }
    }
}

fn display_version(version: Option<VersionToken>) -> String {
    version.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Output pipe closed with error");
        }
    }
    buf
}

async fn join_output(task: &mut JoinHandle<Vec<u8>>) -> Vec<u8> {
    task.await.unwrap_or_default()
}

/// Kill the child's process group, then the child itself, and reap it.
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
            // SAFETY: plain syscall; a negative pid targets the group created
            // by `process_group(0)`, which only holds the child's tree
            let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
            if rc != 0 {
                debug!(pid = pid, error = %std::io::Error::last_os_error(), "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill timed-out child");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::fake_toolchains;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tour_common::ErrorKind;

    const HELLO: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"Hello, World!\")\n}\n";

    fn v(s: &str) -> VersionToken {
        s.parse().unwrap()
    }

    fn executor() -> (Executor, TempDir) {
        let fakes = fake_toolchains();
        let registry = Registry::new(vec![
            (v("1.18"), fakes.working("1.18.10")),
            (v("1.21"), fakes.working("1.21.5")),
            (v("1.22"), fakes.working("1.22.3")),
            (v("1.20"), fakes.missing()),
        ]);
        let scratch = tempfile::tempdir().unwrap();
        let executor = Executor::new(Arc::new(registry), scratch.path()).unwrap();
        (executor, scratch)
    }

    fn residue(dir: &TempDir) -> usize {
        fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_hello_world() {
        let (executor, scratch) = executor();
        let result = executor.run(&ExecutionRequest::with_version(HELLO, "1.21")).await;

        assert_eq!(result.output, "Hello, World!\n");
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_empty());
        assert_eq!(result.error_kind, None);
        assert_eq!(result.used_version, Some(v("1.21")));
        assert_eq!(result.go_version, "1.21.5");
        assert_eq!(result.version_path, Some(fake_toolchains().working("1.21.5")));
        assert_eq!(residue(&scratch), 0);
    }

    #[tokio::test]
    async fn test_forbidden_code_spawns_nothing() {
        let (executor, scratch) = executor();
        let log_dir = tempfile::tempdir().unwrap();
        let spawn_log = log_dir.path().join("spawned");

        let mut request = ExecutionRequest::with_version(
            "package main\nimport \"os\"\nfunc main() { os.RemoveAll(\"/\") }\n",
            "1.21",
        );
        request
            .environment
            .insert("SPAWN_LOG".to_string(), spawn_log.display().to_string());
        let result = executor.run(&request).await;

        assert_eq!(result.error_kind, Some(ErrorKind::ForbiddenConstruct));
        assert!(result.error.contains("os.RemoveAll"));
        assert_eq!(result.exit_code, NOT_RUN_EXIT_CODE);
        assert!(!spawn_log.exists());
        assert_eq!(residue(&scratch), 0);
    }

    #[tokio::test]
    async fn test_spawn_log_written_for_allowed_code() {
        let (executor, _scratch) = executor();
        let log_dir = tempfile::tempdir().unwrap();
        let spawn_log = log_dir.path().join("spawned");

        let mut request = ExecutionRequest::with_version(HELLO, "1.18");
        request
            .environment
            .insert("SPAWN_LOG".to_string(), spawn_log.display().to_string());
        let result = executor.run(&request).await;

        assert!(result.is_success(), "{}", result.error);
        assert_eq!(fs::read_to_string(&spawn_log).unwrap(), "spawned\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_and_cleans_up() {
        let (executor, scratch) = executor();
        let mut request = ExecutionRequest::with_version(
            "package main\nimport \"time\"\nfunc main() { time.Sleep(500 * time.Millisecond); fmt.Println(\"late\") }\n",
            "1.21",
        );
        request.timeout = Duration::from_millis(50);

        let started = Instant::now();
        let result = executor.run(&request).await;

        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
        assert!(result.error.contains("timed out"));
        assert!(result.output.is_empty());
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(residue(&scratch), 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let (executor, scratch) = executor();
        let request = ExecutionRequest::with_version(
            "package main\nfunc main() { fmt.Println(\"before\"); os.Exit(3) }\n",
            "1.22",
        );
        let result = executor.run(&request).await;

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.error, "exit status 3");
        assert_eq!(result.error_kind, Some(ErrorKind::NonZeroExit));
        assert_eq!(result.output, "before\npanic: boom\n");
        assert_eq!(residue(&scratch), 0);
    }

    #[tokio::test]
    async fn test_environment_overrides_and_raw_pairs() {
        let (executor, _scratch) = executor();
        let mut request = ExecutionRequest::with_version(
            "package main\nfunc main() { fmt.Print(os.Getenv(\"GREETING\")) }\n",
            "1.21",
        );
        request.environment = HashMap::from([("GREETING".to_string(), "hola".to_string())]);
        request.env_vars = Some(" GOEXPERIMENT=jsonv2 , ,BROKEN".to_string());
        let result = executor.run(&request).await;

        assert!(result.is_success(), "{}", result.error);
        assert_eq!(result.output, "GREETING=hola GOEXPERIMENT=jsonv2\n");
    }

    #[tokio::test]
    async fn test_child_runs_in_scratch_dir_not_hint() {
        let (executor, scratch) = executor();
        let request = ExecutionRequest {
            code: "package main\n// PRINT_CWD\nfunc main() {}\n".to_string(),
            path_hint: Some("/srv/tour/releases/v/1.22/01_for_range_integers.go".to_string()),
            ..Default::default()
        };
        let result = executor.run(&request).await;

        assert!(result.is_success(), "{}", result.error);
        assert_eq!(result.used_version, Some(v("1.22")));
        let cwd = PathBuf::from(result.output.trim());
        assert_eq!(
            cwd.canonicalize().unwrap(),
            scratch.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_auto_detect_records_detected_version() {
        let (executor, _scratch) = executor();
        let request = ExecutionRequest {
            code: format!("// Go 1.18 generics demo\n{HELLO}"),
            auto_detect: true,
            path_hint: Some("releases/v/1.22/02_loopvar.go".to_string()),
            ..Default::default()
        };
        let result = executor.run(&request).await;

        assert!(result.is_success(), "{}", result.error);
        assert_eq!(result.used_version, Some(v("1.22")));
        assert_eq!(result.detected_version, Some(v("1.18")));
    }

    #[tokio::test]
    async fn test_strict_rejects_unnormalized_version() {
        let (executor, _scratch) = executor();
        let result = executor.run(&ExecutionRequest::with_version(HELLO, "1.021")).await;

        assert_eq!(result.error_kind, Some(ErrorKind::VersionMismatch));
        assert_eq!(result.used_version, Some(v("1.21")));
        assert_eq!(result.exit_code, NOT_RUN_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_strict_with_blank_version_uses_path_hint() {
        let (executor, _scratch) = executor();
        for blank in ["", "  "] {
            let request = ExecutionRequest {
                path_hint: Some("releases/v/1.22/01_for_range_integers.go".to_string()),
                ..ExecutionRequest::with_version(HELLO, blank)
            };
            let result = executor.run(&request).await;

            assert!(result.is_success(), "{:?}: {}", blank, result.error);
            assert_eq!(result.used_version, Some(v("1.22")));
            assert_eq!(result.output, "Hello, World!\n");
        }
    }

    #[tokio::test]
    async fn test_toolchain_removed_after_discovery_is_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let go = dir.path().join("go");
        fs::copy(fake_toolchains().working("1.21.5"), &go).unwrap();

        let registry = Arc::new(Registry::new(vec![(v("1.21"), go.clone())]));
        registry.initialize();
        fs::remove_file(&go).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let executor = Executor::new(registry, scratch.path()).unwrap();
        let result = executor.run(&ExecutionRequest::with_version(HELLO, "1.21")).await;

        assert_eq!(result.error_kind, Some(ErrorKind::SpawnFailure));
        assert_eq!(result.exit_code, NOT_RUN_EXIT_CODE);
        assert!(result.output.is_empty());
        assert_eq!(residue(&scratch), 0);
    }

    #[tokio::test]
    async fn test_feature_mismatch() {
        let (executor, _scratch) = executor();
        let request = ExecutionRequest::with_version(
            "package main\nfunc main() { for i := range 10 { _ = i } }\n",
            "1.21",
        );
        let result = executor.run(&request).await;

        assert_eq!(result.error_kind, Some(ErrorKind::VersionFeatureMismatch));
        assert!(result.error.contains("1.22"));
    }

    #[tokio::test]
    async fn test_registry_failures() {
        let (executor, _scratch) = executor();

        let result = executor.run(&ExecutionRequest::with_version(HELLO, "1.20")).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Unavailable));

        let result = executor.run(&ExecutionRequest::with_version(HELLO, "1.99")).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotSupported));
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_indeterminate_version() {
        let (executor, scratch) = executor();
        let result = executor.run(&ExecutionRequest::with_auto_detect(HELLO)).await;

        assert_eq!(result.error_kind, Some(ErrorKind::VersionIndeterminate));
        assert_eq!(result.used_version, None);
        assert!(!result.error.is_empty());
        assert_eq!(residue(&scratch), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let (executor, scratch) = executor();
        let executor = Arc::new(executor);
        let code = "package main\n// PRINT_SCRATCH_PATH\nfunc main() {}\n";

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let executor = Arc::clone(&executor);
                tokio::spawn(async move {
                    executor.run(&ExecutionRequest::with_version(code, "1.22")).await
                })
            })
            .collect();

        let mut paths = std::collections::HashSet::new();
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.is_success(), "{}", result.error);
            paths.insert(result.output.trim().to_string());
        }
        assert_eq!(paths.len(), 8);
        assert_eq!(residue(&scratch), 0);
    }

    #[test]
    fn test_unusable_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "").unwrap();

        let registry = Arc::new(Registry::new(Vec::new()));
        let err = Executor::new(registry, &file).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_supported_versions_newest_first() {
        let (executor, _scratch) = executor();
        assert_eq!(
            executor.supported_versions(),
            vec![v("1.22"), v("1.21"), v("1.18")]
        );
        let info = executor.version_info();
        assert_eq!(info.registry.total_versions, 4);
        assert_eq!(info.default_timeout_ms, 30_000);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["supported_versions"][0], "1.22");
        assert_eq!(json["registry"]["available_versions"], 3);
    }

    #[tokio::test]
    #[ignore] // Requires Go toolchains under /opt/go1.x
    async fn test_real_toolchains() {
        let config = ToolchainConfigManager::builtin();
        let registry = Arc::new(Registry::from_config(&config));
        let executor = Executor::from_config(&config, registry).unwrap();

        for version in executor.supported_versions() {
            let result = executor
                .run(&ExecutionRequest::with_version(HELLO, &version.to_string()))
                .await;
            assert!(result.is_success(), "Go {}: {}", version, result.error);
            assert_eq!(result.output, "Hello, World!\n");
        }
    }
}
