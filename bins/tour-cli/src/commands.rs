// CLI commands for running Go code and checking lesson trees
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tour_common::config::ToolchainConfigManager;
use tour_engine::detector;
use tour_engine::{ExecutionRequest, Executor, Registry, VersionToken};

const HELLO_WORLD: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"Hello, World!\")\n}\n";

/// Load config, discover toolchains off the async workers, build the executor
async fn build_executor() -> Result<Executor> {
    let config = ToolchainConfigManager::load_default().context("Failed to load toolchain config")?;
    let registry = Arc::new(Registry::from_config(&config));
    let probe = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || probe.initialize())
        .await
        .context("Toolchain discovery panicked")?;
    Executor::from_config(&config, registry).context("Failed to prepare executor")
}

fn parse_env_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("Invalid --env '{}': expected KEY=VALUE", pair),
        })
        .collect()
}

/// Run a single file and return the process exit code to use
pub async fn run_file(
    file: &Path,
    version: Option<String>,
    auto_detect: bool,
    strict: bool,
    timeout_ms: u64,
    env: &[String],
) -> Result<i32> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let request = ExecutionRequest {
        code,
        version,
        auto_detect,
        timeout: Duration::from_millis(timeout_ms),
        environment: parse_env_pairs(env)?,
        env_vars: None,
        path_hint: Some(file.display().to_string()),
        strict_version: strict,
    };

    let executor = build_executor().await?;
    let result = executor.run(&request).await;

    print!("{}", result.output);
    if !result.is_success() {
        eprintln!("✗ {}", result.error);
    }
    if let Some(version) = result.used_version {
        eprintln!(
            "  Go {} ({}) in {}ms",
            version,
            if result.go_version.is_empty() { "?" } else { result.go_version.as_str() },
            result.elapsed.as_millis()
        );
    }

    Ok(match result.exit_code {
        0 if result.is_success() => 0,
        code if code > 0 => code,
        _ => 1,
    })
}

/// Print the configured toolchains
pub fn list_versions(json: bool) -> Result<()> {
    let config = ToolchainConfigManager::load_default().context("Failed to load toolchain config")?;
    let registry = Registry::from_config(&config);
    let status = registry.status();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to serialize status")?
        );
        return Ok(());
    }

    println!("{:<8} {:<10} {:<12} PATH", "VERSION", "FULL", "STATUS");
    for entry in status.versions.iter().rev() {
        println!(
            "{:<8} {:<10} {:<12} {}",
            entry.version.to_string(),
            if entry.full_version.is_empty() { "-" } else { entry.full_version.as_str() },
            if entry.available { "available" } else { "unavailable" },
            entry.path.display()
        );
    }
    println!();
    println!(
        "{} of {} toolchains available",
        status.available_versions, status.total_versions
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    fn label(&self) -> &'static str {
        match self {
            TestStatus::Pass => "[PASS]",
            TestStatus::Fail => "[FAIL]",
            TestStatus::Skip => "[SKIP]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub version: VersionToken,
    pub status: TestStatus,
    pub error: String,
    pub output: String,
}

#[derive(Debug, Default)]
pub struct TestResults {
    results: Vec<TestResult>,
}

impl TestResults {
    pub fn add(&mut self, result: TestResult) {
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(TestStatus::Fail) > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.status == TestStatus::Fail)
    }

    /// Results grouped by version, newest first; insertion order within a group
    pub fn group_by_version(&self) -> Vec<(VersionToken, Vec<&TestResult>)> {
        let mut groups: BTreeMap<VersionToken, Vec<&TestResult>> = BTreeMap::new();
        for result in &self.results {
            groups.entry(result.version).or_default().push(result);
        }
        groups.into_iter().rev().collect()
    }

    pub fn report(&self, verbose: bool) -> String {
        let mut out = String::new();
        for (version, results) in self.group_by_version() {
            let _ = writeln!(out, "=== Go {} ({} tests) ===", version, results.len());
            for result in results {
                let _ = writeln!(out, "  {} ... {}", result.name, result.status.label());
                if result.status == TestStatus::Fail || verbose {
                    if !result.error.is_empty() {
                        let _ = writeln!(out, "    error: {}", result.error);
                    }
                    if verbose && !result.output.is_empty() {
                        let _ = writeln!(out, "    output: {}", preview(&result.output, 100));
                    }
                }
            }
            out.push('\n');
        }
        out.push_str(&self.summary());
        out
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("=== Summary ===\n");
        let _ = writeln!(out, "Total:   {}", self.total());
        let _ = writeln!(out, "Passed:  {}", self.count(TestStatus::Pass));
        let _ = writeln!(out, "Failed:  {}", self.count(TestStatus::Fail));
        let _ = writeln!(out, "Skipped: {}", self.count(TestStatus::Skip));
        if self.total() > 0 {
            let rate = self.count(TestStatus::Pass) as f64 * 100.0 / self.total() as f64;
            let _ = writeln!(out, "Success rate: {:.1}%", rate);
        }
        out
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.trim().replace('\n', " | ");
    if flat.chars().count() > max_chars {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}

/// `<releases>/v/<x.y>/*.go`, newest version first, files sorted by name
pub fn discover_lessons(releases: &Path) -> Result<Vec<(VersionToken, Vec<PathBuf>)>> {
    let versions = detector::versions_in_releases(releases)
        .with_context(|| format!("Failed to scan {}", releases.display()))?;

    let mut lessons = Vec::with_capacity(versions.len());
    for version in versions {
        let dir = releases.join("v").join(version.to_string());
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "go"))
            .collect();
        files.sort();
        lessons.push((version, files));
    }
    Ok(lessons)
}

async fn run_case(executor: &Executor, name: String, version: VersionToken, request: ExecutionRequest) -> TestResult {
    let result = executor.run(&request).await;
    TestResult {
        name,
        version,
        status: if result.is_success() { TestStatus::Pass } else { TestStatus::Fail },
        error: result.error,
        output: result.output,
    }
}

/// Run hello-world plus every lesson for each version; returns the exit code
pub async fn check_releases(releases: &Path, verbose: bool, output_dir: Option<&Path>) -> Result<i32> {
    let lessons = discover_lessons(releases)?;
    if lessons.is_empty() {
        bail!("No version directories found under {}", releases.join("v").display());
    }

    let executor = build_executor().await?;
    let available = executor.supported_versions();

    println!("→ Checking {} versions under {}", lessons.len(), releases.display());

    let mut results = TestResults::default();
    for (version, files) in lessons {
        if !available.contains(&version) {
            println!("  ⚠ Go {} not installed, skipping {} lessons", version, files.len());
            for file in files {
                results.add(TestResult {
                    name: lesson_name(&file),
                    version,
                    status: TestStatus::Skip,
                    error: format!("Go {} not installed", version),
                    output: String::new(),
                });
            }
            continue;
        }

        println!("  Go {}: hello world + {} lessons", version, files.len());

        let hello = ExecutionRequest::with_version(HELLO_WORLD, version.to_string());
        results.add(run_case(&executor, "hello_world".to_string(), version, hello).await);

        for file in files {
            let code = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let request = ExecutionRequest {
                path_hint: Some(file.display().to_string()),
                ..ExecutionRequest::with_version(code, version.to_string())
            };
            results.add(run_case(&executor, lesson_name(&file), version, request).await);
        }
    }

    println!();
    print!("{}", results.report(verbose));

    if let Some(dir) = output_dir {
        let (report, errors) = write_reports(&results, dir)?;
        println!();
        println!("Results: {}", report.display());
        println!("Errors:  {}", errors.display());
    }

    if results.has_failures() {
        println!();
        println!("✗ Failed:");
        for failure in results.failures() {
            println!("  {} (Go {})", failure.name, failure.version);
        }
        return Ok(1);
    }

    println!("✓ All lessons passed");
    Ok(0)
}

pub const RESULTS_FILE: &str = "integration_test_results.txt";
pub const ERRORS_FILE: &str = "integration_test_errors.txt";

/// Write the full report and the failure list into `dir`. The errors file is
/// written even when empty so stale failures never linger.
pub fn write_reports(results: &TestResults, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let report_path = dir.join(RESULTS_FILE);
    fs::write(&report_path, results.report(true))
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    let mut errors = String::new();
    for failure in results.failures() {
        let _ = writeln!(errors, "[FAIL]");
        let _ = writeln!(errors, "test: {} (Go {})", failure.name, failure.version);
        if !failure.error.is_empty() {
            let _ = writeln!(errors, "error: {}", failure.error);
        }
        if !failure.output.is_empty() {
            let _ = writeln!(errors, "output: {}", failure.output.trim_end());
        }
        errors.push_str("---\n");
    }

    let errors_path = dir.join(ERRORS_FILE);
    fs::write(&errors_path, errors)
        .with_context(|| format!("Failed to write {}", errors_path.display()))?;

    Ok((report_path, errors_path))
}

fn lesson_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
