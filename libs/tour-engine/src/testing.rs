// Fake Go toolchains for tests.
//
// Each fake is a small shell script that answers `go version` and imitates
// `go run <file>` well enough to drive the executor: it echoes the argument
// of `fmt.Println("...")`, sleeps when the source mentions `time.Sleep`, and
// exits 3 when it sees `os.Exit(3)`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

const WORKING_VERSIONS: &[&str] = &["1.18.10", "1.21.5", "1.22.3", "1.24.2"];

const RUN_SCRIPT: &str = r#"  run)
    src="$2"
    if [ -n "$SPAWN_LOG" ]; then echo spawned >> "$SPAWN_LOG"; fi
    if grep -q 'time.Sleep' "$src"; then sleep 1; fi
    if grep -q 'PRINT_SCRATCH_PATH' "$src"; then echo "$src"; fi
    if grep -q 'PRINT_CWD' "$src"; then pwd; fi
    if grep -q 'os.Getenv' "$src"; then echo "GREETING=$GREETING GOEXPERIMENT=$GOEXPERIMENT"; fi
    sed -n 's/.*fmt\.Println("\(.*\)").*/\1/p' "$src"
    if grep -q 'os.Exit(3)' "$src"; then echo "panic: boom" >&2; exit 3; fi
    ;;
"#;

pub(crate) struct FakeToolchains {
    dir: TempDir,
}

impl FakeToolchains {
    /// A toolchain that reports `go<full_version>`
    pub(crate) fn working(&self, full_version: &str) -> PathBuf {
        assert!(
            WORKING_VERSIONS.contains(&full_version),
            "no fake toolchain for {full_version}"
        );
        self.dir.path().join(format!("go{full_version}")).join("go")
    }

    /// Exists but exits 1 on every command
    pub(crate) fn broken(&self) -> PathBuf {
        self.dir.path().join("broken").join("go")
    }

    /// Runs, but its version banner has no parseable version
    pub(crate) fn devel(&self) -> PathBuf {
        self.dir.path().join("devel").join("go")
    }

    pub(crate) fn missing(&self) -> PathBuf {
        self.dir.path().join("missing").join("go")
    }
}

fn write_script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn toolchain_script(banner: &str) -> String {
    format!(
        "#!/bin/sh\ncase \"$1\" in\n  version)\n    echo \"{banner}\"\n    ;;\n{RUN_SCRIPT}  *)\n    echo \"unknown command $1\" >&2\n    exit 2\n    ;;\nesac\n"
    )
}

/// Shared fixture, written once per test binary so no test execs a script
/// another thread is still writing.
pub(crate) fn fake_toolchains() -> &'static FakeToolchains {
    static FAKES: OnceLock<FakeToolchains> = OnceLock::new();
    FAKES.get_or_init(|| {
        let fakes = FakeToolchains {
            dir: tempfile::tempdir().unwrap(),
        };
        for full in WORKING_VERSIONS {
            let banner = format!("go version go{full} linux/amd64");
            write_script(&fakes.working(full), &toolchain_script(&banner));
        }
        write_script(&fakes.broken(), "#!/bin/sh\necho 'exec format error' >&2\nexit 1\n");
        write_script(&fakes.devel(), &toolchain_script("go version devel linux/amd64"));
        fakes
    })
}
