mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tour-cli")]
#[command(about = "Go tour runner - execute lessons against installed Go toolchains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Go source file
    Run {
        /// Source file; a releases/v/<x.y>/ path also selects the version
        file: PathBuf,

        /// Go version to use (e.g. 1.22)
        #[arg(short, long)]
        version: Option<String>,

        /// Detect the version from comments in the source
        #[arg(short, long, default_value = "false")]
        auto_detect: bool,

        /// Fail if the resolved version differs from --version
        #[arg(long, default_value = "false")]
        strict: bool,

        /// Timeout in milliseconds (0 uses the configured default)
        #[arg(short, long, default_value = "0")]
        timeout_ms: u64,

        /// Extra environment variable, KEY=VALUE (repeatable)
        #[arg(short, long = "env")]
        env: Vec<String>,
    },

    /// List configured Go toolchains
    Versions {
        /// Print the registry status as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run every lesson under a releases directory with its version
    Check {
        /// Releases directory containing v/<x.y>/*.go
        #[arg(short, long, default_value = "releases")]
        releases: PathBuf,

        /// Print output of each run
        #[arg(long, default_value = "false")]
        verbose: bool,

        /// Also write integration_test_results.txt and integration_test_errors.txt here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            file,
            version,
            auto_detect,
            strict,
            timeout_ms,
            env,
        } => {
            commands::run_file(&file, version, auto_detect, strict, timeout_ms, &env).await?
        }
        Commands::Versions { json } => {
            commands::list_versions(json)?;
            0
        }
        Commands::Check {
            releases,
            verbose,
            output,
        } => commands::check_releases(&releases, verbose, output.as_deref()).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
