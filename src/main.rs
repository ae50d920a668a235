//! Layerbuild - builds the runtime image from the pinned payload and pushes it.
//!
//! Pipeline: fetch payload -> verify SHA-256 -> build (stage A) ->
//! build (stage B) -> registry login -> push.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use layerbuild::commands;
use layerbuild::config::Config;

#[derive(Parser)]
#[command(name = "layerbuild")]
#[command(about = "Layer the runtime payload into a container image and push it")]
#[command(
    after_help = "QUICK START:\n  layerbuild preflight                              Check host tools\n  layerbuild build SRC DEST REQUIREMENTS REGISTRY   Build and push\n  layerbuild show config                            Show configuration"
)]
struct Cli {
    /// Repository root holding image/Dockerfile and .env
    #[arg(long, global = true, default_value = env!("CARGO_MANIFEST_DIR"))]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, verify, build both stages and push
    Build {
        /// Base image for the first build stage
        source_image: String,
        /// Image tag written by both stages and pushed
        destination_image: String,
        /// pip requirements file layered in the second stage
        requirements: String,
        /// Registry host to log in and push to
        registry: String,

        /// Stop after the second build; skip login and push
        #[arg(long)]
        no_push: bool,
        /// Keep the downloaded payload in the work directory
        #[arg(long)]
        keep_artifact: bool,
        /// Write a JSON report of the run to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Fetch and verify the payload only
    Fetch,

    /// Check a local file against the pinned payload digest
    Verify {
        file: PathBuf,
    },

    /// Run preflight checks (host tools, daemon, repository files)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Remove the work directory
    Clean,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.base_dir)?;

    match cli.command {
        Commands::Build {
            source_image,
            destination_image,
            requirements,
            registry,
            no_push,
            keep_artifact,
            report,
        } => {
            let args = commands::build::BuildArgs {
                source_image,
                destination_image,
                requirements,
                registry,
                no_push,
                keep_artifact,
                report,
            };
            commands::cmd_build(&config, args).await?;
        }

        Commands::Fetch => {
            commands::cmd_fetch(&config).await?;
        }

        Commands::Verify { file } => {
            commands::cmd_verify(&config, &file)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict).await?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config { json: false } => commands::show::ShowTarget::Config,
                ShowTarget::Config { json: true } => commands::show::ShowTarget::ConfigJson,
            };
            commands::cmd_show(&config, show_target)?;
        }

        Commands::Clean => {
            commands::cmd_clean(&config)?;
        }
    }

    Ok(())
}
