//! Build command - runs the whole pipeline.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::fetch::S3Cli;
use crate::image::DockerCli;
use crate::pipeline::{Pipeline, PipelineReport, RunOptions};
use crate::registry::EcrTokenIssuer;
use crate::request::BuildRequest;

/// Arguments of the build command, positional ones first.
pub struct BuildArgs {
    pub source_image: String,
    pub destination_image: String,
    pub requirements: String,
    pub registry: String,
    pub no_push: bool,
    pub keep_artifact: bool,
    /// Write the run report here as JSON.
    pub report: Option<PathBuf>,
}

/// Execute the build command.
pub async fn cmd_build(config: &Config, args: BuildArgs) -> Result<()> {
    let request = BuildRequest::new(
        &args.source_image,
        &args.destination_image,
        &args.requirements,
        &args.registry,
    )?;
    let options = RunOptions {
        push: !args.no_push,
        keep_artifact: args.keep_artifact,
    };

    let store = S3Cli::from_config(config);
    let tokens = EcrTokenIssuer::from_config(config);
    let images = DockerCli::from_config(config);
    let report = Pipeline::new(config, &store, &tokens, &images)
        .run(&request, options)
        .await?;

    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }
    print_summary(&report);
    Ok(())
}

fn write_report(report: &PipelineReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    crate::common::write_file_with_dirs(path, json + "\n")
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

fn print_summary(report: &PipelineReport) {
    println!();
    println!("=== Build Complete ===");
    println!("  Image:   {}", report.image);
    println!("  Payload: {} (sha256 {})", report.artifact, report.sha256);
    if let Some(path) = &report.artifact_path {
        println!("  Kept at: {}", path.display());
    }
    if report.pushed {
        println!("  Pushed:  {}", report.request.registry);
    } else {
        println!("  Pushed:  no (--no-push)");
    }
    let total: f64 = report.stages.iter().map(|s| s.seconds).sum();
    println!("  Total:   {:.1}s", total);
}
