//! The build pipeline: fetch, verify, build twice, authenticate, push.
//!
//! Stages run strictly in order and the first error ends the run. Nothing
//! is retried and nothing is rolled back; a failed build leaves whatever
//! the image tool left in its local store.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::checksum;
use crate::config::Config;
use crate::error::{PipelineError, Result, Stage};
use crate::fetch::{self, ObjectLocation, ObjectStore};
use crate::image::{BuildSpec, ImageTool};
use crate::registry::TokenIssuer;
use crate::request::BuildRequest;
use crate::timing::{StageTiming, Timer};

/// Knobs that change how far a run goes, not what it builds.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Authenticate and push after Stage B.
    pub push: bool,
    /// Leave the downloaded payload on disk afterwards.
    pub keep_artifact: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            push: true,
            keep_artifact: false,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub request: BuildRequest,
    pub artifact: ObjectLocation,
    pub sha256: String,
    /// Set when the payload was kept on disk.
    pub artifact_path: Option<PathBuf>,
    pub image: String,
    pub pushed: bool,
    pub stages: Vec<StageTiming>,
}

/// A fetched payload that passed the integrity gate.
#[derive(Debug)]
pub struct StagedArtifact {
    pub path: PathBuf,
    pub sha256: String,
    pub stages: Vec<StageTiming>,
}

/// The pipeline wired to its three collaborators.
pub struct Pipeline<'a> {
    config: &'a Config,
    store: &'a dyn ObjectStore,
    tokens: &'a dyn TokenIssuer,
    images: &'a dyn ImageTool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn ObjectStore,
        tokens: &'a dyn TokenIssuer,
        images: &'a dyn ImageTool,
    ) -> Self {
        Self {
            config,
            store,
            tokens,
            images,
        }
    }

    /// Run every stage under the configured overall deadline.
    pub async fn run(
        &self,
        request: &BuildRequest,
        options: RunOptions,
    ) -> Result<PipelineReport> {
        let deadline = self.config.deadline;
        match tokio::time::timeout(deadline, self.run_stages(request, options)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                if !options.keep_artifact {
                    fetch::discard_artifact(&self.config.artifact_path());
                }
                Err(PipelineError::Deadline(deadline))
            }
        }
    }

    /// Fetch the pinned payload and verify it.
    async fn stage_artifact(&self) -> Result<StagedArtifact> {
        let mut stages = Vec::new();

        let timer = Timer::start(Stage::Fetch);
        let artifact = fetch::fetch_artifact(self.store, self.config).await?;
        stages.push(timer.finish());

        // Hard gate: nothing below runs on a payload that fails this.
        let timer = Timer::start(Stage::Verify);
        let sha256 = checksum::verify_sha256(&artifact, &self.config.artifact.sha256)?;
        stages.push(timer.finish());

        Ok(StagedArtifact {
            path: artifact,
            sha256,
            stages,
        })
    }

    /// Stage B copies the requirements file out of its build context; a
    /// reference that is not there fails before anything is fetched.
    fn check_requirements(&self, request: &BuildRequest) -> Result<()> {
        let path = self.config.build_context.join(&request.requirements);
        if !path.is_file() {
            return Err(PipelineError::Request(format!(
                "requirements file {} not found in build context {}",
                path.display(),
                self.config.build_context.display()
            )));
        }
        Ok(())
    }

    async fn run_stages(
        &self,
        request: &BuildRequest,
        options: RunOptions,
    ) -> Result<PipelineReport> {
        tracing::info!(
            source = %request.source_image,
            destination = %request.destination_image,
            registry = %request.registry,
            "starting pipeline"
        );

        self.check_requirements(request)?;

        let StagedArtifact {
            path: artifact,
            sha256,
            mut stages,
        } = self.stage_artifact().await?;

        let outcome = self
            .build_and_publish(request, &artifact, options, &mut stages)
            .await;
        if !options.keep_artifact {
            fetch::discard_artifact(&artifact);
        }
        outcome?;

        Ok(PipelineReport {
            request: request.clone(),
            artifact: self.config.artifact.location(),
            sha256,
            artifact_path: options.keep_artifact.then_some(artifact),
            image: request.destination_image.clone(),
            pushed: options.push,
            stages,
        })
    }

    async fn build_and_publish(
        &self,
        request: &BuildRequest,
        artifact: &Path,
        options: RunOptions,
        stages: &mut Vec<StageTiming>,
    ) -> Result<()> {
        let timer = Timer::start(Stage::BuildBase);
        self.images
            .build(&BuildSpec::stage_a(request, artifact))
            .await?;
        stages.push(timer.finish());

        let timer = Timer::start(Stage::BuildFinal);
        self.images
            .build(&BuildSpec::stage_b(request, self.config))
            .await?;
        stages.push(timer.finish());

        if !options.push {
            tracing::info!(image = %request.destination_image, "push skipped");
            return Ok(());
        }

        let timer = Timer::start(Stage::Auth);
        let token = self.tokens.issue(&request.registry).await?;
        stages.push(timer.finish());

        let timer = Timer::start(Stage::Login);
        self.images.login(&request.registry, &token).await?;
        stages.push(timer.finish());

        let timer = Timer::start(Stage::Push);
        self.images.push(&request.destination_image).await?;
        stages.push(timer.finish());

        tracing::info!(image = %request.destination_image, "pushed");
        Ok(())
    }
}
