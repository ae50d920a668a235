//! Image construction and publication through the local image-build tool.
//!
//! Both stages write the same destination tag. Stage B names that tag as
//! its base, so it must only start once Stage A has returned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{describe, PipelineError, Result, Stage};
use crate::process::{self, Cmd};
use crate::registry::{RegistryEndpoint, RegistryToken};
use crate::request::BuildRequest;

/// Build-arg carrying the parameterized base image in both build definitions.
pub const BASE_IMAGE_ARG: &str = "BASE_IMAGE";
pub const REQUIREMENTS_ARG: &str = "REQUIREMENTS";
pub const PLATFORM_REQUIREMENTS_ARG: &str = "PLATFORM_REQUIREMENTS";

/// What the build tool reads as its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildContext {
    /// A tar archive streamed on stdin; it carries its own build definition.
    Archive(PathBuf),
    /// A directory on disk.
    Directory(PathBuf),
}

/// One image build invocation.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub stage: Stage,
    pub tag: String,
    pub context: BuildContext,
    pub dockerfile: Option<PathBuf>,
    pub build_args: Vec<(String, String)>,
}

impl BuildSpec {
    /// Stage A: the payload archive on top of the caller's source image.
    pub fn stage_a(request: &BuildRequest, artifact: &Path) -> Self {
        Self {
            stage: Stage::BuildBase,
            tag: request.destination_image.clone(),
            context: BuildContext::Archive(artifact.to_path_buf()),
            dockerfile: None,
            build_args: vec![(BASE_IMAGE_ARG.to_string(), request.source_image.clone())],
        }
    }

    /// Stage B: requirements layered onto the Stage A image, re-tagged in place.
    pub fn stage_b(request: &BuildRequest, config: &Config) -> Self {
        let platform = config.platform_requirements_in_context();
        Self {
            stage: Stage::BuildFinal,
            tag: request.destination_image.clone(),
            context: BuildContext::Directory(config.build_context.clone()),
            dockerfile: Some(config.dockerfile.clone()),
            build_args: vec![
                (
                    BASE_IMAGE_ARG.to_string(),
                    request.destination_image.clone(),
                ),
                (REQUIREMENTS_ARG.to_string(), request.requirements.clone()),
                (
                    PLATFORM_REQUIREMENTS_ARG.to_string(),
                    platform.to_string_lossy().into_owned(),
                ),
            ],
        }
    }

    /// Value of a build-arg, if set.
    pub fn build_arg(&self, name: &str) -> Option<&str> {
        self.build_args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Arguments for `docker build`, in order.
    pub fn docker_args(&self) -> Vec<String> {
        let mut args = vec!["build".to_string(), "-t".to_string(), self.tag.clone()];
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(dockerfile) = &self.dockerfile {
            args.push("-f".to_string());
            args.push(dockerfile.to_string_lossy().into_owned());
        }
        match &self.context {
            BuildContext::Archive(_) => args.push("-".to_string()),
            BuildContext::Directory(dir) => args.push(dir.to_string_lossy().into_owned()),
        }
        args
    }
}

/// Local image-build daemon interface.
#[async_trait]
pub trait ImageTool: Send + Sync {
    async fn build(&self, spec: &BuildSpec) -> Result<()>;
    async fn login(&self, registry: &RegistryEndpoint, token: &RegistryToken) -> Result<()>;
    async fn push(&self, tag: &str) -> Result<()>;
}

/// [`ImageTool`] backed by the docker CLI (or anything argument-compatible).
pub struct DockerCli {
    docker: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(docker: &str, timeout: Duration) -> Self {
        Self {
            docker: docker.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.docker, config.stage_timeout)
    }
}

fn timeout_or(
    stage: Stage,
    err: anyhow::Error,
    other: impl FnOnce(String) -> PipelineError,
) -> PipelineError {
    match process::timed_out(&err) {
        Some(t) => PipelineError::Timeout {
            stage,
            after: t.after,
        },
        None => other(describe(&err)),
    }
}

#[async_trait]
impl ImageTool for DockerCli {
    async fn build(&self, spec: &BuildSpec) -> Result<()> {
        let mut cmd = Cmd::new(&self.docker)
            .args(spec.docker_args())
            .timeout(self.timeout)
            .error_msg(format!("{} build", self.docker));
        if let BuildContext::Archive(archive) = &spec.context {
            cmd = cmd.stdin_file(archive);
        }

        tracing::info!(stage = %spec.stage, command = %cmd.display(), "building image");
        cmd.run_interactive().await.map_err(|e| {
            timeout_or(spec.stage, e, |message| PipelineError::Build {
                stage: spec.stage,
                tag: spec.tag.clone(),
                message,
            })
        })?;
        Ok(())
    }

    async fn login(&self, registry: &RegistryEndpoint, token: &RegistryToken) -> Result<()> {
        tracing::info!(%registry, username = %token.username, "logging in");
        Cmd::new(&self.docker)
            .args(["login", "--username", token.username.as_str(), "--password-stdin"])
            .arg(registry.host())
            .stdin_bytes(token.secret())
            .timeout(self.timeout)
            .error_msg(format!("{} login", self.docker))
            .run()
            .await
            .map_err(|e| {
                timeout_or(Stage::Login, e, |message| PipelineError::Auth {
                    registry: registry.to_string(),
                    message,
                })
            })?;
        Ok(())
    }

    async fn push(&self, tag: &str) -> Result<()> {
        tracing::info!(tag, "pushing image");
        Cmd::new(&self.docker)
            .args(["push", tag])
            .timeout(self.timeout)
            .error_msg(format!("{} push", self.docker))
            .run_interactive()
            .await
            .map_err(|e| {
                timeout_or(Stage::Push, e, |message| PipelineError::Push {
                    tag: tag.to_string(),
                    message,
                })
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request() -> BuildRequest {
        BuildRequest::new(
            "base:1.0",
            "myapp:2.0",
            "reqs.txt",
            "123.dkr.ecr.us-west-2.amazonaws.com",
        )
        .unwrap()
    }

    #[test]
    fn test_stage_a_args() {
        let spec = BuildSpec::stage_a(&request(), Path::new("/work/payload.tar.gz"));
        assert_eq!(
            spec.docker_args(),
            vec!["build", "-t", "myapp:2.0", "--build-arg", "BASE_IMAGE=base:1.0", "-"]
        );
        assert_eq!(
            spec.context,
            BuildContext::Archive(PathBuf::from("/work/payload.tar.gz"))
        );
    }

    #[test]
    fn test_stage_b_builds_on_stage_a_tag() {
        let config = Config::from_vars(Path::new("/repo"), &HashMap::new()).unwrap();
        let spec = BuildSpec::stage_b(&request(), &config);

        assert_eq!(spec.tag, "myapp:2.0");
        assert_eq!(spec.build_arg(BASE_IMAGE_ARG), Some("myapp:2.0"));
        assert_eq!(spec.build_arg(REQUIREMENTS_ARG), Some("reqs.txt"));
        assert_eq!(
            spec.build_arg(PLATFORM_REQUIREMENTS_ARG),
            Some("platform-requirements.txt")
        );

        let args = spec.docker_args();
        assert_eq!(args.last().map(String::as_str), Some("/repo/image"));
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "/repo/image/Dockerfile");
    }

    #[tokio::test]
    async fn test_failed_build_is_build_error() {
        let tool = DockerCli::new("false", Duration::from_secs(5));
        let config = Config::from_vars(Path::new("/repo"), &HashMap::new()).unwrap();
        let err = tool
            .build(&BuildSpec::stage_b(&request(), &config))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Build {
                stage: Stage::BuildFinal,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_push_is_push_error() {
        let tool = DockerCli::new("false", Duration::from_secs(5));
        let err = tool.push("myapp:2.0").await.unwrap_err();
        assert!(matches!(err, PipelineError::Push { .. }));
    }

    #[tokio::test]
    async fn test_login_passes_token_on_stdin() {
        use std::os::unix::fs::PermissionsExt;

        // Fake tool that exits non-zero unless the token arrives on stdin.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-docker");
        std::fs::write(
            &script,
            "#!/bin/sh\nread secret\n[ \"$secret\" = hunter2 ] || exit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = DockerCli::new(&script.to_string_lossy(), Duration::from_secs(5));
        let registry = RegistryEndpoint::parse("registry.local").unwrap();
        tool.login(&registry, &RegistryToken::new("AWS", "hunter2"))
            .await
            .unwrap();

        let err = tool
            .login(&registry, &RegistryToken::new("AWS", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Auth { .. }));
        assert!(!err.to_string().contains("wrong"));
    }
}
