//! Configuration management for layerbuild.
//!
//! The payload location and digest are pinned at compile time. Everything
//! else (tool binaries, work directory, timeouts) is read from a `.env`
//! file in the base directory and from the environment. Environment
//! variables take precedence over the `.env` file.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::fetch::ObjectLocation;

/// Bucket holding the runtime build payload.
pub const ARTIFACT_BUCKET: &str = "runtime-build-payloads";
/// Object key of the dated payload archive.
pub const ARTIFACT_KEY: &str = "payloads/runtime-payload-2021-06-14.tar.gz";
/// SHA-256 of the object at [`ARTIFACT_KEY`].
pub const ARTIFACT_SHA256: &str =
    "5d1e3c9a07f2b84e6a1c0d93f4b7e28a91c6d05e3f8a2b74c19e60d5a8f3b217";

/// Stage B build context, relative to the base directory.
pub const BUILD_CONTEXT_DIR: &str = "image";
/// Stage B build definition, relative to the base directory.
pub const DOCKERFILE: &str = "image/Dockerfile";
/// Platform package list layered in Stage B, relative to the base directory.
pub const PLATFORM_REQUIREMENTS: &str = "image/platform-requirements.txt";

/// Scratch file the preflight check writes to test the work directory.
pub const WRITE_CHECK_FILE: &str = ".preflight-test";

const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 60 * 60;
const DEFAULT_DEADLINE_SECS: u64 = 3 * 60 * 60;

/// The payload this tool builds from.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSpec {
    pub bucket: String,
    pub key: String,
    /// Expected SHA-256, lowercase hex.
    pub sha256: String,
}

impl ArtifactSpec {
    /// The pinned payload.
    pub fn pinned() -> Self {
        Self {
            bucket: ARTIFACT_BUCKET.to_string(),
            key: ARTIFACT_KEY.to_string(),
            sha256: ARTIFACT_SHA256.to_string(),
        }
    }

    pub fn location(&self) -> ObjectLocation {
        ObjectLocation::new(&self.bucket, &self.key)
    }

    /// Local file name for the downloaded payload (last key segment).
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Layerbuild configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Repository root holding the Stage B build context
    pub base_dir: PathBuf,
    /// Payload to fetch and verify
    pub artifact: ArtifactSpec,
    /// Where the payload is downloaded to (default: <base_dir>/downloads)
    pub work_dir: PathBuf,
    /// Stage B build context directory
    pub build_context: PathBuf,
    /// Stage B Dockerfile
    pub dockerfile: PathBuf,
    /// Platform requirements file passed to Stage B
    pub platform_requirements: PathBuf,
    /// Image build tool binary (default: docker)
    pub docker: String,
    /// AWS CLI binary (default: aws)
    pub aws: String,
    /// Fallback region when the registry host does not name one
    pub aws_region: Option<String>,
    /// Limit for any single external command
    #[serde(serialize_with = "as_secs")]
    pub stage_timeout: Duration,
    /// Limit for the whole pipeline run
    #[serde(serialize_with = "as_secs")]
    pub deadline: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            let entries = dotenvy::from_path_iter(&env_path).map_err(|e| {
                PipelineError::Config(format!("cannot read {}: {}", env_path.display(), e))
            })?;
            for entry in entries {
                let (key, value) = entry.map_err(|e| {
                    PipelineError::Config(format!("bad line in {}: {}", env_path.display(), e))
                })?;
                env_vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            env_vars.insert(key, value);
        }

        Self::from_vars(base_dir, &env_vars)
    }

    /// Build a configuration from an explicit variable map.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let non_empty = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let work_dir = non_empty("LAYERBUILD_WORK_DIR")
            .map(|s| {
                let path = PathBuf::from(s);
                if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                }
            })
            .map(|path| normalize(&path))
            .unwrap_or_else(|| base_dir.join("downloads"));
        if normalize(base_dir).starts_with(&work_dir) {
            return Err(PipelineError::Config(format!(
                "LAYERBUILD_WORK_DIR {} would contain the repository at {}",
                work_dir.display(),
                base_dir.display()
            )));
        }

        let stage_timeout = seconds(
            "LAYERBUILD_STAGE_TIMEOUT_SECS",
            non_empty("LAYERBUILD_STAGE_TIMEOUT_SECS"),
            DEFAULT_STAGE_TIMEOUT_SECS,
        )?;
        let deadline = seconds(
            "LAYERBUILD_DEADLINE_SECS",
            non_empty("LAYERBUILD_DEADLINE_SECS"),
            DEFAULT_DEADLINE_SECS,
        )?;

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            artifact: ArtifactSpec::pinned(),
            work_dir,
            build_context: base_dir.join(BUILD_CONTEXT_DIR),
            dockerfile: base_dir.join(DOCKERFILE),
            platform_requirements: base_dir.join(PLATFORM_REQUIREMENTS),
            docker: non_empty("DOCKER").unwrap_or_else(|| "docker".to_string()),
            aws: non_empty("AWS_CLI").unwrap_or_else(|| "aws".to_string()),
            aws_region: non_empty("AWS_REGION"),
            stage_timeout,
            deadline,
        })
    }

    /// Local path the payload is downloaded to.
    pub fn artifact_path(&self) -> PathBuf {
        self.work_dir.join(self.artifact.file_name())
    }

    /// Platform requirements path as seen from inside the build context.
    pub fn platform_requirements_in_context(&self) -> PathBuf {
        self.platform_requirements
            .strip_prefix(&self.build_context)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.platform_requirements.clone())
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  Payload:               {}", self.artifact.location());
        println!("  Payload SHA-256:       {}", self.artifact.sha256);
        println!("  Work dir:              {}", self.work_dir.display());
        println!("  Build context:         {}", self.build_context.display());
        println!("  Dockerfile:            {}", self.dockerfile.display());
        println!(
            "  Platform requirements: {}",
            self.platform_requirements.display()
        );
        println!("  DOCKER:                {}", self.docker);
        println!("  AWS_CLI:               {}", self.aws);
        println!(
            "  AWS_REGION:            {}",
            self.aws_region.as_deref().unwrap_or("(from registry host)")
        );
        println!("  Stage timeout:         {}s", self.stage_timeout.as_secs());
        println!("  Deadline:              {}s", self.deadline.as_secs());
    }
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn seconds(key: &str, raw: Option<String>, default: u64) -> Result<Duration> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(default));
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(PipelineError::Config(format!("{} must be greater than zero", key))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(PipelineError::Config(format!(
            "{} must be a number of seconds, got '{}'",
            key, raw
        ))),
    }
}
