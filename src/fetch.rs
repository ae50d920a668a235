//! Payload retrieval from object storage.
//!
//! A single attempt, no retries. Whatever partial file the transfer tool
//! leaves behind on failure is its own business; the next run starts by
//! removing it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::{describe, PipelineError, Result, Stage};
use crate::process::{self, Cmd};

/// Bucket + key of an object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.trim_start_matches('/').to_string(),
        }
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Read access to an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Materialize the object's bytes at `dest`.
    async fn get_object(&self, location: &ObjectLocation, dest: &Path) -> Result<()>;
}

/// Object store backed by the AWS CLI.
pub struct S3Cli {
    aws: String,
    region: Option<String>,
    timeout: Duration,
}

impl S3Cli {
    pub fn new(aws: &str, region: Option<String>, timeout: Duration) -> Self {
        Self {
            aws: aws.to_string(),
            region,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.aws, config.aws_region.clone(), config.stage_timeout)
    }
}

#[async_trait]
impl ObjectStore for S3Cli {
    async fn get_object(&self, location: &ObjectLocation, dest: &Path) -> Result<()> {
        let mut cmd = Cmd::new(&self.aws)
            .args(["s3", "cp", location.uri().as_str()])
            .arg_path(dest)
            .arg("--only-show-errors")
            .timeout(self.timeout)
            .error_msg(format!("aws s3 cp {}", location));
        if let Some(region) = &self.region {
            cmd = cmd.args(["--region", region.as_str()]);
        }

        cmd.run().await.map_err(|e| match process::timed_out(&e) {
            Some(t) => PipelineError::Timeout {
                stage: Stage::Fetch,
                after: t.after,
            },
            None => PipelineError::Fetch {
                location: location.to_string(),
                message: describe(&e),
            },
        })?;
        Ok(())
    }
}

/// Download `config.artifact` into the work directory and return its path.
///
/// Any file left at the destination by an earlier run is removed first, so
/// what is on disk afterwards came from this fetch.
pub async fn fetch_artifact(store: &dyn ObjectStore, config: &Config) -> Result<PathBuf> {
    let location = config.artifact.location();
    let dest = config.artifact_path();

    fs::create_dir_all(&config.work_dir)?;
    if dest.exists() {
        fs::remove_file(&dest)?;
    }

    tracing::info!(%location, dest = %dest.display(), "fetching payload");
    store.get_object(&location, &dest).await?;

    if !dest.is_file() {
        return Err(PipelineError::Fetch {
            location: location.to_string(),
            message: format!("transfer reported success but {} is missing", dest.display()),
        });
    }
    Ok(dest)
}

/// Remove a downloaded payload. Missing files are fine.
pub fn discard_artifact(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove payload");
        }
    }
}
