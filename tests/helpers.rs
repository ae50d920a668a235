//! Shared test utilities: a temporary repository and recording fakes for
//! the object store, token issuer and image tool.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use layerbuild::config::{ArtifactSpec, Config};
use layerbuild::error::{PipelineError, Result, Stage};
use layerbuild::fetch::{ObjectLocation, ObjectStore};
use layerbuild::image::{BuildSpec, ImageTool, BASE_IMAGE_ARG};
use layerbuild::registry::{RegistryEndpoint, RegistryToken, TokenIssuer};
use tempfile::TempDir;

/// Payload served by [`FakeStore`] unless told otherwise.
pub const PAYLOAD: &[u8] = b"hello world";
/// SHA-256 of [`PAYLOAD`].
pub const PAYLOAD_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

pub const REGISTRY: &str = "123.dkr.ecr.us-west-2.amazonaws.com";

/// Test environment: a repository with the Stage B inputs (including a
/// caller requirements file, `image/reqs.txt`) and a config
/// whose pinned payload is [`PAYLOAD`].
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base_dir: PathBuf,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();

        fs::create_dir_all(base_dir.join("image")).expect("Failed to create image dir");
        fs::write(
            base_dir.join("image/Dockerfile"),
            "ARG BASE_IMAGE\nFROM ${BASE_IMAGE}\n",
        )
        .expect("Failed to write Dockerfile");
        fs::write(base_dir.join("image/platform-requirements.txt"), "boto3\n")
            .expect("Failed to write platform requirements");
        fs::write(base_dir.join("image/reqs.txt"), "requests\n")
            .expect("Failed to write requirements");

        let mut config =
            Config::from_vars(&base_dir, &HashMap::new()).expect("default config is valid");
        config.artifact = ArtifactSpec {
            bucket: "test-bucket".to_string(),
            key: "payloads/payload.tar.gz".to_string(),
            sha256: PAYLOAD_SHA256.to_string(),
        };

        Self {
            _temp_dir: temp_dir,
            base_dir,
            config,
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.config.artifact_path()
    }
}

/// One collaborator call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(String),
    Build {
        stage: Stage,
        tag: String,
        base: String,
    },
    Issue(String),
    Login(String),
    Push(String),
}

/// Shared call log.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn builds(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Build { .. }))
            .count()
    }
}

pub struct FakeStore {
    pub rec: Recorder,
    pub payload: Vec<u8>,
    pub fail: bool,
}

impl FakeStore {
    pub fn new(rec: &Recorder) -> Self {
        Self {
            rec: rec.clone(),
            payload: PAYLOAD.to_vec(),
            fail: false,
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get_object(&self, location: &ObjectLocation, dest: &Path) -> Result<()> {
        self.rec.push(Call::Fetch(location.uri()));
        if self.fail {
            return Err(PipelineError::Fetch {
                location: location.to_string(),
                message: "NoSuchKey".to_string(),
            });
        }
        fs::write(dest, &self.payload)?;
        Ok(())
    }
}

pub struct FakeTokens {
    pub rec: Recorder,
    pub fail: bool,
}

impl FakeTokens {
    pub fn new(rec: &Recorder) -> Self {
        Self {
            rec: rec.clone(),
            fail: false,
        }
    }
}

#[async_trait]
impl TokenIssuer for FakeTokens {
    async fn issue(&self, registry: &RegistryEndpoint) -> Result<RegistryToken> {
        self.rec.push(Call::Issue(registry.host().to_string()));
        if self.fail {
            return Err(PipelineError::Auth {
                registry: registry.to_string(),
                message: "ExpiredToken".to_string(),
            });
        }
        Ok(RegistryToken::new("AWS", "token"))
    }
}

pub struct FakeImages {
    pub rec: Recorder,
    pub fail_build: Option<Stage>,
    pub fail_push: bool,
    /// Each build sleeps this long first.
    pub build_delay: Option<Duration>,
}

impl FakeImages {
    pub fn new(rec: &Recorder) -> Self {
        Self {
            rec: rec.clone(),
            fail_build: None,
            fail_push: false,
            build_delay: None,
        }
    }
}

#[async_trait]
impl ImageTool for FakeImages {
    async fn build(&self, spec: &BuildSpec) -> Result<()> {
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        self.rec.push(Call::Build {
            stage: spec.stage,
            tag: spec.tag.clone(),
            base: spec.build_arg(BASE_IMAGE_ARG).unwrap_or_default().to_string(),
        });
        if self.fail_build == Some(spec.stage) {
            return Err(PipelineError::Build {
                stage: spec.stage,
                tag: spec.tag.clone(),
                message: "exit code 1".to_string(),
            });
        }
        Ok(())
    }

    async fn login(&self, registry: &RegistryEndpoint, _token: &RegistryToken) -> Result<()> {
        self.rec.push(Call::Login(registry.host().to_string()));
        Ok(())
    }

    async fn push(&self, tag: &str) -> Result<()> {
        self.rec.push(Call::Push(tag.to_string()));
        if self.fail_push {
            return Err(PipelineError::Push {
                tag: tag.to_string(),
                message: "denied: quota exceeded".to_string(),
            });
        }
        Ok(())
    }
}
