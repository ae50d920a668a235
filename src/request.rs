//! Caller-supplied inputs for one pipeline run.

use std::path::{Component, Path};

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::registry::RegistryEndpoint;

/// The four positional inputs, validated. Immutable for the run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildRequest {
    /// Base image for Stage A.
    pub source_image: String,
    /// Tag written by both builds and pushed at the end.
    pub destination_image: String,
    /// pip-style requirements file handed to Stage B.
    pub requirements: String,
    pub registry: RegistryEndpoint,
}

impl BuildRequest {
    pub fn new(
        source_image: &str,
        destination_image: &str,
        requirements: &str,
        registry: &str,
    ) -> Result<Self> {
        let source_image = image_ref("source image", source_image)?;
        let destination_image = image_ref("destination image", destination_image)?;

        let requirements = requirements_ref(requirements)?;

        let registry = RegistryEndpoint::parse(registry)?;
        if !registry.owns(&destination_image) {
            tracing::warn!(
                destination = %destination_image,
                %registry,
                "destination image is not under the registry host; push will go to the tag's own registry"
            );
        }

        Ok(Self {
            source_image,
            destination_image,
            requirements,
            registry,
        })
    }
}

/// The requirements file is copied out of the Stage B build context, so the
/// reference must be a relative path that stays inside it.
fn requirements_ref(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(PipelineError::Request(
            "requirements reference is empty".to_string(),
        ));
    }
    let escapes = Path::new(value)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(PipelineError::Request(format!(
            "requirements reference '{}' must be a relative path inside the build context",
            value
        )));
    }
    Ok(value.to_string())
}

fn image_ref(what: &str, raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(PipelineError::Request(format!("{} is empty", what)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(PipelineError::Request(format!(
            "{} '{}' contains whitespace",
            what, value
        )));
    }
    Ok(value.to_string())
}
