//! Layerbuild library.
//!
//! Fetches the pinned runtime payload, checks its SHA-256, builds it into
//! an image on top of a caller-supplied base, layers a requirements file
//! on top and pushes the result. See [`pipeline::Pipeline`].

pub mod checksum;
pub mod commands;
pub mod common;
pub mod config;
pub mod error;
pub mod fetch;
pub mod image;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod registry;
pub mod request;
pub mod timing;

pub use config::Config;
pub use error::{PipelineError, Stage};
pub use pipeline::{Pipeline, PipelineReport, RunOptions};
pub use request::BuildRequest;
