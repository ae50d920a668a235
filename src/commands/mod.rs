//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Run the full pipeline
//! - `fetch` - Fetch and verify the payload only
//! - `verify` - Check a local file against the pinned digest
//! - `preflight` - Run preflight checks
//! - `show` - Display configuration
//! - `clean` - Remove the work directory

pub mod build;
pub mod clean;
pub mod fetch;
mod preflight;
pub mod show;
mod verify;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use fetch::cmd_fetch;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
pub use verify::cmd_verify;
