//! Show command - displays information.

use anyhow::Result;

use crate::config::Config;

/// Show target for the show command.
pub enum ShowTarget {
    /// Human-readable configuration
    Config,
    /// Configuration as JSON
    ConfigJson,
}

/// Execute the show command.
pub fn cmd_show(config: &Config, target: ShowTarget) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::ConfigJson => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
