//! Fetch command - downloads and verifies the payload without building.

use anyhow::Result;

use crate::checksum;
use crate::config::Config;
use crate::fetch::{self, S3Cli};

/// Execute the fetch command. The payload is kept in the work directory.
pub async fn cmd_fetch(config: &Config) -> Result<()> {
    let store = S3Cli::from_config(config);
    let path = fetch::fetch_artifact(&store, config).await?;
    let sha256 = checksum::verify_sha256(&path, &config.artifact.sha256)?;

    println!("Payload: {}", config.artifact.location());
    println!("  Path:   {}", path.display());
    println!("  SHA256: {} [OK]", sha256);
    Ok(())
}
