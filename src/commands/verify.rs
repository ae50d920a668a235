//! Verify command - checks a local file against the pinned digest.

use anyhow::{bail, Result};
use std::path::Path;

use crate::checksum;
use crate::config::Config;

/// Execute the verify command. The file is left alone either way.
pub fn cmd_verify(config: &Config, file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }

    let expected = config.artifact.sha256.to_ascii_lowercase();
    let actual = checksum::sha256_file(file)?;
    if actual != expected {
        bail!(
            "Checksum mismatch!\n  Expected: {}\n  Got:      {}",
            expected,
            actual
        );
    }

    println!("{}: OK ({})", file.display(), actual);
    Ok(())
}
