//! Clean command - removes downloaded payloads.
//!
//! Only files this tool writes are removed. The work directory itself goes
//! only once it is empty.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::{Config, WRITE_CHECK_FILE};

/// Execute the clean command.
pub fn cmd_clean(config: &Config) -> Result<()> {
    let work_dir = &config.work_dir;
    if !work_dir.exists() {
        println!("Nothing to clean ({} does not exist).", work_dir.display());
        return Ok(());
    }

    for path in [config.artifact_path(), work_dir.join(WRITE_CHECK_FILE)] {
        remove_if_present(&path)?;
    }

    match fs::remove_dir(work_dir) {
        Ok(()) => println!("Removed {}", work_dir.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::debug!(path = %work_dir.display(), error = %e, "work dir left in place");
            println!("Kept {} (not empty)", work_dir.display());
        }
    }
    println!("Clean complete.");
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            println!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_clean_removes_payload_and_empty_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_vars(dir.path(), &HashMap::new()).unwrap();
        fs::create_dir_all(&config.work_dir).unwrap();
        fs::write(config.artifact_path(), "payload").unwrap();
        fs::write(config.work_dir.join(WRITE_CHECK_FILE), "test").unwrap();

        cmd_clean(&config).unwrap();
        assert!(!config.work_dir.exists());
    }

    #[test]
    fn test_clean_leaves_repository_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("image")).unwrap();
        fs::write(dir.path().join("image/Dockerfile"), "FROM scratch\n").unwrap();

        // Point the work dir at the repository itself, bypassing the config check.
        let mut config = Config::from_vars(dir.path(), &HashMap::new()).unwrap();
        config.work_dir = dir.path().to_path_buf();
        fs::write(config.artifact_path(), "payload").unwrap();

        cmd_clean(&config).unwrap();
        assert!(!config.artifact_path().exists());
        assert!(dir.path().join("image/Dockerfile").is_file());
    }

    #[test]
    fn test_clean_missing_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_vars(dir.path(), &HashMap::new()).unwrap();
        cmd_clean(&config).unwrap();
    }
}
