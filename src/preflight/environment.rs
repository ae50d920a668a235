//! Build environment checks (repository files, work directory).

use std::path::Path;

use crate::config::{Config, WRITE_CHECK_FILE};

use super::types::CheckResult;

/// Check the Stage B inputs shipped with the repository and the work dir.
pub fn check_build_environment(config: &Config) -> Vec<CheckResult> {
    let mut results = vec![
        check_path("build context", &config.build_context, true),
        check_path("Dockerfile", &config.dockerfile, false),
        check_path("platform requirements", &config.platform_requirements, false),
    ];

    // Check work directory is writable
    let name = "work dir writable";
    let marker = config.work_dir.join(WRITE_CHECK_FILE);
    let writable = std::fs::create_dir_all(&config.work_dir)
        .and_then(|_| std::fs::write(&marker, "test"));
    match writable {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(&marker) {
                tracing::warn!(path = %marker.display(), error = %e, "could not remove write-check file");
            }
            results.push(CheckResult::pass_with(name, &config.work_dir.display().to_string()));
        }
        Err(e) => results.push(CheckResult::fail(
            name,
            &format!("Cannot write to {}: {}", config.work_dir.display(), e),
        )),
    }

    results
}

fn check_path(name: &str, path: &Path, dir: bool) -> CheckResult {
    let ok = if dir { path.is_dir() } else { path.is_file() };
    if ok {
        CheckResult::pass_with(name, &path.display().to_string())
    } else {
        CheckResult::fail(name, &format!("Missing: {}", path.display()))
    }
}
