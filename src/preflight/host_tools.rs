//! Host tool availability checks.

use std::time::Duration;

use crate::config::Config;
use crate::process::{self, Cmd};

use super::types::CheckResult;

const CHECK_TIMEOUT: Duration = Duration::from_secs(20);

/// Check the image tool and AWS CLI are installed and usable.
pub async fn check_host_tools(config: &Config) -> Vec<CheckResult> {
    let mut results = vec![
        check_tool_exists(&config.docker, "Required to build, tag and push images"),
        check_tool_exists(&config.aws, "Required to fetch the payload and issue registry tokens"),
    ];

    if process::exists(&config.docker) {
        results.push(check_daemon(&config.docker).await);
    }
    if process::exists(&config.aws) {
        results.push(check_aws_identity(&config.aws).await);
    }

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, purpose: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => CheckResult::fail(tool, &format!("Not found in PATH. {}", purpose)),
    }
}

async fn check_daemon(docker: &str) -> CheckResult {
    let name = "image daemon";
    let outcome = Cmd::new(docker)
        .args(["info", "--format", "{{.ServerVersion}}"])
        .timeout(CHECK_TIMEOUT)
        .allow_fail()
        .run()
        .await;

    match outcome {
        Ok(result) if result.success() => {
            CheckResult::pass_with(name, &format!("server {}", result.stdout_trimmed()))
        }
        Ok(result) => CheckResult::fail(
            name,
            &format!("'{} info' failed: {}", docker, result.stderr_trimmed()),
        ),
        Err(e) => CheckResult::fail(name, &format!("{:#}", e)),
    }
}

/// Credentials may be injected later (CI role), so this only warns.
async fn check_aws_identity(aws: &str) -> CheckResult {
    let name = "AWS credentials";
    let outcome = Cmd::new(aws)
        .args(["sts", "get-caller-identity", "--query", "Arn", "--output", "text"])
        .timeout(CHECK_TIMEOUT)
        .allow_fail()
        .run()
        .await;

    match outcome {
        Ok(result) if result.success() => CheckResult::pass_with(name, result.stdout_trimmed()),
        Ok(result) => CheckResult::warn(name, result.stderr_trimmed()),
        Err(e) => CheckResult::warn(name, &format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::CheckStatus;

    #[test]
    fn test_missing_tool_fails() {
        let result = check_tool_exists("nonexistent_docker_12345", "needed");
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.details.unwrap().contains("needed"));
    }

    #[test]
    fn test_present_tool_passes_with_path() {
        let result = check_tool_exists("sh", "needed");
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(result.details.unwrap().ends_with("sh"));
    }

    #[tokio::test]
    async fn test_daemon_check_failure() {
        let result = check_daemon("false").await;
        assert_eq!(result.status, CheckStatus::Fail);
    }
}
