//! Registry endpoint handling and short-lived credential issuance.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::{describe, PipelineError, Result, Stage};
use crate::process::{self, Cmd};

/// Registry host the final image is pushed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEndpoint {
    host: String,
}

impl RegistryEndpoint {
    /// Parse a registry endpoint.
    ///
    /// Accepts a bare host (`123.dkr.ecr.us-west-2.amazonaws.com`), optionally
    /// with a port, an `https://` scheme, or a trailing slash.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let host = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        if host.is_empty() {
            return Err(PipelineError::Request(
                "registry endpoint is empty".to_string(),
            ));
        }
        if host.contains('/') || host.chars().any(char::is_whitespace) {
            return Err(PipelineError::Request(format!(
                "registry endpoint '{}' must be a host, not a path",
                raw
            )));
        }

        Ok(Self {
            host: host.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Region encoded in an ECR host (`<account>.dkr.ecr.<region>.amazonaws.com`).
    pub fn ecr_region(&self) -> Option<&str> {
        let host = self.host.split(':').next().unwrap_or(&self.host);
        let (_, rest) = host.split_once(".dkr.ecr.")?;
        let (region, suffix) = rest.split_once('.')?;
        if region.is_empty() || !suffix.starts_with("amazonaws.com") {
            return None;
        }
        Some(region)
    }

    /// Whether `image` would be pushed to this registry.
    pub fn owns(&self, image: &str) -> bool {
        image
            .strip_prefix(&self.host)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for RegistryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

/// Bearer secret for a registry login. Never printed.
#[derive(Clone)]
pub struct RegistryToken {
    /// Login user paired with the token (ECR always uses `AWS`).
    pub username: String,
    secret: String,
}

impl RegistryToken {
    pub fn new(username: &str, secret: &str) -> Self {
        Self {
            username: username.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for RegistryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryToken")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of short-lived registry credentials.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, registry: &RegistryEndpoint) -> Result<RegistryToken>;
}

/// Issues ECR login passwords through the AWS CLI.
pub struct EcrTokenIssuer {
    aws: String,
    fallback_region: Option<String>,
    timeout: Duration,
}

impl EcrTokenIssuer {
    pub fn new(aws: &str, fallback_region: Option<String>, timeout: Duration) -> Self {
        Self {
            aws: aws.to_string(),
            fallback_region,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.aws, config.aws_region.clone(), config.stage_timeout)
    }

    fn region_for<'a>(&'a self, registry: &'a RegistryEndpoint) -> Result<&'a str> {
        registry
            .ecr_region()
            .or(self.fallback_region.as_deref())
            .ok_or_else(|| PipelineError::Auth {
                registry: registry.to_string(),
                message: "cannot tell the region from the host; set AWS_REGION".to_string(),
            })
    }
}

#[async_trait]
impl TokenIssuer for EcrTokenIssuer {
    async fn issue(&self, registry: &RegistryEndpoint) -> Result<RegistryToken> {
        let region = self.region_for(registry)?;
        tracing::info!(%registry, region, "requesting registry token");

        let result = Cmd::new(&self.aws)
            .args(["ecr", "get-login-password", "--region", region])
            .timeout(self.timeout)
            .error_msg("aws ecr get-login-password")
            .run()
            .await
            .map_err(|e| match process::timed_out(&e) {
                Some(t) => PipelineError::Timeout {
                    stage: Stage::Auth,
                    after: t.after,
                },
                None => PipelineError::Auth {
                    registry: registry.to_string(),
                    message: describe(&e),
                },
            })?;

        let secret = result.stdout_trimmed();
        if secret.is_empty() {
            return Err(PipelineError::Auth {
                registry: registry.to_string(),
                message: "token issuer returned an empty password".to_string(),
            });
        }
        Ok(RegistryToken::new("AWS", secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_host() {
        let ep = RegistryEndpoint::parse("123.dkr.ecr.us-west-2.amazonaws.com").unwrap();
        assert_eq!(ep.host(), "123.dkr.ecr.us-west-2.amazonaws.com");
        assert_eq!(ep.ecr_region(), Some("us-west-2"));
    }

    #[test]
    fn test_parse_strips_scheme_and_slash() {
        let ep = RegistryEndpoint::parse("https://registry.local:5000/").unwrap();
        assert_eq!(ep.host(), "registry.local:5000");
        assert_eq!(ep.ecr_region(), None);
    }

    #[test]
    fn test_parse_rejects_empty_and_paths() {
        assert!(RegistryEndpoint::parse("  ").is_err());
        assert!(RegistryEndpoint::parse("ghcr.io/org").is_err());
    }

    #[test]
    fn test_china_partition_region() {
        let ep = RegistryEndpoint::parse("123.dkr.ecr.cn-north-1.amazonaws.com.cn").unwrap();
        assert_eq!(ep.ecr_region(), Some("cn-north-1"));
    }

    #[test]
    fn test_owns() {
        let ep = RegistryEndpoint::parse("123.dkr.ecr.us-west-2.amazonaws.com").unwrap();
        assert!(ep.owns("123.dkr.ecr.us-west-2.amazonaws.com/myapp:2.0"));
        assert!(!ep.owns("myapp:2.0"));
        assert!(!ep.owns("123.dkr.ecr.us-west-2.amazonaws.com.evil/x"));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = RegistryToken::new("AWS", "hunter2");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("hunter2"));
        assert_eq!(token.secret(), "hunter2");
    }

    #[tokio::test]
    async fn test_missing_region_is_auth_error() {
        let issuer = EcrTokenIssuer::new("aws", None, Duration::from_secs(5));
        let ep = RegistryEndpoint::parse("registry.local").unwrap();
        let err = issuer.issue(&ep).await.unwrap_err();
        assert!(matches!(err, PipelineError::Auth { .. }));
    }

    #[tokio::test]
    async fn test_issue_reads_stdout() {
        // `echo` prints its arguments, which stands in for the password.
        let issuer = EcrTokenIssuer::new("echo", None, Duration::from_secs(5));
        let ep = RegistryEndpoint::parse("1.dkr.ecr.us-east-1.amazonaws.com").unwrap();
        let token = issuer.issue(&ep).await.unwrap();
        assert_eq!(token.username, "AWS");
        assert_eq!(
            token.secret(),
            "ecr get-login-password --region us-east-1"
        );
    }
}
