/// Configuration management for ycloud-ops
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::cloud::DEFAULT_ENDPOINT;

/// Environment variable consulted when no token is configured
pub const TOKEN_ENV_VAR: &str = "YC_TOKEN";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Operation service endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// IAM token (can also be set via YC_TOKEN env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Seconds between polls while waiting
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Default wait timeout; absent means wait until the operation is done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_poll_interval() -> u64 {
    1
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            poll_interval_secs: default_poll_interval(),
            timeout_secs: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let endpoint = Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid endpoint URL: {}", self.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("endpoint must be an http(s) URL: {}", self.endpoint);
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Get IAM token from config or environment
    pub fn get_token(&self) -> anyhow::Result<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "IAM token not found. Set {} environment variable or specify in config",
                    TOKEN_ENV_VAR
                )
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            timeout_secs: Some(1800),
            ..Self::default()
        }
    }
}
