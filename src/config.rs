//! Provider configuration: which cluster to talk to and how.
//!
//! ```toml
//! cluster = "hahn.yt.example.net"
//! use_tls = true
//! ca_certificate = "~/certs/yt.pem"
//! request_timeout_secs = 30
//!
//! [polling]
//! interval_ms = 1000
//! timeout_secs = 600
//! ```
//!
//! `YT_PROXY` overrides `cluster`. The token comes from the file, then
//! `YT_TOKEN`, then `~/.yt/token`.

use anyhow::{Context, Result, bail};
use cypress::HttpStoreConfig;
use reconcile::PollPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

pub const ENV_PROXY: &str = "YT_PROXY";
pub const ENV_TOKEN: &str = "YT_TOKEN";

// ============================================================================
// Config File
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Proxy address, with or without `http://` / `https://`
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    /// Path to an extra PEM bundle
    #[serde(default)]
    pub ca_certificate: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// `0` waits forever
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        let timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));
        PollPolicy::new(Duration::from_millis(self.interval_ms), timeout)
    }
}

/// Process environment the config falls back to.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub proxy: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            proxy: non_empty(std::env::var(ENV_PROXY).ok()),
            token: non_empty(std::env::var(ENV_TOKEN).ok()),
            token_file: paths::yt_token_file(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProviderConfig {
    /// Load the config file.
    ///
    /// An explicit path must exist. The default path may be missing, in
    /// which case everything comes from the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = paths::config_file()?;
                if !path.exists() {
                    log::debug!("No config file at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse provider config")
    }

    /// Cluster address after `YT_PROXY`.
    pub fn cluster(&self, env: &Environment) -> Result<String> {
        match env.proxy.as_ref().or(self.cluster.as_ref()) {
            Some(cluster) if !cluster.trim().is_empty() => Ok(cluster.trim().to_string()),
            _ => bail!("No cluster configured: set `cluster` in the config file or {ENV_PROXY}"),
        }
    }

    /// Token from the file, then `YT_TOKEN`, then the shared token file.
    pub fn token(&self, env: &Environment) -> Result<Option<String>> {
        if let Some(token) = non_empty(self.token.clone()).or_else(|| env.token.clone()) {
            return Ok(Some(token));
        }
        let Some(path) = env.token_file.as_ref().filter(|p| p.exists()) else {
            return Ok(None);
        };
        let token = fs::read_to_string(path)
            .with_context(|| format!("Could not read token file: {}", path.display()))?;
        Ok(non_empty(Some(token.trim().to_string())))
    }

    /// Connection settings for the HTTP store.
    pub fn store_config(&self, env: &Environment) -> Result<HttpStoreConfig> {
        let mut config = HttpStoreConfig::from_cluster(&self.cluster(env)?, self.use_tls);
        config.token = self.token(env)?;
        config.timeout = self.request_timeout_secs.map(Duration::from_secs);

        if let Some(ca) = &self.ca_certificate {
            let path = paths::expand(ca);
            let pem = fs::read(&path)
                .with_context(|| format!("Could not read CA certificate: {}", path.display()))?;
            config.ca_certificate = Some(pem);
        }

        if config.token.is_none() {
            log::warn!("No token configured; requests will be anonymous");
        }
        Ok(config)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.polling.policy()
    }
}

// ============================================================================
// Tests
// ============================================================================
