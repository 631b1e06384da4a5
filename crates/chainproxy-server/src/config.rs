//! Proxy configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional JSON
//! file, environment variables. The CLI applies its flags last.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chainproxy_core::{BackoffPolicy, DispatcherConfig, EndpointRegistry};

use crate::error::ServerError;
use crate::telemetry::LogConfig;

/// Private endpoint URL.
pub const ENV_PRIVATE_URL: &str = "PRIVATE_RPC_URL";
/// Comma-separated public endpoint URLs.
pub const ENV_PUBLIC_URLS: &str = "PUBLIC_RPC_URLS";
/// Listen address, e.g. `127.0.0.1:3000`.
pub const ENV_LISTEN: &str = "CHAINPROXY_LISTEN";

const DEFAULT_RPC_URL: &str = "https://rpc.staging.midl.xyz";

/// Top-level proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the HTTP boundary binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// High-throughput endpoint used first by market traffic
    #[serde(default = "default_private_url")]
    pub private_url: String,
    /// Generic endpoints, in registration order
    #[serde(default = "default_public_urls")]
    pub public_urls: Vec<String>,
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Periodic stats log line (None = disabled)
    #[serde(default)]
    pub stats_log_interval_secs: Option<u64>,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_listen() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 3000)) }
fn default_private_url() -> String { DEFAULT_RPC_URL.to_string() }
fn default_public_urls() -> Vec<String> { vec![DEFAULT_RPC_URL.to_string()] }
fn default_request_timeout_ms() -> u64 { 8_000 }

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            private_url: default_private_url(),
            public_urls: default_public_urls(),
            request_timeout_ms: default_request_timeout_ms(),
            stats_log_interval_secs: None,
            backoff: BackoffPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Overlay the process environment.
    pub fn apply_env(&mut self) -> Result<(), ServerError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get(ENV_PRIVATE_URL) {
            self.private_url = url;
        }
        if let Some(list) = get(ENV_PUBLIC_URLS) {
            self.public_urls = split_urls(&list);
        }
        if let Some(addr) = get(ENV_LISTEN) {
            self.listen = addr
                .parse()
                .map_err(|e| ServerError::Config(format!("{ENV_LISTEN}={addr}: {e}")))?;
        }
        Ok(())
    }

    /// Reject configurations the proxy cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.public_urls.is_empty() {
            return Err(ServerError::Config(
                "at least one public endpoint is required".into(),
            ));
        }
        for url in std::iter::once(&self.private_url).chain(&self.public_urls) {
            let parsed = url::Url::parse(url)
                .map_err(|e| ServerError::Config(format!("invalid endpoint URL '{url}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ServerError::Config(format!(
                    "endpoint URL '{url}' must be http or https"
                )));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(ServerError::Config("request_timeout_ms must be > 0".into()));
        }
        if self.stats_log_interval_secs == Some(0) {
            return Err(ServerError::Config(
                "stats_log_interval_secs must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn registry(&self) -> Result<EndpointRegistry, ServerError> {
        Ok(EndpointRegistry::new(
            self.private_url.clone(),
            self.public_urls.iter().cloned(),
        )?)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            backoff: self.backoff.clone(),
        }
    }
}

/// Split a comma-separated URL list, dropping blanks.
pub fn split_urls(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
