//! Configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use relay_tracing::TracingConfig;
use serde::Deserialize;

use crate::forward::{RedirectPolicy, DEFAULT_USER_AGENT};

/// Top-level relay configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Outbound fetch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Sent as `User-Agent` on every outbound request. Empty disables it.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub redirect: RedirectPolicy,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            redirect: RedirectPolicy::default(),
            timeout_secs: default_timeout(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (RELAY_ prefix, __ for nesting)
    /// 2. TOML config file (a missing file is not an error)
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(config_path))
                .merge(Env::prefixed("RELAY_").split("__")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        Ok(figment.extract()?)
    }
}
