//! Connection configuration for the primary and failover endpoints.
//!
//! Configuration can come from three places:
//! 1. Environment variables, `<PREFIX>_RPCURL` style (see [`Config::from_env`])
//! 2. Any key/value source via [`Config::from_lookup`]
//! 3. A TOML file via [`Config::load`]
//!
//! Every constructor validates before returning. The library never aborts the
//! process on a bad configuration; callers decide how to fail startup.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{FailoverError, Result};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "ethclient";

/// Endpoint names are used as metric label values and must stay shorter than this.
pub const NAME_LEN_LIMIT: usize = 32;

const KEY_RPC_URL: &str = "RPCURL";
const KEY_RPC_NAME: &str = "RPCNAME";
const KEY_FAILOVER_RPC_URL: &str = "FAILOVERRPCURL";
const KEY_FAILOVER_RPC_NAME: &str = "FAILOVERRPCNAME";
const KEY_ENABLE_PROMETHEUS: &str = "ENABLEPROMETHEUS";

/// Primary/failover endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Address dialed as the primary connection.
    pub primary_url: String,
    /// `client` label for primary attempts.
    pub primary_name: String,
    /// Address dialed as the secondary connection.
    pub failover_url: String,
    /// `client` label for failover attempts.
    pub failover_name: String,
    /// Build and register request metrics (default: true).
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
}

fn default_enable_metrics() -> bool {
    true
}

impl Config {
    /// Create a validated config with metrics enabled.
    pub fn new(
        primary_url: impl Into<String>,
        primary_name: impl Into<String>,
        failover_url: impl Into<String>,
        failover_name: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            primary_url: primary_url.into(),
            primary_name: primary_name.into(),
            failover_url: failover_url.into(),
            failover_name: failover_name.into(),
            enable_metrics: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// Enable or disable metrics.
    pub fn enable_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Check that both names are shorter than [`NAME_LEN_LIMIT`].
    ///
    /// URLs are not parsed here; a malformed or empty URL fails at dial time.
    pub fn validate(&self) -> Result<()> {
        check_name("primary_name", &self.primary_name)?;
        check_name("failover_name", &self.failover_name)?;
        Ok(())
    }

    /// Load from the process environment using [`DEFAULT_ENV_PREFIX`].
    pub fn from_env() -> Result<Self> {
        Self::from_env_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Load from the process environment using a custom prefix.
    pub fn from_env_prefix(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source.
    ///
    /// Keys are `<PREFIX>_RPCURL`, `<PREFIX>_RPCNAME`, `<PREFIX>_FAILOVERRPCURL`,
    /// `<PREFIX>_FAILOVERRPCNAME` (required) and `<PREFIX>_ENABLEPROMETHEUS`
    /// (optional, default `true`). The prefix is upper-cased.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |suffix: &str| {
            if prefix.is_empty() {
                suffix.to_string()
            } else {
                format!("{}_{}", prefix.to_uppercase(), suffix)
            }
        };
        let required = |suffix: &str| {
            let name = key(suffix);
            lookup(&name).ok_or(FailoverError::MissingConfig(name))
        };

        let enable_metrics = match lookup(&key(KEY_ENABLE_PROMETHEUS)) {
            Some(value) => parse_bool(&key(KEY_ENABLE_PROMETHEUS), &value)?,
            None => default_enable_metrics(),
        };

        let config = Self {
            primary_url: required(KEY_RPC_URL)?,
            primary_name: required(KEY_RPC_NAME)?,
            failover_url: required(KEY_FAILOVER_RPC_URL)?,
            failover_name: required(KEY_FAILOVER_RPC_NAME)?,
            enable_metrics,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FailoverError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| FailoverError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

fn check_name(field: &'static str, value: &str) -> Result<()> {
    if value.len() >= NAME_LEN_LIMIT {
        return Err(FailoverError::NameTooLong {
            field,
            value: value.to_string(),
            limit: NAME_LEN_LIMIT,
        });
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        _ => Err(FailoverError::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
