//! Configuration management
//!
//! Gateway-level settings only. Each adapter reads its own connection
//! settings from the environment when it first connects; `env_files` is how
//! those variables are usually supplied.

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Prefix of environment overrides, e.g. `DB_GATEWAY_SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "DB_GATEWAY_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before any adapter connects.
    /// Paths support ~ expansion. Loaded in order; variables already set in
    /// the process environment are not overridden.
    pub env_files: Vec<String>,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Dispatch configuration
    pub gateway: GatewayConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Default deadline of one operation invocation
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
    /// Bound on each liveness probe made by `db_list` and `db_status`
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Bound on each adapter's disconnect at shutdown
    #[serde(with = "humantime_serde")]
    pub disconnect_timeout: Duration,
    /// Adapters to connect in the background right after startup
    pub warm_start: Vec<String>,
    /// Adapters left out of the registry entirely
    pub disabled: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(5),
            warm_start: Vec::new(),
            disabled: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no gateway can run with
    pub fn validate(&self) -> Result<()> {
        if self.gateway.operation_timeout.is_zero() {
            return Err(Error::Config(
                "gateway.operation_timeout must be greater than zero".to_string(),
            ));
        }
        if self.gateway.probe_timeout.is_zero() {
            return Err(Error::Config(
                "gateway.probe_timeout must be greater than zero".to_string(),
            ));
        }
        if self.gateway.disconnect_timeout.is_zero() {
            return Err(Error::Config(
                "gateway.disconnect_timeout must be greater than zero".to_string(),
            ));
        }
        if self.server.max_body_size == 0 {
            return Err(Error::Config(
                "server.max_body_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are skipped.
    pub fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if !path.exists() {
                debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => info!("Loaded env file: {expanded}"),
                Err(e) => warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Whether an adapter is excluded from the registry
    #[must_use]
    pub fn is_disabled(&self, adapter: &str) -> bool {
        self.gateway.disabled.iter().any(|d| d == adapter)
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
        _ => path.to_string(),
    }
}

/// Human-readable durations: "30s", "5m", "100ms", or bare seconds
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a human-readable duration string
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    /// Parse one duration string
    ///
    /// # Errors
    ///
    /// Returns a message when the number or unit is not understood.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let number = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        };

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins).map(|m| Duration::from_secs(m * 60))
        } else {
            number(s).map(Duration::from_secs)
        }
    }
}
