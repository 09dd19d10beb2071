//! Configuration system for the natprobe CLI.

use anyhow::Context;
use natprobe_discovery::{
    DEFAULT_CANDIDATES, DEFAULT_PRIMARY, DEFAULT_SECONDARY, SecondaryFailurePolicy,
    ServerDescriptor,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the per-probe timeout
const MAX_TIMEOUT_MS: u64 = 30_000;

/// natprobe configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// STUN servers
    #[serde(default)]
    pub servers: ServersConfig,
    /// Probe behaviour
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Classifier behaviour
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// STUN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServersConfig {
    /// Server A (`host` or `host:port`)
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Server B, must differ from server A
    #[serde(default = "default_secondary")]
    pub secondary: String,
    /// Servers checked by `natprobe servers`
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
}

/// Probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Response timeout per probe, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Send every probe of a run from one local port
    #[serde(default = "default_true")]
    pub pin_local_port: bool,
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassifierConfig {
    /// What a failed probe to server B means: "different" or "skip"
    #[serde(default)]
    pub secondary_failure: SecondaryFailurePolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_primary() -> String {
    DEFAULT_PRIMARY.to_string()
}

fn default_secondary() -> String {
    DEFAULT_SECONDARY.to_string()
}

fn default_candidates() -> Vec<String> {
    DEFAULT_CANDIDATES.iter().map(ToString::to_string).collect()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
            candidates: default_candidates(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            pin_local_port: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("natprobe/config.toml")
    }

    /// Load config from the default path, or use defaults if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Server A
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid.
    pub fn primary_server(&self) -> anyhow::Result<ServerDescriptor> {
        parse_server(&self.servers.primary, "Primary server")
    }

    /// Server B
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid.
    pub fn secondary_server(&self) -> anyhow::Result<ServerDescriptor> {
        parse_server(&self.servers.secondary, "Secondary server")
    }

    /// Servers to survey
    ///
    /// # Errors
    ///
    /// Returns an error if any descriptor is invalid.
    pub fn candidate_servers(&self) -> anyhow::Result<Vec<ServerDescriptor>> {
        self.servers
            .candidates
            .iter()
            .map(|s| parse_server(s, "Candidate server"))
            .collect()
    }

    /// Per-probe timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let primary = self.primary_server()?;
        let secondary = self.secondary_server()?;
        if primary == secondary {
            anyhow::bail!("Primary and secondary server must differ (both are {})", primary);
        }

        self.candidate_servers()?;

        if self.probe.timeout_ms == 0 || self.probe.timeout_ms > MAX_TIMEOUT_MS {
            anyhow::bail!(
                "Probe timeout must be between 1 and {} ms (got {})",
                MAX_TIMEOUT_MS,
                self.probe.timeout_ms
            );
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}

fn parse_server(value: &str, name: &str) -> anyhow::Result<ServerDescriptor> {
    value
        .parse()
        .with_context(|| format!("{name} '{value}' is not a valid host[:port]"))
}
