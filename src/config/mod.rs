//! Configuration management for the relay
//!
//! Configuration is loaded from a TOML file or from `TRACKRELAY_*`
//! environment variables, then overridden by command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::feed::FeedConfig;
use crate::server::ServerConfig;
use crate::site::SiteConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Cache timing configuration
    pub site: SiteConfig,

    /// External update feed configuration
    pub feed: FeedConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("TRACKRELAY_BIND") {
            config.server.bind_address = addr
                .parse()
                .with_context(|| format!("Invalid TRACKRELAY_BIND: {addr}"))?;
        } else if let Some(port) = lookup("TRACKRELAY_PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid TRACKRELAY_PORT: {port}"))?;
            config.server.bind_address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        }

        let secs = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {key}: {value}")),
                None => Ok(default),
            }
        };
        config.site.fresh_ttl_secs = secs("TRACKRELAY_FRESH_TTL", config.site.fresh_ttl_secs)?;
        config.site.error_ttl_secs = secs("TRACKRELAY_ERROR_TTL", config.site.error_ttl_secs)?;
        config.site.refresh_lead_secs =
            secs("TRACKRELAY_REFRESH_LEAD", config.site.refresh_lead_secs)?;
        config.site.fetch_timeout_secs =
            secs("TRACKRELAY_FETCH_TIMEOUT", config.site.fetch_timeout_secs)?;

        config.server.pid_file = lookup("TRACKRELAY_PID_FILE");
        config.feed.watch_directory = lookup("TRACKRELAY_WATCH_DIRECTORY").map(PathBuf::from);

        if let Some(level) = lookup("TRACKRELAY_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("TRACKRELAY_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.site.validate()?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json'");
        }

        if let Some(dir) = &self.feed.watch_directory {
            if !dir.is_dir() {
                anyhow::bail!("watch directory {} is not a directory", dir.display());
            }
        }

        Ok(())
    }
}
