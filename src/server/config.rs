//! Server configuration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

use crate::error::Error;

/// Default listening port
pub const DEFAULT_PORT: u16 = 20444;

/// Configuration for the relay HTTP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable request logging
    pub enable_request_logging: bool,

    /// File to write the process id into once the listener is bound
    pub pid_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            enable_request_logging: true,
            pid_file: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        if matches!(self.pid_file.as_deref(), Some("")) {
            return Err(Error::config("pid_file must not be empty"));
        }

        Ok(())
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    bind_address: Option<SocketAddr>,
    enable_request_logging: Option<bool>,
    pid_file: Option<String>,
}

impl ServerConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, Error> {
        self.bind_address = Some(
            addr.parse()
                .map_err(|_| Error::config(format!("Invalid address: {addr}")))?,
        );
        Ok(self)
    }

    /// Listen on all interfaces at `port`
    pub fn port(mut self, port: u16) -> Self {
        self.bind_address = Some(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.enable_request_logging = Some(enable);
        self
    }

    /// Set the pid file path
    pub fn pid_file(mut self, path: impl Into<String>) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ServerConfig, Error> {
        let defaults = ServerConfig::default();
        let config = ServerConfig {
            bind_address: self.bind_address.unwrap_or(defaults.bind_address),
            enable_request_logging: self
                .enable_request_logging
                .unwrap_or(defaults.enable_request_logging),
            pid_file: self.pid_file,
        };

        config.validate()?;
        Ok(config)
    }
}
