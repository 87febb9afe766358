//! Cache timing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;

/// Freshness and refresh timing shared by every site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// How long a known status stays fresh
    pub fresh_ttl_secs: u64,

    /// How long an unknown or failed status stays fresh
    pub error_ttl_secs: u64,

    /// How long before expiry the background loop refreshes watched sites
    pub refresh_lead_secs: u64,

    /// Remote status request timeout
    pub fetch_timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: 10,
            error_ttl_secs: 5,
            refresh_lead_secs: 2,
            fetch_timeout_secs: 30,
        }
    }
}

impl SiteConfig {
    pub fn fresh_ttl(&self) -> Duration {
        Duration::from_secs(self.fresh_ttl_secs)
    }

    pub fn error_ttl(&self) -> Duration {
        Duration::from_secs(self.error_ttl_secs)
    }

    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Validate the configuration
    ///
    /// The refresh lead must be shorter than both freshness windows, or the
    /// background loop would refresh continuously.
    pub fn validate(&self) -> Result<(), Error> {
        if self.fresh_ttl_secs == 0 || self.error_ttl_secs == 0 {
            return Err(Error::config("freshness windows must be at least 1 second"));
        }

        if self.refresh_lead_secs >= self.error_ttl_secs.min(self.fresh_ttl_secs) {
            return Err(Error::config(
                "refresh_lead_secs must be shorter than both freshness windows",
            ));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(Error::config("fetch_timeout_secs must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SiteConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fresh_ttl(), Duration::from_secs(10));
        assert_eq!(config.error_ttl(), Duration::from_secs(5));
        assert_eq!(config.refresh_lead(), Duration::from_secs(2));
    }

    #[test]
    fn test_lead_must_be_shorter_than_windows() {
        let config = SiteConfig {
            refresh_lead_secs: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = SiteConfig {
            error_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
