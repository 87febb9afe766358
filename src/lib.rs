//! trackrelay - caching long-poll relay for conference tracker status
//!
//! Many clients poll the tracker status of remote conference sites. The relay
//! fetches each site's status once, caches it for a short freshness window,
//! and lets clients long-poll until the status changes instead of hitting
//! the remote site themselves.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Status values and wire types
//! - [`site`] - Per-site cache engine and the site registry
//! - [`fetcher`] - Remote status endpoint client
//! - [`server`] - HTTP poll/update handlers
//! - [`feed`] - File-drop update feed
//! - [`config`] - Configuration management and settings
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trackrelay::fetcher::RemoteFetcher;
//! use trackrelay::site::{SiteConfig, SiteRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SiteConfig::default();
//!     let fetcher = Arc::new(RemoteFetcher::new(config.fetch_timeout())?);
//!     let registry = SiteRegistry::new(fetcher, config);
//!
//!     let site = registry.site("https://conf.example.org/2024/", None)?;
//!     println!("{}", site.status().await);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod models;
pub mod server;
pub mod site;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::fetcher::{RemoteFetcher, StatusSource};
    pub use crate::models::{Sequencer, SiteResponse, TrackerStatus};
    pub use crate::server::{RelayServer, ServerConfig};
    pub use crate::site::{Site, SiteConfig, SiteRegistry};
}

// Direct re-exports for convenience
pub use models::{Sequencer, TrackerStatus};
