//! Per-conference status caching
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              SiteRegistry                │
//! │   canonical URL ──► Arc<Site>            │
//! └──────────────────┬───────────────────────┘
//!                    │
//!   ┌────────────────▼─────────────────────┐
//!   │                Site                  │
//!   │  cached status + freshness window    │
//!   │  single-flight refresh ──► fetcher   │
//!   │  waiter queue (FIFO one-shots)       │
//!   │  interest ──► background loop        │
//!   └──────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use trackrelay::fetcher::RemoteFetcher;
//! use trackrelay::site::{SiteConfig, SiteRegistry};
//!
//! let config = SiteConfig::default();
//! let fetcher = Arc::new(RemoteFetcher::new(config.fetch_timeout())?);
//! let registry = SiteRegistry::new(fetcher, config);
//! let site = registry.site("https://conf.example.org/2024", None)?;
//! let status = site.status().await;
//! ```

pub mod cache;
pub mod config;
pub mod registry;

pub use cache::Site;
pub use config::SiteConfig;
pub use registry::SiteRegistry;
