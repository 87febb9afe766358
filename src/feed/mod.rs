//! External update feed
//!
//! Other processes publish status changes by dropping small JSON files into
//! a watched directory:
//!
//! ```json
//! {"conference": "https://conf.example.org/2024/", "tracker_status": "s2", "tracker_status_at": 1718000000.5}
//! ```
//!
//! Each file is consumed at most once. It is applied to an already known
//! site (files never create sites) and removed whether or not it was valid.

pub mod watcher;

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{FileUpdate, Sequencer, TrackerStatus};
use crate::site::SiteRegistry;

pub use watcher::UpdateWatcher;

/// Update feed configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Directory to watch for update files
    pub watch_directory: Option<PathBuf>,
}

/// Result of a successfully consumed update file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The update was handed to the site with this canonical URL
    Applied(String),

    /// No site exists for the conference yet; the update was dropped
    UnknownSite(String),
}

/// Consume one update file
///
/// The path must be absolute. The file is removed after processing,
/// including when it turns out to be malformed.
pub async fn process_update_file(registry: &SiteRegistry, path: &Path) -> Result<FeedOutcome> {
    if !path.is_absolute() {
        return Err(Error::bad_update(path, "unexpected name"));
    }

    let outcome = apply_update_file(registry, path).await;

    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove update file");
        }
    }

    outcome
}

async fn apply_update_file(registry: &SiteRegistry, path: &Path) -> Result<FeedOutcome> {
    let content = tokio::fs::read(path).await?;

    let update: FileUpdate =
        serde_json::from_slice(&content).map_err(|e| Error::bad_update(path, e.to_string()))?;

    let site = registry
        .get(&update.conference, None)
        .map_err(|e| Error::bad_update(path, e.to_string()))?;

    if update.tracker_status.is_empty() || update.tracker_status_at <= Sequencer::ZERO {
        return Err(Error::bad_update(path, "bad status update"));
    }

    match site {
        Some(site) => {
            tracing::info!(
                site = %site.url(),
                status = %update.tracker_status,
                sequencer = %update.tracker_status_at,
                "Status update from file"
            );
            site.update(TrackerStatus::new(
                update.tracker_status,
                update.tracker_status_at,
            ));
            Ok(FeedOutcome::Applied(site.url().to_string()))
        }
        None => Ok(FeedOutcome::UnknownSite(update.conference)),
    }
}
