//! Filesystem watcher for the update directory

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::process_update_file;
use crate::error::Result;
use crate::site::SiteRegistry;

/// Watches a directory and feeds finished files into the registry
///
/// Dropping the watcher stops both the filesystem watch and the task that
/// processes files.
pub struct UpdateWatcher {
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
    directory: PathBuf,
}

impl UpdateWatcher {
    /// Start watching `directory`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(directory: &Path, registry: Arc<SiteRegistry>) -> Result<Self> {
        // Events must carry absolute paths
        let directory = std::fs::canonicalize(directory)?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_finished_file(&event.kind) => {
                for path in event.paths {
                    let _ = sender.send(path);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Update directory watch error"),
        })?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!(directory = %directory.display(), "Watching for status updates");

        tokio::spawn(async move {
            while let Some(path) = receiver.recv().await {
                match process_update_file(&registry, &path).await {
                    Ok(outcome) => {
                        tracing::debug!(path = %path.display(), outcome = ?outcome, "Update file consumed")
                    }
                    Err(e) => tracing::warn!(error = %e, "Update file rejected"),
                }
            }
        });

        Ok(Self { watcher, directory })
    }

    /// Get the directory being watched
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// A writer closed the file, or it was renamed into place
fn is_finished_file(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}
