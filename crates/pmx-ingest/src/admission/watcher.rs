//! Filesystem watcher for newly created exports

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::FileTask;

/// Whether `path` names a file with the expected extension, ignoring case.
pub fn is_candidate(path: &Path, extension: &str) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_lowercase()
                .ends_with(&extension.to_lowercase())
        })
        .unwrap_or(false)
}

/// Watches one directory (non-recursively) and enqueues files created in it
/// or renamed into it.
///
/// Watching stops when this value is dropped.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl DirectoryWatcher {
    pub fn start(dir: &Path, extension: &str, sender: mpsc::Sender<FileTask>) -> Result<Self> {
        let extension = extension.to_string();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    forward_created(event, &extension, &sender);
                }
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        info!(dir = %dir.display(), "Watching for new files");
        Ok(Self {
            _watcher: watcher,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Paths that newly appeared in the directory.
///
/// A `Both` rename carries `[from, to]`; only the target is new.
fn arrived_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Enqueue the candidate paths of a create or rename-target event; returns
/// how many were sent.
///
/// Runs on the watcher's own thread, so the send blocks rather than awaits.
fn forward_created(event: Event, extension: &str, sender: &mpsc::Sender<FileTask>) -> usize {
    let mut sent = 0;
    for path in arrived_paths(event) {
        if !is_candidate(&path, extension) {
            debug!(path = %path.display(), "Ignoring file with unexpected extension");
            continue;
        }
        debug!(path = %path.display(), "Detected new file");
        if sender.blocking_send(FileTask::new(path)).is_err() {
            warn!("Task queue closed, dropping detected file");
            break;
        }
        sent += 1;
    }
    sent
}
