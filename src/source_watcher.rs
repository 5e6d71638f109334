use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, error::TryRecvError};

use crate::{debug_log, error_log, info_log};

/// Watches a source tree and queues changed files for the poll loop
///
/// notify delivers events on its own thread; they are only queued here. The poll
/// loop drains the queue with [`SourceWatcher::drain`], which never blocks.
pub struct SourceWatcher {
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    receiver: UnboundedReceiver<PathBuf>,
    root: PathBuf,
}

impl SourceWatcher {
    /// Watch `root` recursively for changes to files with one of `extensions`
    pub fn new(root: &Path, extensions: &[String]) -> notify::Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let extensions: Vec<String> = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for path in watched_paths(&event, &extensions) {
                    // The receiver is gone once the agent shuts down
                    let _ = sender.send(path);
                }
            }
            Err(e) => {
                error_log!("Source watcher error: {}", e);
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        info_log!("Watching {} for source changes", root.display());

        Ok(Self {
            _watcher: watcher,
            receiver,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take every change queued since the last call
    ///
    /// Synchronous: safe to call from the poll loop whether or not a runtime is running.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(path) => changed.push(path),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug_log!("Source watcher channel closed");
                    break;
                }
            }
        }
        changed
    }
}

/// Paths of `event` that count as a source change
pub fn watched_paths(event: &Event, extensions: &[String]) -> Vec<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| has_watched_extension(path, extensions))
        .cloned()
        .collect()
}

fn has_watched_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            extensions.iter().any(|watched| *watched == ext)
        })
        .unwrap_or(false)
}
