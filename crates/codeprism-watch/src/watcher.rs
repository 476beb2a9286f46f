//! Filesystem watcher and the per-repository event loop.

use crate::debounce::DebounceBuffer;
use crate::filter::{is_watchable, relative_path, should_ignore};
use crate::session::RepoSession;
use codeprism_core::{CodeprismError, FileStatus, WatchConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use notify::Watcher;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Coalescing window of the notify layer; the sync debounce sits on top.
const NOTIFY_TICK: Duration = Duration::from_millis(100);
/// Wake-up interval while nothing is pending, to observe shutdown.
const IDLE_POLL: Duration = Duration::from_millis(500);

/// A filesystem event after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    File(PathBuf, FileStatus),
    /// `.git/HEAD` was rewritten (branch switch).
    Head,
    /// `.git/ORIG_HEAD` was rewritten (merge or pull).
    OrigHead,
}

/// Map a raw path under `root` to a watch event, or `None` when it is noise.
pub fn classify_path(root: &Path, path: &Path, exists: bool) -> Option<WatchEvent> {
    let rel = relative_path(root, path)?;
    match rel.as_str() {
        ".git/HEAD" => return Some(WatchEvent::Head),
        ".git/ORIG_HEAD" => return Some(WatchEvent::OrigHead),
        _ => {}
    }
    if should_ignore(Path::new(&rel)) || !is_watchable(path) {
        return None;
    }
    let status = if exists { FileStatus::Modified } else { FileStatus::Deleted };
    Some(WatchEvent::File(path.to_path_buf(), status))
}

/// Recursive notify watcher over one checkout.
pub struct RepoWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<WatchEvent>,
    fallback: bool,
}

impl RepoWatcher {
    /// Watch `root` recursively. If that fails, fall back to `.git` plus each
    /// top-level directory that is not ignored.
    pub fn new(root: &Path) -> Result<Self, CodeprismError> {
        let (tx, rx) = crossbeam_channel::unbounded::<WatchEvent>();
        let event_root = root.to_path_buf();

        let mut debouncer = new_debouncer(
            NOTIFY_TICK,
            move |res: Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(events) => {
                    let mut seen = HashSet::new();
                    for event in events {
                        if !seen.insert(event.path.clone()) {
                            continue;
                        }
                        let exists = event.path.exists();
                        if let Some(ev) = classify_path(&event_root, &event.path, exists) {
                            let _ = tx.send(ev);
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {e}"),
            },
        )
        .map_err(|e| CodeprismError::Watch(format!("failed to create debouncer: {e}")))?;

        let mut fallback = false;
        if let Err(e) = debouncer.watcher().watch(root, notify::RecursiveMode::Recursive) {
            tracing::warn!(root = %root.display(), "recursive watch failed ({e}), using fallback scope");
            fallback = true;
            let mut watched = 0;
            let git_dir = root.join(".git");
            if git_dir.is_dir()
                && debouncer
                    .watcher()
                    .watch(&git_dir, notify::RecursiveMode::NonRecursive)
                    .is_ok()
            {
                watched += 1;
            }
            for entry in std::fs::read_dir(root)?.flatten() {
                let path = entry.path();
                let ignored = entry.file_name().to_str().map(|n| should_ignore(Path::new(n))).unwrap_or(true);
                if !path.is_dir() || ignored {
                    continue;
                }
                match debouncer.watcher().watch(&path, notify::RecursiveMode::Recursive) {
                    Ok(()) => watched += 1,
                    Err(e) => tracing::warn!(dir = %path.display(), "skipping unwatchable directory: {e}"),
                }
            }
            if watched == 0 {
                return Err(CodeprismError::Watch(format!("nothing watchable under {}", root.display())));
            }
        }

        tracing::info!("Watching {} for changes", root.display());
        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
            fallback,
        })
    }

    pub fn receiver(&self) -> &Receiver<WatchEvent> {
        &self.receiver
    }

    /// Whether the narrower fallback scope is in use.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// Drive `session` from `events` until `stop` is set or the channel closes.
///
/// File events are buffered and flushed as one save once no new event has
/// arrived for the debounce window. Git events flush pending file changes
/// first, then run branch-switch or merge handling. Handler errors are logged
/// and the loop keeps going.
pub fn run_loop(session: &mut RepoSession, events: &Receiver<WatchEvent>, config: &WatchConfig, stop: &Arc<AtomicBool>) {
    let mut buffer = DebounceBuffer::new(Duration::from_millis(config.debounce_ms));
    let pull_window = Duration::from_secs(config.pull_window_secs);

    let flush = |session: &RepoSession, buffer: &mut DebounceBuffer| {
        if buffer.is_empty() {
            return;
        }
        let changes = buffer.drain();
        let count = changes.len();
        match session.flush(changes) {
            Ok(resp) => tracing::debug!(
                repo = session.name(),
                files = count,
                indexed = resp.indexed,
                invalidated = resp.invalidated,
                "flushed"
            ),
            Err(e) => tracing::warn!(repo = session.name(), "sync failed: {e}"),
        }
    };

    while !stop.load(Ordering::SeqCst) {
        let wait = buffer.time_left(Instant::now()).unwrap_or(IDLE_POLL).min(IDLE_POLL);
        match events.recv_timeout(wait) {
            Ok(WatchEvent::File(path, status)) => buffer.record(path, status, Instant::now()),
            Ok(WatchEvent::Head) => {
                flush(session, &mut buffer);
                if let Err(e) = session.on_head_changed() {
                    tracing::warn!(repo = session.name(), "branch switch handling failed: {e}");
                }
            }
            Ok(WatchEvent::OrigHead) => {
                flush(session, &mut buffer);
                if let Err(e) = session.on_orig_head_changed(pull_window) {
                    tracing::warn!(repo = session.name(), "merge handling failed: {e}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if buffer.is_due(Instant::now()) {
            flush(session, &mut buffer);
        }
    }
    flush(session, &mut buffer);
    tracing::info!(repo = session.name(), "watch loop stopped");
}
