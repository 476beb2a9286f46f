//! Pending file changes, flushed once the event stream goes quiet.

use codeprism_core::FileStatus;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Pending changes keyed by absolute path. Every new event restarts the window.
#[derive(Debug)]
pub struct DebounceBuffer {
    window: Duration,
    pending: BTreeMap<PathBuf, FileStatus>,
    last_event: Option<Instant>,
}

impl DebounceBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
            last_event: None,
        }
    }

    /// Record an event at `now`, folding it into any pending status for the path.
    pub fn record(&mut self, path: PathBuf, status: FileStatus, now: Instant) {
        use FileStatus::*;
        let merged = match (self.pending.get(&path).copied(), status) {
            // Still new from the receiver's point of view.
            (Some(Added), Modified) => Added,
            (Some(Deleted), Added) => Modified,
            (_, s) => s,
        };
        self.pending.insert(path, merged);
        self.last_event = Some(now);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the window has elapsed since the last event.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_event {
            Some(at) => !self.pending.is_empty() && now.duration_since(at) >= self.window,
            None => false,
        }
    }

    /// Time left until the buffer is due, if anything is pending.
    pub fn time_left(&self, now: Instant) -> Option<Duration> {
        let at = self.last_event?;
        if self.pending.is_empty() {
            return None;
        }
        Some(self.window.saturating_sub(now.duration_since(at)))
    }

    /// Take every pending change, ordered by path.
    pub fn drain(&mut self) -> Vec<(PathBuf, FileStatus)> {
        self.last_event = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_restarts_on_every_event() {
        let t0 = Instant::now();
        let window = Duration::from_millis(1500);
        let mut buf = DebounceBuffer::new(window);
        assert!(!buf.is_due(t0));

        buf.record("/r/a.rb".into(), FileStatus::Modified, t0);
        assert!(!buf.is_due(t0 + Duration::from_millis(1000)));
        buf.record("/r/b.rb".into(), FileStatus::Added, t0 + Duration::from_millis(1000));
        assert!(!buf.is_due(t0 + Duration::from_millis(2000)));
        assert_eq!(buf.time_left(t0 + Duration::from_millis(2000)), Some(Duration::from_millis(500)));
        assert!(buf.is_due(t0 + Duration::from_millis(2500)));

        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert!(buf.is_empty());
        assert!(!buf.is_due(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn statuses_fold_per_path() {
        let now = Instant::now();
        let mut buf = DebounceBuffer::new(Duration::ZERO);
        buf.record(PathBuf::from("/r/new.rb"), FileStatus::Added, now);
        buf.record(PathBuf::from("/r/new.rb"), FileStatus::Modified, now);
        buf.record(PathBuf::from("/r/swap.rb"), FileStatus::Deleted, now);
        buf.record(PathBuf::from("/r/swap.rb"), FileStatus::Added, now);
        buf.record(PathBuf::from("/r/gone.rb"), FileStatus::Modified, now);
        buf.record(PathBuf::from("/r/gone.rb"), FileStatus::Deleted, now);
        let drained = buf.drain();
        assert_eq!(
            drained,
            vec![
                (PathBuf::from("/r/gone.rb"), FileStatus::Deleted),
                (PathBuf::from("/r/new.rb"), FileStatus::Added),
                (PathBuf::from("/r/swap.rb"), FileStatus::Modified),
            ]
        );
    }
}
