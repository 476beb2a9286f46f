//! Single-flight controller for the background reindex job.

use chrono::{DateTime, Utc};
use codeprism_core::CodeprismError;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexState {
    Idle,
    Running,
    Done,
    Error,
}

impl ReindexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ReindexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counters of one refresh run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexStatus {
    pub state: ReindexState,
    /// Repository the last run was scoped to; `None` means every repository.
    pub repo: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub refreshed: usize,
    pub failed: usize,
    pub message: Option<String>,
}

impl Default for ReindexStatus {
    fn default() -> Self {
        Self {
            state: ReindexState::Idle,
            repo: None,
            started_at: None,
            finished_at: None,
            refreshed: 0,
            failed: 0,
            message: None,
        }
    }
}

/// Runs at most one reindex job at a time. A start request while a job is
/// running is dropped, not queued.
#[derive(Default)]
pub struct ReindexController {
    status: Arc<Mutex<ReindexStatus>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReindexController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ReindexStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    pub fn is_running(&self) -> bool {
        self.status().state == ReindexState::Running
    }

    /// Start `job` on a background thread unless one is already running.
    /// Returns whether a job was started.
    pub fn try_start<F>(&self, repo: Option<String>, job: F) -> Result<bool, CodeprismError>
    where
        F: FnOnce() -> Result<RefreshReport, CodeprismError> + Send + 'static,
    {
        {
            let mut status = self
                .status
                .lock()
                .map_err(|e| CodeprismError::LockPoisoned(format!("reindex status: {e}")))?;
            if status.state == ReindexState::Running {
                tracing::debug!("reindex already running, request dropped");
                return Ok(false);
            }
            *status = ReindexStatus {
                state: ReindexState::Running,
                repo: repo.clone(),
                started_at: Some(Utc::now()),
                ..Default::default()
            };
        }

        let status = Arc::clone(&self.status);
        let spawned = std::thread::Builder::new()
            .name("codeprism-reindex".into())
            .spawn(move || {
                let outcome = job();
                let Ok(mut s) = status.lock() else {
                    return;
                };
                s.finished_at = Some(Utc::now());
                match outcome {
                    Ok(report) => {
                        s.state = ReindexState::Done;
                        s.refreshed = report.refreshed;
                        s.failed = report.failed;
                        tracing::info!(refreshed = report.refreshed, failed = report.failed, "reindex finished");
                    }
                    Err(e) => {
                        tracing::error!("reindex failed: {e}");
                        s.state = ReindexState::Error;
                        s.message = Some(e.to_string());
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                let mut slot = self
                    .handle
                    .lock()
                    .map_err(|e| CodeprismError::LockPoisoned(format!("reindex handle: {e}")))?;
                // The previous job has finished; its handle can go.
                *slot = Some(handle);
                tracing::info!(repo = repo.as_deref().unwrap_or("*"), "reindex started");
                Ok(true)
            }
            Err(e) => {
                if let Ok(mut s) = self.status.lock() {
                    s.state = ReindexState::Error;
                    s.message = Some(e.to_string());
                    s.finished_at = Some(Utc::now());
                }
                Err(CodeprismError::Internal(format!("spawn reindex thread: {e}")))
            }
        }
    }

    /// Block until the current job, if any, has finished.
    pub fn wait(&self) {
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn runs_to_done_and_records_counts() {
        let ctl = ReindexController::new();
        assert_eq!(ctl.status().state, ReindexState::Idle);
        assert!(ctl
            .try_start(Some("backend".into()), || Ok(RefreshReport { refreshed: 3, failed: 1 }))
            .unwrap());
        ctl.wait();
        let s = ctl.status();
        assert_eq!(s.state, ReindexState::Done);
        assert_eq!((s.refreshed, s.failed), (3, 1));
        assert_eq!(s.repo.as_deref(), Some("backend"));
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn second_start_while_running_is_dropped() {
        let ctl = ReindexController::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        assert!(ctl
            .try_start(None, move || {
                let _ = release_rx.recv();
                Ok(RefreshReport::default())
            })
            .unwrap());
        assert!(ctl.is_running());
        assert!(!ctl.try_start(None, || Ok(RefreshReport::default())).unwrap());

        release_tx.send(()).unwrap();
        ctl.wait();
        assert_eq!(ctl.status().state, ReindexState::Done);
        // Idle again: a new run is accepted.
        assert!(ctl.try_start(None, || Ok(RefreshReport::default())).unwrap());
        ctl.wait();
    }

    #[test]
    fn failing_job_ends_in_error() {
        let ctl = ReindexController::new();
        ctl.try_start(None, || Err(CodeprismError::Generation("offline".into())))
            .unwrap();
        ctl.wait();
        let s = ctl.status();
        assert_eq!(s.state, ReindexState::Error);
        assert!(s.message.unwrap().contains("offline"));
    }
}
