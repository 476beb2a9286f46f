//! Per-repository watch state: turns file and git events into sync calls.

use crate::branch::{classify_branch, extract_branch_context};
use crate::filter::relative_path;
use crate::git::GitRepo;
use codeprism_core::{
    ActiveContext, ChangedFile, CodeprismError, EventType, FileStatus, SyncLevel, SyncRequest, SyncResponse,
};
use codeprism_sync::Codeprism;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Branch assumed when the checkout is not a git repository.
const DEFAULT_BRANCH: &str = "main";

pub struct RepoSession {
    name: String,
    git: GitRepo,
    cp: Arc<Codeprism>,
    branch: String,
    level: SyncLevel,
    head: Option<String>,
}

impl RepoSession {
    pub fn new(name: &str, root: impl Into<PathBuf>, cp: Arc<Codeprism>) -> Self {
        let git = GitRepo::new(root);
        let branch = match git.current_branch() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(repo = name, "no git branch ({e}), assuming {DEFAULT_BRANCH}");
                DEFAULT_BRANCH.to_string()
            }
        };
        let head = git.head_commit().ok();
        let level = classify_branch(&branch);
        Self {
            name: name.to_string(),
            git,
            cp,
            branch,
            level,
            head,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        self.git.root()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn sync_level(&self) -> SyncLevel {
        self.level
    }

    /// Sync debounced file events as one save. Nothing is sent while the
    /// checkout is on a skipped branch.
    pub fn flush(&self, changes: Vec<(PathBuf, FileStatus)>) -> Result<SyncResponse, CodeprismError> {
        if self.level == SyncLevel::Skip {
            tracing::debug!(repo = %self.name, branch = %self.branch, files = changes.len(), "skipped branch, dropping saves");
            return Ok(SyncResponse::default());
        }
        let mut rel = Vec::with_capacity(changes.len());
        for (path, status) in changes {
            let Some(path) = relative_path(self.root(), &path) else {
                continue;
            };
            // The watcher cannot tell creations from edits; the file index can.
            let status = match status {
                FileStatus::Modified
                    if self.cp.storage().get_file(&self.name, &self.branch, &path)?.is_none() =>
                {
                    FileStatus::Added
                }
                s => s,
            };
            rel.push((status, path));
        }
        self.sync_changes(rel, EventType::Save, false)
    }

    /// Read contents and send `changes` in batches no larger than the limit.
    fn sync_changes(
        &self,
        changes: Vec<(FileStatus, String)>,
        event_type: EventType,
        full_sync: bool,
    ) -> Result<SyncResponse, CodeprismError> {
        let mut files = Vec::with_capacity(changes.len());
        for (status, path) in changes {
            let (status, content) = match status {
                FileStatus::Deleted => (FileStatus::Deleted, None),
                s => match std::fs::read_to_string(self.root().join(&path)) {
                    Ok(content) => (s, Some(content)),
                    Err(e) if e.kind() == ErrorKind::NotFound => (FileStatus::Deleted, None),
                    Err(e) => {
                        tracing::debug!(path = %path, "skipping unreadable file: {e}");
                        continue;
                    }
                },
            };
            files.push(ChangedFile { path, content, status });
        }

        let mut total = SyncResponse::default();
        let limit = self.cp.config().sync.batch_size_limit.max(1);
        for chunk in files.chunks(limit) {
            let mut req = SyncRequest::new(&self.name, &self.branch, event_type);
            req.commit_sha = self.head.clone();
            req.full_sync = full_sync;
            req.changed_files = chunk.to_vec();
            let resp = self.cp.handle_sync(&req)?;
            total.indexed += resp.indexed;
            total.invalidated += resp.invalidated;
        }
        Ok(total)
    }

    /// Handle a write to `.git/HEAD`. Returns the sync level when the branch
    /// actually changed.
    pub fn on_head_changed(&mut self) -> Result<Option<SyncLevel>, CodeprismError> {
        let branch = self.git.current_branch()?;
        let head = self.git.head_commit().ok();
        if branch == self.branch && head == self.head {
            return Ok(None);
        }
        let previous = std::mem::replace(&mut self.branch, branch.clone());
        let level = classify_branch(&branch);
        self.level = level;
        let context = extract_branch_context(&branch, Some(&previous));
        tracing::info!(
            repo = %self.name,
            from = %previous,
            to = %branch,
            level = %level,
            ticket = context.ticket_id.as_deref().unwrap_or("-"),
            "branch switch"
        );
        self.cp.set_active_context(&ActiveContext {
            repository: self.name.clone(),
            branch: branch.clone(),
            sync_level: level,
            context,
            updated_at: chrono::Utc::now(),
        })?;

        if level != SyncLevel::Skip {
            if let (Some(old), Some(new)) = (self.head.as_deref(), head.as_deref()) {
                if old != new {
                    let changes = self.git.changed_files(old, new)?;
                    let resp = self.sync_changes(changes, EventType::Checkout, level == SyncLevel::Full)?;
                    tracing::debug!(indexed = resp.indexed, invalidated = resp.invalidated, "checkout synced");
                }
            }
        }
        self.head = head;
        Ok(Some(level))
    }

    /// Handle a write to `.git/ORIG_HEAD`: sync the merge or pull, then run
    /// branch GC for the repository.
    pub fn on_orig_head_changed(&mut self, pull_window: Duration) -> Result<SyncResponse, CodeprismError> {
        let event_type = match self.git.fetch_head_age() {
            Some(age) if age <= pull_window => EventType::Pull,
            _ => EventType::Merge,
        };
        let head = self.git.head_commit()?;
        let orig = self.git.rev_parse("ORIG_HEAD")?;
        self.head = Some(head.clone());
        let resp = if orig != head && self.level != SyncLevel::Skip {
            let changes = self.git.changed_files(&orig, &head)?;
            self.sync_changes(changes, event_type, false)?
        } else {
            SyncResponse::default()
        };
        tracing::info!(
            repo = %self.name,
            event = %event_type,
            indexed = resp.indexed,
            invalidated = resp.invalidated,
            "merge synced"
        );

        match self.git.live_branches() {
            Ok(live) => {
                self.cp.collect_branches(&self.name, &live)?;
            }
            Err(e) => tracing::warn!(repo = %self.name, "branch gc skipped: {e}"),
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::CodeprismConfig;

    fn service() -> Arc<Codeprism> {
        Arc::new(Codeprism::in_memory(CodeprismConfig::default()).unwrap())
    }

    #[test]
    fn flush_reads_content_and_detects_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("app/models")).unwrap();
        std::fs::write(root.join("app/models/patient.rb"), "class Patient; end\n").unwrap();

        let cp = service();
        let session = RepoSession::new("backend", root, Arc::clone(&cp));
        assert_eq!(session.branch(), "main");

        let resp = session
            .flush(vec![
                (root.join("app/models/patient.rb"), FileStatus::Modified),
                (root.join("app/models/missing.rb"), FileStatus::Modified),
                (PathBuf::from("/outside/root.rb"), FileStatus::Modified),
            ])
            .unwrap();
        assert_eq!(resp.indexed, 2);
        let entry = cp.storage().get_file("backend", "main", "app/models/patient.rb").unwrap().unwrap();
        assert_eq!(entry.parsed.structure.classes[0].name, "Patient");
        assert!(cp.storage().get_file("backend", "main", "app/models/missing.rb").unwrap().is_none());
    }

    #[test]
    fn large_flushes_are_split_into_batches() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut config = CodeprismConfig::default();
        config.sync.batch_size_limit = 2;
        let cp = Arc::new(Codeprism::in_memory(config).unwrap());
        let mut changes = Vec::new();
        for i in 0..5 {
            let path = root.join(format!("lib/f{i}.py"));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "x = 1\n").unwrap();
            changes.push((path, FileStatus::Added));
        }
        let session = RepoSession::new("ml", root, cp);
        assert_eq!(session.flush(changes).unwrap().indexed, 5);
    }
}
