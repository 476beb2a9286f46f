//! Git plumbing via `git` subprocesses.

use codeprism_core::{CodeprismError, FileStatus};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

/// Run `git <args>` in `cwd` and return trimmed stdout.
pub fn git_command(args: &[&str], cwd: &Path) -> Result<String, CodeprismError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| CodeprismError::Git(format!("failed to execute git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CodeprismError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Parse `git diff --name-status -M` output. A rename becomes a delete of the
/// old path plus an add of the new one; copies are adds.
pub fn parse_name_status(output: &str) -> Result<Vec<(FileStatus, String)>, CodeprismError> {
    let mut out = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let parts: Vec<&str> = line.split('\t').collect();
        let code = parts[0].chars().next().unwrap_or(' ');
        match (code, parts.as_slice()) {
            ('R', [_, old, new]) => {
                out.push((FileStatus::Deleted, old.to_string()));
                out.push((FileStatus::Added, new.to_string()));
            }
            ('C', [_, _, new]) | ('A', [_, new]) => out.push((FileStatus::Added, new.to_string())),
            ('M' | 'T', [_, path]) => out.push((FileStatus::Modified, path.to_string())),
            ('D', [_, path]) => out.push((FileStatus::Deleted, path.to_string())),
            _ => return Err(CodeprismError::Git(format!("unexpected diff line: {line}"))),
        }
    }
    Ok(out)
}

/// A checked-out repository.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> PathBuf {
        self.root.join(".git")
    }

    pub fn is_repo(&self) -> bool {
        self.git_dir().exists()
    }

    /// Current branch name; `HEAD` when detached.
    pub fn current_branch(&self) -> Result<String, CodeprismError> {
        git_command(&["rev-parse", "--abbrev-ref", "HEAD"], &self.root)
    }

    pub fn rev_parse(&self, rev: &str) -> Result<String, CodeprismError> {
        git_command(&["rev-parse", "--verify", rev], &self.root)
    }

    pub fn head_commit(&self) -> Result<String, CodeprismError> {
        self.rev_parse("HEAD")
    }

    /// Files changed between two commits.
    pub fn changed_files(&self, from: &str, to: &str) -> Result<Vec<(FileStatus, String)>, CodeprismError> {
        parse_name_status(&git_command(&["diff", "--name-status", "-M", from, to], &self.root)?)
    }

    /// Local branch names.
    pub fn live_branches(&self) -> Result<Vec<String>, CodeprismError> {
        Ok(git_command(&["for-each-ref", "--format=%(refname:short)", "refs/heads"], &self.root)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Time since `.git/FETCH_HEAD` was last written, if it exists.
    pub fn fetch_head_age(&self) -> Option<Duration> {
        let modified = std::fs::metadata(self.git_dir().join("FETCH_HEAD")).ok()?.modified().ok()?;
        SystemTime::now().duration_since(modified).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_split_into_delete_and_add() {
        let out = "M\tapp/models/patient.rb\nR087\tapp/old.rb\tapp/new.rb\nA\tlib/x.rb\nD\tgone.py\nC100\ta.ts\tb.ts\n";
        let parsed = parse_name_status(out).unwrap();
        assert_eq!(
            parsed,
            vec![
                (FileStatus::Modified, "app/models/patient.rb".to_string()),
                (FileStatus::Deleted, "app/old.rb".to_string()),
                (FileStatus::Added, "app/new.rb".to_string()),
                (FileStatus::Added, "lib/x.rb".to_string()),
                (FileStatus::Deleted, "gone.py".to_string()),
                (FileStatus::Added, "b.ts".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(parse_name_status("X\tweird").is_err());
        assert!(parse_name_status("R100\tonly-one").is_err());
        assert!(parse_name_status("").unwrap().is_empty());
    }

    #[test]
    fn reads_a_real_repository() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        if git_command(&["init", "-q", "-b", "main"], root).is_err() {
            return; // git unavailable
        }
        let _ = git_command(&["config", "user.email", "t@example.com"], root);
        let _ = git_command(&["config", "user.name", "t"], root);
        std::fs::write(root.join("a.rb"), "class A; end\n").unwrap();
        git_command(&["add", "."], root).unwrap();
        git_command(&["commit", "-q", "-m", "one"], root).unwrap();
        let first = GitRepo::new(root).head_commit().unwrap();

        std::fs::rename(root.join("a.rb"), root.join("b.rb")).unwrap();
        git_command(&["add", "-A"], root).unwrap();
        git_command(&["commit", "-q", "-m", "two"], root).unwrap();

        let repo = GitRepo::new(root);
        assert!(repo.is_repo());
        assert_eq!(repo.current_branch().unwrap(), "main");
        assert_eq!(repo.live_branches().unwrap(), vec!["main"]);
        let changes = repo.changed_files(&first, "HEAD").unwrap();
        assert_eq!(
            changes,
            vec![(FileStatus::Deleted, "a.rb".to_string()), (FileStatus::Added, "b.rb".to_string())]
        );
        assert!(repo.fetch_head_age().is_none());
    }
}
