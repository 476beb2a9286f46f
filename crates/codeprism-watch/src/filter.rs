//! Which filesystem events are worth syncing.

use std::path::{Component, Path};

/// Directory names never synced.
const IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "tmp",
    "log",
    "coverage",
    "dist",
    "build",
    "target",
    ".next",
    ".nuxt",
    ".cache",
    "__pycache__",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".bundle",
    "packs",
];

/// Source and config extensions that feed the file index.
const WATCHABLE_EXTENSIONS: &[&str] = &[
    "rb", "rake", "erb", "py", "ts", "tsx", "js", "jsx", "mjs", "cjs", "go", "json", "yml", "yaml",
    "toml", "sql", "css", "scss", "sass", "less", "md",
];

/// Extension-less files that still matter.
const WATCHABLE_NAMES: &[&str] = &["Gemfile", "Rakefile", "Dockerfile", "Procfile", "Makefile"];

/// Check if a file extension or name is on the allow-list.
pub fn is_watchable(path: &Path) -> bool {
    let by_ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| WATCHABLE_EXTENSIONS.contains(&ext))
        .unwrap_or(false);
    by_ext
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| WATCHABLE_NAMES.contains(&n))
            .unwrap_or(false)
}

/// Check if a (repository-relative) path sits inside an ignored directory.
pub fn should_ignore(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name.to_str().map(|n| IGNORE_DIRS.contains(&n)).unwrap_or(false),
        _ => false,
    })
}

/// Repository-relative path with `/` separators, if `path` is under `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list() {
        assert!(is_watchable(Path::new("app/models/patient.rb")));
        assert!(is_watchable(Path::new("src/api.tsx")));
        assert!(is_watchable(Path::new("db/schema.rb")));
        assert!(is_watchable(Path::new("Gemfile")));
        assert!(!is_watchable(Path::new("public/logo.png")));
        assert!(!is_watchable(Path::new("bin/server.exe")));
    }

    #[test]
    fn deny_list() {
        assert!(should_ignore(Path::new("node_modules/react/index.js")));
        assert!(should_ignore(Path::new(".git/objects/ab/cd")));
        assert!(should_ignore(Path::new("tmp/cache/x.rb")));
        assert!(!should_ignore(Path::new("app/builders/invoice.rb")));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/work/backend");
        assert_eq!(
            relative_path(root, Path::new("/work/backend/app/models/patient.rb")).as_deref(),
            Some("app/models/patient.rb")
        );
        assert_eq!(relative_path(root, Path::new("/elsewhere/x.rb")), None);
        assert_eq!(relative_path(root, root), None);
    }
}
