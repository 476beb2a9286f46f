//! Serve, tool-server, watch and gc commands.

use anyhow::Context;
use codeprism_core::CodeprismConfig;
use codeprism_sync::Codeprism;
use codeprism_watch::{run_loop, GitRepo, RepoSession, RepoWatcher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A repository to watch: `name=path`, or a bare path named after its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepoSpec {
    pub name: String,
    pub root: PathBuf,
}

pub(crate) fn parse_repo_spec(raw: &str) -> anyhow::Result<RepoSpec> {
    let (name, path) = match raw.split_once('=') {
        Some((name, path)) => (name.trim().to_string(), PathBuf::from(path.trim())),
        None => {
            let path = PathBuf::from(raw.trim());
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .with_context(|| format!("cannot derive a repository name from '{raw}'"))?;
            (name, path)
        }
    };
    if name.is_empty() {
        anyhow::bail!("empty repository name in '{raw}'");
    }
    Ok(RepoSpec { name, root: path })
}

/// Repositories from the command line, else those with a configured `root`.
pub(crate) fn resolve_repos(args: &[String], config: &CodeprismConfig) -> anyhow::Result<Vec<RepoSpec>> {
    if !args.is_empty() {
        return args.iter().map(|a| parse_repo_spec(a)).collect();
    }
    let mut specs: Vec<RepoSpec> = config
        .repos
        .iter()
        .filter_map(|(name, repo)| {
            repo.root.as_ref().map(|root| RepoSpec {
                name: name.clone(),
                root: PathBuf::from(root),
            })
        })
        .collect();
    specs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(specs)
}

pub(crate) fn cmd_serve(cp: Arc<Codeprism>, bind: Option<String>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| cp.config().server.bind.clone());
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(codeprism_server::serve(cp, &bind))
}

pub(crate) fn cmd_mcp(cp: Arc<Codeprism>) -> anyhow::Result<()> {
    let server = codeprism_mcp::McpServer::new(cp);
    server.run()?;
    Ok(())
}

/// Watch every repository on its own thread until Ctrl-C. With `serve`, the
/// HTTP API runs in the same process.
pub(crate) fn cmd_watch(cp: Arc<Codeprism>, repos: Vec<RepoSpec>, serve: bool) -> anyhow::Result<()> {
    if repos.is_empty() {
        anyhow::bail!("no repositories to watch: pass name=path arguments or set repos.<name>.root in the config");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(repos.len());
    for spec in repos {
        let root = spec
            .root
            .canonicalize()
            .with_context(|| format!("repository path {} is not accessible", spec.root.display()))?;
        let watcher = RepoWatcher::new(&root)?;
        if watcher.is_fallback() {
            tracing::warn!(repo = %spec.name, "watching a reduced scope");
        }
        let mut session = RepoSession::new(&spec.name, &root, Arc::clone(&cp));
        tracing::info!(repo = %spec.name, branch = session.branch(), "watching {}", root.display());

        let config = cp.config().watch.clone();
        let stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(format!("codeprism-watch-{}", spec.name))
            .spawn(move || {
                run_loop(&mut session, watcher.receiver(), &config, &stop);
                drop(watcher);
            })?;
        handles.push(handle);
    }

    let rt = tokio::runtime::Runtime::new()?;
    let result = if serve {
        let bind = cp.config().server.bind.clone();
        rt.block_on(codeprism_server::serve(Arc::clone(&cp), &bind))
    } else {
        rt.block_on(async { tokio::signal::ctrl_c().await.map_err(anyhow::Error::from) })
    };

    stop.store(true, Ordering::SeqCst);
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("watch thread panicked");
        }
    }
    cp.wait_for_reindex();
    result
}

pub(crate) fn cmd_gc(cp: &Codeprism, repo: &str, path: &std::path::Path) -> anyhow::Result<()> {
    let git = GitRepo::new(path);
    let live = git.live_branches()?;
    let report = cp.collect_branches(repo, &live)?;
    println!(
        "GC for {repo}: {} live branches, removed {} file rows, {} cards, pruned {} cards, {} edges, {} flow members",
        live.len(),
        report.file_rows,
        report.deleted_cards.len(),
        report.cards_pruned,
        report.edges,
        report.flow_members
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::RepoConfig;

    #[test]
    fn repo_spec_with_name() {
        let spec = parse_repo_spec("backend=/src/backend").unwrap();
        assert_eq!(spec.name, "backend");
        assert_eq!(spec.root, PathBuf::from("/src/backend"));
    }

    #[test]
    fn repo_spec_from_bare_path() {
        let spec = parse_repo_spec("/src/frontend").unwrap();
        assert_eq!(spec.name, "frontend");
        assert!(parse_repo_spec("=/src/x").is_err());
    }

    #[test]
    fn repos_fall_back_to_config_roots() {
        let mut config = CodeprismConfig::default();
        config.repos.insert(
            "ml".into(),
            RepoConfig {
                root: Some("/src/ml".into()),
                ..Default::default()
            },
        );
        config.repos.insert("docs".into(), RepoConfig::default());
        let specs = resolve_repos(&[], &config).unwrap();
        assert_eq!(specs, vec![RepoSpec { name: "ml".into(), root: "/src/ml".into() }]);

        let explicit = resolve_repos(&["api=/src/api".into()], &config).unwrap();
        assert_eq!(explicit[0].name, "api");
    }
}
