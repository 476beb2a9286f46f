//! File role classification.
//!
//! [`classify_role`] runs at parse time from the path, the parsed structure and
//! per-repository overrides. [`apply_graph_roles`] runs once edges exist and
//! specializes the remaining `domain` files from their graph position.

use codeprism_core::{
    ClassKind, EdgeRelation, FileRole, GraphEdge, ParsedFile, ParsedFragment, RepoConfig,
};
use std::collections::HashMap;

const TEST_SEGMENTS: &[&str] = &["test", "tests", "spec", "specs", "__tests__", "e2e", "cypress", "testdata"];
const TEST_SUFFIXES: &[&str] = &[
    "_test.rb", "_spec.rb", "_test.py", "_test.go", ".test.ts", ".test.tsx", ".test.js",
    ".test.jsx", ".spec.ts", ".spec.tsx", ".spec.js", ".spec.jsx",
];
const CONFIG_SEGMENTS: &[&str] = &["config", "configs", "settings", "initializers", ".github", "deploy", "infra"];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yml", "yaml", "toml", "ini", "env", "lock", "xml", "cfg", "conf"];
const CONFIG_BASENAMES: &[&str] = &[
    "Gemfile", "Rakefile", "Dockerfile", "Makefile", "Procfile", "setup.py", "conftest.py",
    "babel.config.js", "jest.config.js", "jest.config.ts", "vite.config.ts", "vite.config.js",
    "webpack.config.js", "tailwind.config.js", "tailwind.config.ts", "next.config.js",
    "tsconfig.json", "package.json",
];
const ENTRY_BASENAMES: &[&str] = &[
    "main.py", "main.go", "main.ts", "main.js", "main.tsx", "index.ts", "index.js", "index.tsx",
    "app.py", "app.ts", "app.js", "server.ts", "server.js", "manage.py", "wsgi.py", "asgi.py",
    "config.ru", "__main__.py",
];

/// Assign a role from overrides, then path heuristics, then content signals.
pub fn classify_role(path: &str, fragment: &ParsedFragment, repo: Option<&RepoConfig>) -> FileRole {
    if let Some(repo) = repo {
        if repo.test_dirs.iter().any(|d| path.starts_with(d.as_str())) {
            return FileRole::Test;
        }
        if repo.entry_points.iter().any(|e| e == path) {
            return FileRole::EntryPoint;
        }
        if repo.excludes_from_graph(path) {
            return FileRole::Config;
        }
    }

    let segments: Vec<&str> = path.split('/').collect();
    let basename = segments.last().copied().unwrap_or(path);
    let dirs = &segments[..segments.len().saturating_sub(1)];

    if dirs.iter().any(|d| TEST_SEGMENTS.contains(d))
        || TEST_SUFFIXES.iter().any(|s| basename.ends_with(s))
        || (basename.starts_with("test_") && basename.ends_with(".py"))
    {
        return FileRole::Test;
    }

    let extension = basename.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    if CONFIG_BASENAMES.contains(&basename)
        || CONFIG_EXTENSIONS.contains(&extension)
        || basename.starts_with(".env")
        || dirs.iter().any(|d| CONFIG_SEGMENTS.contains(d))
    {
        return FileRole::Config;
    }

    if ENTRY_BASENAMES.contains(&basename) || dirs.first() == Some(&"bin") {
        return FileRole::EntryPoint;
    }

    if fragment.classes.iter().any(|c| c.kind == ClassKind::Test) {
        return FileRole::Test;
    }

    FileRole::Domain
}

/// Specialize `domain` files using the built graph. Returns how many roles changed.
///
/// A domain file imported by at least `hub_threshold` files becomes an entry point;
/// a remaining domain file with a polymorphic or `*able` association becomes a
/// shared utility. Other roles are never touched.
pub fn apply_graph_roles(files: &mut [ParsedFile], edges: &[GraphEdge], hub_threshold: usize) -> usize {
    let mut inbound: HashMap<(&str, &str), usize> = HashMap::new();
    for edge in edges.iter().filter(|e| e.relation == EdgeRelation::Import) {
        *inbound
            .entry((edge.target_repository.as_str(), edge.target_file.as_str()))
            .or_default() += 1;
    }

    let mut changed = 0;
    for file in files.iter_mut() {
        if file.role != FileRole::Domain {
            continue;
        }
        let count = inbound
            .get(&(file.repository.as_str(), file.path.as_str()))
            .copied()
            .unwrap_or(0);
        if hub_threshold > 0 && count >= hub_threshold {
            file.role = FileRole::EntryPoint;
            changed += 1;
        } else if file
            .structure
            .associations
            .iter()
            .any(|a| a.polymorphic || a.name.ends_with("able"))
        {
            file.role = FileRole::SharedUtility;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::{Association, ClassInfo};

    fn empty() -> ParsedFragment {
        ParsedFragment::empty("ruby")
    }

    #[test]
    fn path_heuristics() {
        let f = empty();
        assert_eq!(classify_role("spec/models/patient_spec.rb", &f, None), FileRole::Test);
        assert_eq!(classify_role("src/Button.test.tsx", &f, None), FileRole::Test);
        assert_eq!(classify_role("billing/test_invoice.py", &f, None), FileRole::Test);
        assert_eq!(classify_role("config/routes.rb", &f, None), FileRole::Config);
        assert_eq!(classify_role("package.json", &f, None), FileRole::Config);
        assert_eq!(classify_role("deploy/values.yaml", &f, None), FileRole::Config);
        assert_eq!(classify_role("src/index.ts", &f, None), FileRole::EntryPoint);
        assert_eq!(classify_role("cmd/api/main.go", &f, None), FileRole::EntryPoint);
        assert_eq!(classify_role("app/models/patient.rb", &f, None), FileRole::Domain);
    }

    #[test]
    fn overrides_win_over_heuristics() {
        let repo = RepoConfig {
            test_dirs: vec!["qa/".into()],
            entry_points: vec!["lib/boot.rb".into()],
            exclude_graph: vec!["vendor_shims/".into()],
            ..Default::default()
        };
        let f = empty();
        assert_eq!(classify_role("qa/flows.rb", &f, Some(&repo)), FileRole::Test);
        assert_eq!(classify_role("lib/boot.rb", &f, Some(&repo)), FileRole::EntryPoint);
        assert_eq!(classify_role("vendor_shims/x.rb", &f, Some(&repo)), FileRole::Config);
    }

    #[test]
    fn test_class_forces_test_role() {
        let mut f = empty();
        f.classes.push(ClassInfo {
            name: "PatientTest".into(),
            parent: None,
            kind: ClassKind::Test,
            line: 1,
        });
        assert_eq!(classify_role("lib/checks/patient.rb", &f, None), FileRole::Test);
    }

    fn file(path: &str, role: FileRole) -> ParsedFile {
        let mut f = ParsedFile::new(path, "backend", "main", empty());
        f.role = role;
        f
    }

    fn import(from: &str, to: &str) -> GraphEdge {
        GraphEdge::new(EdgeRelation::Import, ("backend", from), ("backend", to))
    }

    #[test]
    fn hub_promotion_respects_threshold_and_existing_roles() {
        let mut files = vec![
            file("lib/money.rb", FileRole::Domain),
            file("lib/util.rb", FileRole::Domain),
            file("spec/helper.rb", FileRole::Test),
        ];
        let edges = vec![
            import("a.rb", "lib/money.rb"),
            import("b.rb", "lib/money.rb"),
            import("c.rb", "lib/money.rb"),
            import("a.rb", "lib/util.rb"),
            import("a.rb", "spec/helper.rb"),
            import("b.rb", "spec/helper.rb"),
            import("c.rb", "spec/helper.rb"),
        ];
        let changed = apply_graph_roles(&mut files, &edges, 3);
        assert_eq!(changed, 1);
        assert_eq!(files[0].role, FileRole::EntryPoint);
        assert_eq!(files[1].role, FileRole::Domain);
        assert_eq!(files[2].role, FileRole::Test);
    }

    #[test]
    fn polymorphic_and_able_associations_become_shared_utility() {
        let mut poly = file("app/models/comment.rb", FileRole::Domain);
        poly.structure.associations.push(Association {
            kind: "belongs_to".into(),
            name: "commentable".into(),
            owner: Some("Comment".into()),
            class_name: None,
            through: None,
            polymorphic: false,
        });
        let mut files = vec![poly, file("app/models/plain.rb", FileRole::Domain)];
        assert_eq!(apply_graph_roles(&mut files, &[], 5), 1);
        assert_eq!(files[0].role, FileRole::SharedUtility);
        assert_eq!(files[1].role, FileRole::Domain);
    }
}
