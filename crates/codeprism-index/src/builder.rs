//! Graph builder: resolves parsed references into directed file-to-file edges.
//!
//! Resolution never requires files to share a repository. When several files
//! match one reference the builder picks a single deterministic winner
//! (same repository first, then the shortest path, then lexicographic order).

use crate::endpoints::{self, Segment};
use crate::inflect::{camelize, singularize};
use codeprism_core::{ClassKind, EdgeRelation, GraphEdge, ParsedFile, Route};
use std::collections::{HashMap, HashSet};

/// Build every edge implied by `files`.
pub fn build_graph(files: &[ParsedFile]) -> Vec<GraphEdge> {
    GraphBuilder::new(files).build()
}

struct RouteEntry<'a> {
    route: &'a Route,
    segments: Vec<Segment>,
    handler: usize,
}

pub struct GraphBuilder<'a> {
    files: &'a [ParsedFile],
    /// Every `/`-boundary suffix of each path with its extension removed.
    stem_suffixes: HashMap<String, Vec<usize>>,
    /// Every `/`-boundary suffix of each file's directory.
    dir_suffixes: HashMap<String, Vec<usize>>,
    /// Class name (full and last segment) to declaring files.
    classes: HashMap<String, Vec<(usize, ClassKind)>>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(files: &'a [ParsedFile]) -> Self {
        let mut stem_suffixes: HashMap<String, Vec<usize>> = HashMap::new();
        let mut dir_suffixes: HashMap<String, Vec<usize>> = HashMap::new();
        let mut classes: HashMap<String, Vec<(usize, ClassKind)>> = HashMap::new();

        for (idx, file) in files.iter().enumerate() {
            for suffix in suffixes(stem(&file.path)) {
                stem_suffixes.entry(suffix.to_string()).or_default().push(idx);
            }
            if let Some((dir, _)) = file.path.rsplit_once('/') {
                for suffix in suffixes(dir) {
                    dir_suffixes.entry(suffix.to_string()).or_default().push(idx);
                }
            }
            for class in &file.structure.classes {
                if class.kind == ClassKind::Test {
                    continue;
                }
                classes
                    .entry(class.name.clone())
                    .or_default()
                    .push((idx, class.kind));
                let short = last_segment(&class.name);
                if short != class.name {
                    classes.entry(short.to_string()).or_default().push((idx, class.kind));
                }
            }
        }

        Self {
            files,
            stem_suffixes,
            dir_suffixes,
            classes,
        }
    }

    pub fn build(&self) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        let mut seen: HashSet<(usize, usize, EdgeRelation)> = HashSet::new();
        let routes = self.route_table();

        let mut push = |from: usize, to: usize, relation: EdgeRelation, meta: &[(&str, String)]| {
            if from == to || !seen.insert((from, to, relation)) {
                return;
            }
            let source = &self.files[from];
            let target = &self.files[to];
            let mut edge = GraphEdge::new(
                relation,
                (&source.repository, &source.path),
                (&target.repository, &target.path),
            );
            for (k, v) in meta {
                edge = edge.with_meta(k, v.clone());
            }
            edges.push(edge);
        };

        for (idx, file) in self.files.iter().enumerate() {
            for spec in &file.structure.imports {
                if let Some(target) = self.resolve_import(idx, spec) {
                    push(idx, target, EdgeRelation::Import, &[("import", spec.clone())]);
                }
            }

            for class in &file.structure.classes {
                let Some(parent) = class.parent.as_deref() else {
                    continue;
                };
                if let Some((target, parent_kind)) = self.resolve_class(idx, parent, false) {
                    let is_model = class.kind == ClassKind::Model || parent_kind == ClassKind::Model;
                    if is_model {
                        push(
                            idx,
                            target,
                            EdgeRelation::ModelAssociation,
                            &[
                                ("associationType", "inherits".to_string()),
                                ("parent", parent.to_string()),
                            ],
                        );
                    } else {
                        push(idx, target, EdgeRelation::Inherits, &[("parent", parent.to_string())]);
                    }
                }
            }

            for assoc in &file.structure.associations {
                if assoc.polymorphic {
                    continue;
                }
                let class_name = assoc.class_name.clone().unwrap_or_else(|| {
                    if assoc.kind == "has_many" || assoc.kind == "has_and_belongs_to_many" {
                        camelize(&singularize(&assoc.name))
                    } else {
                        camelize(&assoc.name)
                    }
                });
                if let Some((target, _)) = self.resolve_class(idx, &class_name, true) {
                    push(
                        idx,
                        target,
                        EdgeRelation::ModelAssociation,
                        &[
                            ("associationType", assoc.kind.clone()),
                            ("name", assoc.name.clone()),
                        ],
                    );
                }
            }

            for call in &file.structure.api_calls {
                if let Some(entry) = self.match_route(&routes, &call.method, &call.url) {
                    push(
                        idx,
                        entry.handler,
                        EdgeRelation::ApiEndpoint,
                        &[
                            ("method", call.method.clone()),
                            ("path", entry.route.path.clone()),
                        ],
                    );
                }
            }
        }

        edges
    }

    // ── Imports ───────────────────────────────────────────────────────────

    fn resolve_import(&self, from: usize, spec: &str) -> Option<usize> {
        let file = &self.files[from];
        let dir = file.path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        match file.language() {
            "ruby" => {
                if spec.starts_with('.') {
                    let target = join_relative(dir, spec)?;
                    self.exact(from, &target)
                } else {
                    self.by_suffix(from, spec)
                }
            }
            "python" => {
                if spec.starts_with('.') {
                    let dots = spec.chars().take_while(|c| *c == '.').count();
                    let mut base = dir.to_string();
                    for _ in 1..dots {
                        base = base.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default();
                    }
                    let rest = spec[dots..].replace('.', "/");
                    let target = [base.as_str(), rest.as_str()]
                        .iter()
                        .filter(|s| !s.is_empty())
                        .copied()
                        .collect::<Vec<_>>()
                        .join("/");
                    self.exact(from, &target)
                        .or_else(|| self.exact(from, &format!("{target}/__init__")))
                } else {
                    let path = spec.replace('.', "/");
                    self.by_suffix(from, &path)
                        .or_else(|| self.by_suffix(from, &format!("{path}/__init__")))
                }
            }
            "typescript" | "javascript" => {
                if spec.starts_with("./") || spec.starts_with("../") {
                    let target = join_relative(dir, spec)?;
                    let target = stem(&target).to_string();
                    self.exact(from, &target)
                        .or_else(|| self.exact(from, &format!("{target}/index")))
                } else {
                    let rest = spec
                        .strip_prefix("@/")
                        .or_else(|| spec.strip_prefix("~/"))
                        .or_else(|| spec.strip_prefix("#/"))
                        .unwrap_or(spec)
                        .trim_start_matches('@');
                    // Bare package names never resolve to a source file.
                    if !rest.contains('/') && rest.len() == spec.len() {
                        return None;
                    }
                    self.by_suffix(from, rest)
                        .or_else(|| self.by_suffix(from, &format!("{rest}/index")))
                }
            }
            "go" => {
                let comps: Vec<&str> = spec.split('/').collect();
                if comps.len() < 2 {
                    return None;
                }
                for start in 0..=comps.len() - 2 {
                    let suffix = comps[start..].join("/");
                    let Some(candidates) = self.dir_suffixes.get(&suffix) else {
                        continue;
                    };
                    let eligible: Vec<usize> = candidates
                        .iter()
                        .copied()
                        .filter(|&c| {
                            let f = &self.files[c];
                            f.language() == "go"
                                && !f.path.ends_with("_test.go")
                                && f.path.rsplit_once('/').is_some_and(|(d, _)| d.ends_with(&suffix))
                        })
                        .collect();
                    if let Some(found) = self.pick(from, &eligible) {
                        return Some(found);
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// Exact stem within the importing file's repository.
    fn exact(&self, from: usize, target_stem: &str) -> Option<usize> {
        let repo = &self.files[from].repository;
        let candidates: Vec<usize> = self
            .stem_suffixes
            .get(target_stem)?
            .iter()
            .copied()
            .filter(|&c| {
                let f = &self.files[c];
                &f.repository == repo && stem(&f.path) == target_stem && same_family(&self.files[from], f)
            })
            .collect();
        self.pick(from, &candidates)
    }

    /// Library-root / package-suffix match across all repositories.
    fn by_suffix(&self, from: usize, suffix: &str) -> Option<usize> {
        let suffix = suffix.trim_matches('/');
        if suffix.is_empty() {
            return None;
        }
        let candidates: Vec<usize> = self
            .stem_suffixes
            .get(suffix)?
            .iter()
            .copied()
            .filter(|&c| same_family(&self.files[from], &self.files[c]))
            .collect();
        self.pick(from, &candidates)
    }

    // ── Classes ───────────────────────────────────────────────────────────

    fn resolve_class(&self, from: usize, name: &str, prefer_models: bool) -> Option<(usize, ClassKind)> {
        let candidates = self
            .classes
            .get(name)
            .or_else(|| self.classes.get(last_segment(name)))?;
        let eligible: Vec<(usize, ClassKind)> = candidates
            .iter()
            .copied()
            .filter(|(idx, _)| same_family(&self.files[from], &self.files[*idx]))
            .collect();
        let models: Vec<usize> = eligible
            .iter()
            .filter(|(_, k)| *k == ClassKind::Model)
            .map(|(i, _)| *i)
            .collect();
        let pool: Vec<usize> = if prefer_models && !models.is_empty() {
            models
        } else {
            eligible.iter().map(|(i, _)| *i).collect()
        };
        let chosen = self.pick(from, &pool)?;
        let kind = eligible
            .iter()
            .find(|(i, _)| *i == chosen)
            .map(|(_, k)| *k)
            .unwrap_or_default();
        Some((chosen, kind))
    }

    // ── Routes ────────────────────────────────────────────────────────────

    fn route_table(&self) -> Vec<RouteEntry<'a>> {
        let mut table = Vec::new();
        for (idx, file) in self.files.iter().enumerate() {
            for route in &file.structure.routes {
                let Some(segments) = endpoints::normalize(&route.path) else {
                    continue;
                };
                let handler = route
                    .controller
                    .as_deref()
                    .and_then(|c| self.controller_file(idx, c))
                    .unwrap_or(idx);
                table.push(RouteEntry {
                    route,
                    segments,
                    handler,
                });
            }
        }
        table
    }

    fn controller_file(&self, routes_file: usize, controller: &str) -> Option<usize> {
        let repo = &self.files[routes_file].repository;
        let key = format!("controllers/{controller}_controller");
        let candidates: Vec<usize> = self
            .stem_suffixes
            .get(&key)?
            .iter()
            .copied()
            .filter(|&c| &self.files[c].repository == repo)
            .collect();
        self.pick(routes_file, &candidates)
    }

    fn match_route<'r>(
        &self,
        routes: &'r [RouteEntry<'a>],
        method: &str,
        url: &str,
    ) -> Option<&'r RouteEntry<'a>> {
        let call = endpoints::normalize(url)?;
        routes
            .iter()
            .filter(|r| endpoints::methods_compatible(&r.route.method, method))
            .filter(|r| endpoints::matches(&r.segments, &call))
            .min_by(|a, b| {
                endpoints::kind_mismatches(&a.segments, &call)
                    .cmp(&endpoints::kind_mismatches(&b.segments, &call))
                    .then_with(|| endpoints::param_count(&a.segments).cmp(&endpoints::param_count(&b.segments)))
                    .then_with(|| self.files[a.handler].path.cmp(&self.files[b.handler].path))
                    .then_with(|| {
                        self.files[a.handler]
                            .repository
                            .cmp(&self.files[b.handler].repository)
                    })
            })
    }

    // ── Tie-break ─────────────────────────────────────────────────────────

    fn pick(&self, from: usize, candidates: &[usize]) -> Option<usize> {
        let repo = &self.files[from].repository;
        candidates
            .iter()
            .copied()
            .filter(|&c| c != from)
            .min_by(|&a, &b| {
                let fa = &self.files[a];
                let fb = &self.files[b];
                (&fa.repository != repo)
                    .cmp(&(&fb.repository != repo))
                    .then_with(|| fa.path.len().cmp(&fb.path.len()))
                    .then_with(|| fa.path.cmp(&fb.path))
                    .then_with(|| fa.repository.cmp(&fb.repository))
            })
    }
}

fn family(language: &str) -> &str {
    match language {
        "typescript" | "javascript" => "js",
        other => other,
    }
}

fn same_family(a: &ParsedFile, b: &ParsedFile) -> bool {
    family(a.language()) == family(b.language())
}

/// Path with its final extension removed.
fn stem(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

/// `a/b/c` yields `a/b/c`, `b/c`, `c`.
fn suffixes(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(path.match_indices('/').map(move |(i, _)| &path[i + 1..]))
}

fn last_segment(name: &str) -> &str {
    name.rsplit(|c: char| c == ':' || c == '.').next().unwrap_or(name)
}

/// Join a relative import onto a directory, resolving `.` and `..`.
fn join_relative(dir: &str, spec: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for piece in spec.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::{ApiCall, Association, ClassInfo, ParsedFragment};

    fn file(repo: &str, path: &str, language: &str) -> ParsedFile {
        ParsedFile::new(path, repo, "main", ParsedFragment::empty(language))
    }

    fn with_imports(mut f: ParsedFile, imports: &[&str]) -> ParsedFile {
        f.structure.imports = imports.iter().map(|s| s.to_string()).collect();
        f
    }

    fn with_class(mut f: ParsedFile, name: &str, parent: Option<&str>, kind: ClassKind) -> ParsedFile {
        f.structure.classes.push(ClassInfo {
            name: name.into(),
            parent: parent.map(String::from),
            kind,
            line: 1,
        });
        f
    }

    fn targets(edges: &[GraphEdge], source: &str) -> Vec<String> {
        edges
            .iter()
            .filter(|e| e.source_file == source)
            .map(|e| e.target_file.clone())
            .collect()
    }

    #[test]
    fn relative_imports_resolve_per_language() {
        let files = vec![
            with_imports(file("web", "src/pages/Billing.tsx", "typescript"), &["../lib/api", "./components", "react"]),
            file("web", "src/lib/api.ts", "typescript"),
            file("web", "src/pages/components/index.tsx", "typescript"),
            with_imports(file("backend", "app/services/pay.rb", "ruby"), &["./helpers/money"]),
            file("backend", "app/services/helpers/money.rb", "ruby"),
            with_imports(file("ml", "pkg/jobs/run.py", "python"), &[".tasks", "..settings"]),
            file("ml", "pkg/jobs/tasks.py", "python"),
            file("ml", "pkg/settings/__init__.py", "python"),
        ];
        let edges = build_graph(&files);
        assert_eq!(
            targets(&edges, "src/pages/Billing.tsx"),
            vec!["src/lib/api.ts", "src/pages/components/index.tsx"]
        );
        assert_eq!(targets(&edges, "app/services/pay.rb"), vec!["app/services/helpers/money.rb"]);
        assert_eq!(
            targets(&edges, "pkg/jobs/run.py"),
            vec!["pkg/jobs/tasks.py", "pkg/settings/__init__.py"]
        );
        assert!(edges.iter().all(|e| e.relation == EdgeRelation::Import));
    }

    #[test]
    fn dotted_and_library_root_imports() {
        let files = vec![
            with_imports(file("ml", "worker.py", "python"), &["app.models.patient"]),
            file("ml", "src/app/models/patient.py", "python"),
            with_imports(file("backend", "app/jobs/sync.rb", "ruby"), &["billing/invoice", "json"]),
            file("backend", "lib/billing/invoice.rb", "ruby"),
        ];
        let edges = build_graph(&files);
        assert_eq!(targets(&edges, "worker.py"), vec!["src/app/models/patient.py"]);
        assert_eq!(targets(&edges, "app/jobs/sync.rb"), vec!["lib/billing/invoice.rb"]);
    }

    #[test]
    fn go_package_suffix_crosses_repositories() {
        let files = vec![
            with_imports(
                file("api", "cmd/api/main.go", "go"),
                &["github.com/acme/platform/internal/invoice", "fmt"],
            ),
            file("platform", "internal/invoice/store.go", "go"),
            file("platform", "internal/invoice/invoice.go", "go"),
            file("platform", "internal/invoice/invoice_test.go", "go"),
        ];
        let edges = build_graph(&files);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_file, "internal/invoice/store.go");
        assert!(edges[0].is_cross_repo());
    }

    #[test]
    fn ambiguity_prefers_same_repo_then_shortest() {
        let files = vec![
            with_imports(file("backend", "app/a.rb", "ruby"), &["money"]),
            file("shared", "money.rb", "ruby"),
            file("backend", "lib/deep/money.rb", "ruby"),
            file("backend", "lib/money.rb", "ruby"),
        ];
        let edges = build_graph(&files);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_file, "lib/money.rb");
        assert_eq!(edges[0].target_repository, "backend");
    }

    #[test]
    fn unresolvable_imports_produce_nothing() {
        let files = vec![with_imports(file("web", "src/a.ts", "typescript"), &["./missing", "lodash"])];
        assert!(build_graph(&files).is_empty());
    }

    #[test]
    fn model_inheritance_and_associations() {
        let mut patient = with_class(
            file("backend", "app/models/patient.rb", "ruby"),
            "Patient",
            Some("ApplicationRecord"),
            ClassKind::Model,
        );
        patient.structure.associations.push(Association {
            kind: "has_many".into(),
            name: "appointments".into(),
            owner: Some("Patient".into()),
            class_name: None,
            through: None,
            polymorphic: false,
        });
        patient.structure.associations.push(Association {
            kind: "belongs_to".into(),
            name: "imageable".into(),
            owner: Some("Patient".into()),
            class_name: None,
            through: None,
            polymorphic: true,
        });
        let files = vec![
            patient,
            with_class(
                file("backend", "app/models/application_record.rb", "ruby"),
                "ApplicationRecord",
                Some("ActiveRecord::Base"),
                ClassKind::Model,
            ),
            with_class(
                file("backend", "app/models/appointment.rb", "ruby"),
                "Appointment",
                Some("ApplicationRecord"),
                ClassKind::Model,
            ),
            with_class(
                file("backend", "app/services/report.rb", "ruby"),
                "Report",
                Some("BaseReport"),
                ClassKind::Class,
            ),
            with_class(file("backend", "app/services/base_report.rb", "ruby"), "BaseReport", None, ClassKind::Class),
        ];
        let edges = build_graph(&files);

        let inherits = edges
            .iter()
            .find(|e| e.source_file == "app/models/patient.rb" && e.target_file == "app/models/application_record.rb")
            .expect("inheritance edge");
        assert_eq!(inherits.relation, EdgeRelation::ModelAssociation);
        assert_eq!(inherits.metadata.get("associationType").map(String::as_str), Some("inherits"));

        let has_many = edges
            .iter()
            .find(|e| e.target_file == "app/models/appointment.rb" && e.source_file == "app/models/patient.rb")
            .expect("association edge");
        assert_eq!(has_many.metadata.get("associationType").map(String::as_str), Some("has_many"));

        let plain = edges
            .iter()
            .find(|e| e.source_file == "app/services/report.rb")
            .expect("plain inheritance");
        assert_eq!(plain.relation, EdgeRelation::Inherits);

        assert_eq!(targets(&edges, "app/models/patient.rb").len(), 2, "polymorphic association has no edge");
    }

    #[test]
    fn api_calls_link_to_backend_routes_across_repos() {
        let mut routes = file("backend", "config/routes.rb", "ruby");
        routes.structure.routes = crate::frameworks::rails::parse_routes(
            "namespace :api do\n  resources :patients\nend\n",
        );
        let mut client = file("web", "src/api/patients.ts", "typescript");
        client.structure.api_calls.push(ApiCall {
            method: "GET".into(),
            url: "${API}/api/patients/${id}".into(),
            line: 3,
        });
        client.structure.api_calls.push(ApiCall {
            method: "GET".into(),
            url: "/api/unknown".into(),
            line: 4,
        });
        let files = vec![
            routes,
            client,
            file("backend", "app/controllers/api/patients_controller.rb", "ruby"),
        ];
        let edges = build_graph(&files);
        assert_eq!(edges.len(), 1, "{:#?}", edges);
        let edge = &edges[0];
        assert_eq!(edge.relation, EdgeRelation::ApiEndpoint);
        assert_eq!(edge.source_file, "src/api/patients.ts");
        assert_eq!(edge.repository, "web");
        assert_eq!(edge.target_file, "app/controllers/api/patients_controller.rb");
        assert_eq!(edge.target_repository, "backend");
        assert_eq!(edge.metadata.get("path").map(String::as_str), Some("/api/patients/:id"));
    }

    #[test]
    fn path_helpers() {
        assert_eq!(stem("src/a.test.ts"), "src/a.test");
        assert_eq!(stem("Gemfile"), "Gemfile");
        assert_eq!(stem("src/.env"), "src/.env");
        assert_eq!(suffixes("a/b/c").collect::<Vec<_>>(), vec!["a/b/c", "b/c", "c"]);
        assert_eq!(join_relative("src/pages", "../lib/api"), Some("src/lib/api".into()));
        assert_eq!(join_relative("src", "../../x"), None);
        assert_eq!(last_segment("ActiveRecord::Base"), "Base");
        assert_eq!(last_segment("models.Model"), "Model");
    }
}
