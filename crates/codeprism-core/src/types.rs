use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::CodeprismError;

/// Reserved pseudo-repository that owns workspace-wide documents.
pub const WORKSPACE_REPO: &str = "__workspace__";

// ── File Roles ──────────────────────────────────────────────────────────────

/// The single role assigned to every indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    #[default]
    Domain,
    Test,
    Config,
    EntryPoint,
    SharedUtility,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Test => "test",
            Self::Config => "config",
            Self::EntryPoint => "entry_point",
            Self::SharedUtility => "shared_utility",
        }
    }
}

impl std::fmt::Display for FileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileRole {
    type Err = CodeprismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "domain" => Ok(Self::Domain),
            "test" => Ok(Self::Test),
            "config" => Ok(Self::Config),
            "entry_point" => Ok(Self::EntryPoint),
            "shared_utility" => Ok(Self::SharedUtility),
            _ => Err(CodeprismError::InvalidRole(s.to_string())),
        }
    }
}

// ── Graph Edges ─────────────────────────────────────────────────────────────

/// Relation carried by a directed file-to-file edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelation {
    Import,
    ModelAssociation,
    ApiEndpoint,
    Inherits,
}

impl EdgeRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::ModelAssociation => "model_association",
            Self::ApiEndpoint => "api_endpoint",
            Self::Inherits => "inherits",
        }
    }
}

impl std::fmt::Display for EdgeRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeRelation {
    type Err = CodeprismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "import" => Ok(Self::Import),
            "model_association" => Ok(Self::ModelAssociation),
            "api_endpoint" => Ok(Self::ApiEndpoint),
            "inherits" => Ok(Self::Inherits),
            _ => Err(CodeprismError::InvalidRelation(s.to_string())),
        }
    }
}

/// A directed, repository-tagged edge between two files.
///
/// `repository` is the source file's repository; `target_repository` may differ
/// for cross-repository edges such as `api_endpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_file: String,
    pub target_file: String,
    pub relation: EdgeRelation,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub repository: String,
    pub target_repository: String,
}

impl GraphEdge {
    pub fn new(
        relation: EdgeRelation,
        source: (&str, &str),
        target: (&str, &str),
    ) -> Self {
        Self {
            source_file: source.1.to_string(),
            target_file: target.1.to_string(),
            relation,
            metadata: BTreeMap::new(),
            repository: source.0.to_string(),
            target_repository: target.0.to_string(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_cross_repo(&self) -> bool {
        self.repository != self.target_repository
    }
}

// ── Parsed Structure ────────────────────────────────────────────────────────

/// What a parsed class-like declaration represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    #[default]
    Class,
    Module,
    Interface,
    Model,
    Controller,
    Component,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<String>,
    pub kind: ClassKind,
    pub line: usize,
}

/// An ORM-style association declared inside a model class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// `has_many`, `belongs_to`, `has_one`, `has_and_belongs_to_many`.
    pub kind: String,
    pub name: String,
    pub owner: Option<String>,
    pub class_name: Option<String>,
    pub through: Option<String>,
    #[serde(default)]
    pub polymorphic: bool,
}

/// A server-side route declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub method: String,
    pub path: String,
    pub controller: Option<String>,
    pub action: Option<String>,
}

/// An outbound HTTP call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCall {
    pub method: String,
    pub url: String,
    pub line: usize,
}

/// Structural record produced by a language parser, before the file's identity
/// (repository, branch) and role are attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFragment {
    pub language: String,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
    #[serde(default)]
    pub associations: Vec<Association>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub api_calls: Vec<ApiCall>,
    /// Framework extractors that recognised something in this file.
    #[serde(default)]
    pub frameworks: Vec<String>,
}

impl ParsedFragment {
    pub fn empty(language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..Default::default()
        }
    }
}

/// A fully-identified structural record for one file on one branch.
///
/// A new parse replaces the prior record for the same (path, repository, branch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    pub repository: String,
    pub branch: String,
    pub role: FileRole,
    #[serde(flatten)]
    pub structure: ParsedFragment,
}

impl ParsedFile {
    pub fn new(path: &str, repository: &str, branch: &str, structure: ParsedFragment) -> Self {
        Self {
            path: path.to_string(),
            repository: repository.to_string(),
            branch: branch.to_string(),
            role: FileRole::Domain,
            structure,
        }
    }

    pub fn language(&self) -> &str {
        &self.structure.language
    }
}

/// A row of the file index, unique per (path, repository, branch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub path: String,
    pub repository: String,
    pub branch: String,
    pub commit_sha: Option<String>,
    pub parsed: ParsedFile,
    pub content_hash: String,
    /// Normalized recent change frequency in [0, 1].
    pub heat_score: f64,
    pub updated_at: DateTime<Utc>,
}

// ── Cards ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Flow,
    Model,
    Hub,
    CrossService,
    Insight,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Model => "model",
            Self::Hub => "hub",
            Self::CrossService => "cross_service",
            Self::Insight => "insight",
        }
    }

    /// Ordering used when assembling context: lower comes first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Flow => 0,
            Self::CrossService => 1,
            Self::Hub => 2,
            Self::Model => 3,
            Self::Insight => 4,
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardType {
    type Err = CodeprismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flow" => Ok(Self::Flow),
            "model" => Ok(Self::Model),
            "hub" => Ok(Self::Hub),
            "cross_service" | "cross-service" => Ok(Self::CrossService),
            "insight" => Ok(Self::Insight),
            _ => Err(CodeprismError::InvalidCardType(s.to_string())),
        }
    }
}

/// A generated, provenance-tagged knowledge snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub flow: String,
    pub title: String,
    pub content: String,
    pub card_type: CardType,
    pub source_files: Vec<String>,
    pub source_repos: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub specificity_score: f64,
    #[serde(default)]
    pub identifiers: String,
    /// `None` means valid on every branch.
    #[serde(default)]
    pub valid_branches: Option<Vec<String>>,
    pub commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(id: &str, flow: &str, title: &str, content: &str, card_type: CardType) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            flow: flow.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            card_type,
            source_files: Vec::new(),
            source_repos: Vec::new(),
            tags: Vec::new(),
            stale: false,
            usage_count: 0,
            specificity_score: 0.0,
            identifiers: String::new(),
            valid_branches: None,
            commit_sha: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the card may be served for the given branch filter.
    pub fn is_valid_on(&self, branch: Option<&str>) -> bool {
        match (branch, &self.valid_branches) {
            (None, _) | (_, None) => true,
            (Some(b), Some(valid)) => valid.is_empty() || valid.iter().any(|v| v == b),
        }
    }

    /// Text embedded for vector search.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.flow, self.content)
    }
}

// ── Project Docs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    About,
    Architecture,
    Rules,
    Styles,
    Readme,
    Changelog,
    Specialist,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::About => "about",
            Self::Architecture => "architecture",
            Self::Rules => "rules",
            Self::Styles => "styles",
            Self::Readme => "readme",
            Self::Changelog => "changelog",
            Self::Specialist => "specialist",
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocType {
    type Err = CodeprismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "about" => Ok(Self::About),
            "architecture" => Ok(Self::Architecture),
            "rules" => Ok(Self::Rules),
            "styles" => Ok(Self::Styles),
            "readme" => Ok(Self::Readme),
            "changelog" => Ok(Self::Changelog),
            "specialist" => Ok(Self::Specialist),
            _ => Err(CodeprismError::InvalidDocType(s.to_string())),
        }
    }
}

/// A per-repository generated document, unique per (repository, doc_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDoc {
    pub repository: String,
    pub doc_type: DocType,
    pub content: String,
    pub stale: bool,
    pub source_file_paths: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

// ── Flows ───────────────────────────────────────────────────────────────────

/// Flow name with its live card count, as listed to assistants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub flow: String,
    #[serde(rename = "cardCount")]
    pub card_count: usize,
    /// Distinct (repository, path) members of the flow.
    #[serde(rename = "fileCount", default)]
    pub file_count: usize,
    pub repos: Vec<String>,
}

// ── Sync ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[default]
    Save,
    Merge,
    Pull,
    Checkout,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Merge => "merge",
            Self::Pull => "pull",
            Self::Checkout => "checkout",
        }
    }

    pub fn is_merge_like(&self) -> bool {
        matches!(self, Self::Merge | Self::Pull)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = CodeprismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "save" => Ok(Self::Save),
            "merge" => Ok(Self::Merge),
            "pull" => Ok(Self::Pull),
            "checkout" => Ok(Self::Checkout),
            _ => Err(CodeprismError::InvalidEventType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl std::str::FromStr for FileStatus {
    type Err = CodeprismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            _ => Err(CodeprismError::InvalidFileStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    pub status: FileStatus,
}

/// One ingestion batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub changed_files: Vec<ChangedFile>,
    /// Set by a full-level branch switch; counts as crossing a changelog boundary.
    #[serde(default)]
    pub full_sync: bool,
}

impl SyncRequest {
    pub fn new(repo: &str, branch: &str, event_type: EventType) -> Self {
        Self {
            repo: repo.to_string(),
            branch: branch.to_string(),
            event_type,
            commit_sha: None,
            changed_files: Vec::new(),
            full_sync: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub indexed: usize,
    pub invalidated: usize,
}

// ── Branches ────────────────────────────────────────────────────────────────

/// How aggressively a git event updates the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLevel {
    Skip,
    Lightweight,
    Full,
}

impl SyncLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Lightweight => "lightweight",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for SyncLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncLevel {
    type Err = CodeprismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "lightweight" => Ok(Self::Lightweight),
            "full" => Ok(Self::Full),
            _ => Err(CodeprismError::InvalidInput(format!("sync level: {s}"))),
        }
    }
}

/// Human-oriented facts pulled out of a branch name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchContext {
    pub ticket_id: Option<String>,
    pub context_hint: String,
    pub epic_branch: Option<String>,
}

/// What the developer is currently working on in one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveContext {
    pub repository: String,
    pub branch: String,
    pub sync_level: SyncLevel,
    pub context: BranchContext,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrips_through_str() {
        for role in [
            FileRole::Domain,
            FileRole::Test,
            FileRole::Config,
            FileRole::EntryPoint,
            FileRole::SharedUtility,
        ] {
            let parsed: FileRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("hub".parse::<FileRole>().is_err());
    }

    #[test]
    fn card_branch_validity() {
        let mut card = Card::new("c1", "billing", "Invoices", "...", CardType::Flow);
        assert!(card.is_valid_on(Some("feature/x")));
        card.valid_branches = Some(vec!["main".into()]);
        assert!(card.is_valid_on(Some("main")));
        assert!(!card.is_valid_on(Some("feature/x")));
        assert!(card.is_valid_on(None));
    }

    #[test]
    fn sync_request_accepts_camel_case_json() {
        let json = r#"{
            "repo": "backend",
            "branch": "main",
            "changedFiles": [{"path": "a.rb", "content": "x", "status": "modified"}]
        }"#;
        let req: SyncRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.event_type, EventType::Save);
        assert_eq!(req.changed_files.len(), 1);
        assert_eq!(req.changed_files[0].status, FileStatus::Modified);
        assert!(!req.full_sync);
    }

    #[test]
    fn parsed_file_flattens_structure() {
        let mut fragment = ParsedFragment::empty("ruby");
        fragment.imports.push("json".into());
        let file = ParsedFile::new("lib/a.rb", "backend", "main", fragment);
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["language"], "ruby");
        assert_eq!(value["imports"][0], "json");
        assert_eq!(value["role"], "domain");
    }

    #[test]
    fn merge_like_events() {
        assert!(EventType::Merge.is_merge_like());
        assert!(EventType::Pull.is_merge_like());
        assert!(!EventType::Save.is_merge_like());
        assert!(!EventType::Checkout.is_merge_like());
    }
}
