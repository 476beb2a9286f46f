//! codeprism-watch: keeps the knowledge base in step with local checkouts.
//!
//! Uses `notify` with debouncing to pick up file changes and git ref updates,
//! buffers file events until the debounce window goes quiet, and turns branch
//! switches and merges into sync calls.

pub mod branch;
pub mod debounce;
pub mod filter;
pub mod git;
pub mod session;
pub mod watcher;

pub use branch::{classify_branch, extract_branch_context};
pub use debounce::DebounceBuffer;
pub use filter::{is_watchable, should_ignore};
pub use git::GitRepo;
pub use session::RepoSession;
pub use watcher::{classify_path, run_loop, RepoWatcher, WatchEvent};
