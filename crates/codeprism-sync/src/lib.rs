//! codeprism-sync: the service object and everything that writes to it.
//!
//! - **service**: [`Codeprism`], holding the store, search engine, config and
//!   reindex state shared by the HTTP server, the tool server and the watcher
//! - **receiver**: [`Codeprism::handle_sync`], the atomic ingestion path
//! - **reindex**: single-flight controller for background jobs
//! - **refresh**: the stale-card refresh job

pub mod receiver;
pub mod refresh;
pub mod reindex;
pub mod service;

pub use refresh::CardRefresher;
pub use reindex::{RefreshReport, ReindexController, ReindexState, ReindexStatus};
pub use service::{Codeprism, Health};
