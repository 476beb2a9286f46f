//! codeprism-core: Shared data model, errors and configuration for the codeprism
//! cross-repository code knowledge index.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use traits::*;
pub use types::*;
