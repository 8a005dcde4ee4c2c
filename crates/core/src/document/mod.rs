//! Candidate document intake.
//!
//! Documents selected by the candidate are checked by the [`FileValidator`]
//! before anything is sent to the analysis workflow.

mod types;
mod validator;

pub use types::*;
pub use validator::FileValidator;

/// Default upper bound on document size (10 MiB).
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;
