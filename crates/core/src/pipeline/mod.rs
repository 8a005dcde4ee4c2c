//! The analysis pipeline for one candidate.
//!
//! A [`PipelineController`] validates the selected document, submits it with
//! the declared role and waits for the analysis:
//!
//! ```text
//! Idle -> Validating -> Ready -> Submitting -> AwaitingResult -> Completed
//!              |                     |               |
//!              +-------> Failed <----+---------------+
//! ```
//!
//! The current [`PipelineSnapshot`] lives in a [`ResultStore`] that observers
//! can subscribe to.

mod config;
mod controller;
mod store;
mod types;

pub use config::PipelineConfig;
pub use controller::PipelineController;
pub use store::{ResultStore, StoreError};
pub use types::{
    FailureKind, PipelineError, PipelineFailure, PipelineSnapshot, PipelineState,
};
