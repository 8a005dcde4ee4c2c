//! Analysis results and how they are obtained.
//!
//! The workflow engine produces results asynchronously. They reach the
//! pipeline either by polling a status endpoint ([`HttpResultPoller`]) or by
//! an inbound callback routed through the [`CallbackRegistry`]. Both paths
//! normalize the payload into the canonical [`AnalysisResult`].

mod callback;
mod poller;
mod types;
mod wait;

pub use callback::{
    CallbackAck, CallbackOutcome, CallbackRegistry, CallbackRejection, CallbackSubscription,
};
pub use poller::{parse_status, HttpResultPoller, PollError, PollStatus, ResultPoller};
pub use types::{optimized_document_name, AnalysisResult, NormalizeError, ScoreBand};
pub use wait::{wait_for_result, ResultRetrieval, WaitError, WaitPolicy};
