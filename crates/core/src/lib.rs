pub mod analysis;
pub mod callback_auth;
pub mod config;
pub mod document;
mod http;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod submission;
pub mod testing;

pub use analysis::{
    AnalysisResult, CallbackAck, CallbackRegistry, HttpResultPoller, ResultPoller,
    ResultRetrieval, ScoreBand,
};
pub use callback_auth::{
    create_callback_authenticator, CallbackAuthError, CallbackAuthenticator, CallbackRequest,
};
pub use config::{
    load_config, load_config_from_str, validate_config, CallbackAuthMethod, Config, ConfigError,
    RetrievalStrategy, SanitizedConfig,
};
pub use document::{CandidateDocument, DocumentKind, DocumentSummary, FileValidator, ValidationError};
pub use pipeline::{
    PipelineConfig, PipelineController, PipelineError, PipelineFailure, PipelineSnapshot,
    PipelineState,
};
pub use session::{PipelineFactory, SessionError, SessionLimits, SessionRegistry};
pub use submission::{HttpSubmissionClient, SubmissionClient, SubmissionError};
