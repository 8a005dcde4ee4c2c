//! Shared HTTP client construction for workflow-engine collaborators.

use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("matchpro/", env!("CARGO_PKG_VERSION"));

/// Build a client with the per-request timeout used for every workflow call.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(USER_AGENT)
        .build()
}

/// Keep error bodies short enough for logs and user-facing messages.
pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(200).collect()
}
