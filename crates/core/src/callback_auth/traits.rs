use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

/// What an authenticator gets to see of an inbound callback.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

#[derive(Debug, Error)]
pub enum CallbackAuthError {
    #[error("Callback authentication required")]
    NotAuthenticated,

    #[error("Invalid callback credentials")]
    InvalidCredentials,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Decides whether an inbound callback really comes from the workflow engine.
#[async_trait]
pub trait CallbackAuthenticator: Send + Sync {
    async fn authenticate(&self, request: &CallbackRequest) -> Result<(), CallbackAuthError>;

    /// Name of this authentication method
    fn method_name(&self) -> &'static str;
}
