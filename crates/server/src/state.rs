use std::sync::Arc;

use matchpro_core::{CallbackAuthenticator, CallbackRegistry, Config, SanitizedConfig, SessionRegistry};

/// Shared application state
pub struct AppState {
    config: Config,
    sessions: SessionRegistry,
    /// Present when results arrive by callback.
    callbacks: Option<Arc<CallbackRegistry>>,
    callback_authenticator: Arc<dyn CallbackAuthenticator>,
}

impl AppState {
    pub fn new(
        config: Config,
        sessions: SessionRegistry,
        callbacks: Option<Arc<CallbackRegistry>>,
        callback_authenticator: Arc<dyn CallbackAuthenticator>,
    ) -> Self {
        Self {
            config,
            sessions,
            callbacks,
            callback_authenticator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn callbacks(&self) -> Option<&Arc<CallbackRegistry>> {
        self.callbacks.as_ref()
    }

    pub fn callback_authenticator(&self) -> &dyn CallbackAuthenticator {
        self.callback_authenticator.as_ref()
    }
}
