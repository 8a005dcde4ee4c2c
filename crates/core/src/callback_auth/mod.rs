//! Authentication of inbound result callbacks.

mod none;
mod token;
mod traits;

pub use none::NoneCallbackAuthenticator;
pub use token::TokenCallbackAuthenticator;
pub use traits::*;

use crate::config::{CallbackAuthConfig, CallbackAuthMethod};

/// Factory function to create the callback authenticator from config
pub fn create_callback_authenticator(
    config: &CallbackAuthConfig,
) -> Result<Box<dyn CallbackAuthenticator>, CallbackAuthError> {
    match config.method {
        CallbackAuthMethod::None => Ok(Box::new(NoneCallbackAuthenticator::new())),
        CallbackAuthMethod::Token => {
            let token = config
                .token
                .clone()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    CallbackAuthError::ConfigurationError(
                        "token must be set when using the token callback auth method".to_string(),
                    )
                })?;
            Ok(Box::new(TokenCallbackAuthenticator::new(token)))
        }
    }
}
