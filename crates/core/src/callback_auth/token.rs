//! Shared-token authentication for callbacks.

use async_trait::async_trait;
use tracing::debug;

use super::{CallbackAuthError, CallbackAuthenticator, CallbackRequest};

/// Checks a shared token configured on both sides of the workflow.
///
/// Accepts the token in either:
/// - `Authorization: Bearer <token>` header
/// - `X-Callback-Token: <token>` header
pub struct TokenCallbackAuthenticator {
    expected: String,
}

impl TokenCallbackAuthenticator {
    pub fn new(token: String) -> Self {
        Self { expected: token }
    }

    fn extract_token<'a>(&self, request: &'a CallbackRequest) -> Option<&'a str> {
        if let Some(header) = request.headers.get("authorization") {
            let token = header
                .strip_prefix("Bearer ")
                .or_else(|| header.strip_prefix("bearer "));
            if token.is_some() {
                return token;
            }
        }

        request.headers.get("x-callback-token").map(String::as_str)
    }
}

#[async_trait]
impl CallbackAuthenticator for TokenCallbackAuthenticator {
    async fn authenticate(&self, request: &CallbackRequest) -> Result<(), CallbackAuthError> {
        let provided = self
            .extract_token(request)
            .ok_or(CallbackAuthError::NotAuthenticated)?;

        if constant_time_eq(provided.as_bytes(), self.expected.as_bytes()) {
            Ok(())
        } else {
            debug!(source_ip = %request.source_ip, "Callback token mismatch");
            Err(CallbackAuthError::InvalidCredentials)
        }
    }

    fn method_name(&self) -> &'static str {
        "token"
    }
}

/// Comparison time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> CallbackRequest {
        CallbackRequest {
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            source_ip: "127.0.0.1".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let auth = TokenCallbackAuthenticator::new("s3cret".into());
        assert!(auth
            .authenticate(&request(&[("Authorization", "Bearer s3cret")]))
            .await
            .is_ok());
        assert!(auth
            .authenticate(&request(&[("Authorization", "bearer s3cret")]))
            .await
            .is_ok());
    }

    #[test]
    fn test_callback_token_header() {
        let auth = TokenCallbackAuthenticator::new("s3cret".into());
        tokio_test::assert_ok!(tokio_test::block_on(
            auth.authenticate(&request(&[("X-Callback-Token", "s3cret")]))
        ));
        tokio_test::assert_err!(tokio_test::block_on(
            auth.authenticate(&request(&[("X-Callback-Token", "S3CRET")]))
        ));
    }

    #[tokio::test]
    async fn test_basic_auth_falls_through_to_token_header() {
        let auth = TokenCallbackAuthenticator::new("s3cret".into());
        let result = auth
            .authenticate(&request(&[("Authorization", "Basic abc"), ("X-Callback-Token", "s3cret")]))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_and_missing_token() {
        let auth = TokenCallbackAuthenticator::new("s3cret".into());
        assert!(matches!(
            auth.authenticate(&request(&[("X-Callback-Token", "nope")])).await,
            Err(CallbackAuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate(&request(&[])).await,
            Err(CallbackAuthError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"toke"));
        assert!(constant_time_eq(b"", b""));
    }
}
