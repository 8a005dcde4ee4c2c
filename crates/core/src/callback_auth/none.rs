use async_trait::async_trait;

use super::{CallbackAuthError, CallbackAuthenticator, CallbackRequest};

/// Accepts every callback. Must be configured explicitly with
/// `method = "none"`.
#[derive(Debug, Default)]
pub struct NoneCallbackAuthenticator;

impl NoneCallbackAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CallbackAuthenticator for NoneCallbackAuthenticator {
    async fn authenticate(&self, _request: &CallbackRequest) -> Result<(), CallbackAuthError> {
        Ok(())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_accepts_anything() {
        let auth = NoneCallbackAuthenticator::new();
        let request = CallbackRequest {
            headers: HashMap::new(),
            source_ip: "10.0.0.7".parse().unwrap(),
        };
        assert!(auth.authenticate(&request).await.is_ok());
        assert_eq!(auth.method_name(), "none");
    }
}
