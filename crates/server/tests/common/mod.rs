//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock workflow collaborators injected, so the HTTP surface can be
//! exercised without a workflow engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use matchpro_core::{
    create_callback_authenticator, load_config_from_str, CallbackAuthenticator, CallbackRegistry,
    PipelineConfig, PipelineFactory, ResultPoller, ResultRetrieval, SessionRegistry,
    SubmissionClient,
    testing::{MockResultPoller, MockSubmissionClient},
};
use matchpro_server::state::AppState;

/// Re-export fixtures for test convenience
pub use matchpro_core::testing::fixtures;

const MULTIPART_BOUNDARY: &str = "matchpro-test-boundary";

/// Test fixture with mock dependencies.
///
/// Provides an in-process server with fully controllable mocks for:
/// - Document submission (MockSubmissionClient)
/// - Result polling (MockResultPoller), or a callback registry
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_session_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/sessions", json!({})).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock submission endpoint - script receipts and errors
    pub submitter: Arc<MockSubmissionClient>,
    /// Mock result endpoint - script poll answers
    pub poller: Arc<MockResultPoller>,
    /// Callback registry, when the fixture uses callback retrieval
    pub callbacks: Option<Arc<CallbackRegistry>>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Wait for results via callbacks instead of polling
    pub use_callbacks: bool,
    /// Shared token required on callbacks
    pub callback_token: Option<String>,
    pub max_document_bytes: u64,
    pub wait_budget_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            use_callbacks: false,
            callback_token: None,
            max_document_bytes: 1024 * 1024,
            wait_budget_secs: 5,
        }
    }
}

impl TestConfig {
    /// Create config with callback retrieval.
    pub fn with_callbacks() -> Self {
        Self {
            use_callbacks: true,
            ..Default::default()
        }
    }

    /// Create config with callback retrieval guarded by a token.
    pub fn with_callback_token(token: &str) -> Self {
        Self {
            use_callbacks: true,
            callback_token: Some(token.to_string()),
            ..Default::default()
        }
    }

    fn to_toml(&self) -> String {
        let auth = match &self.callback_token {
            Some(token) => format!("method = \"token\"\ntoken = \"{}\"", token),
            None => "method = \"none\"".to_string(),
        };
        let strategy = if self.use_callbacks { "callback" } else { "poll" };
        format!(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[callback_auth]
{auth}

[analysis]
submission_url = "http://127.0.0.1:5678/webhook/upload-cv"
result_url = "http://127.0.0.1:5678/webhook/analysis/{{id}}"
strategy = "{strategy}"
poll_interval_ms = 20
wait_budget_secs = {budget}

[validation]
max_document_bytes = {max}
"#,
            auth = auth,
            strategy = strategy,
            budget = self.wait_budget_secs,
            max = self.max_document_bytes,
        )
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let config = load_config_from_str(&test_config.to_toml()).expect("Invalid test config");

        let submitter = Arc::new(MockSubmissionClient::new());
        let poller = Arc::new(MockResultPoller::new());

        let (retrieval, callbacks) = if test_config.use_callbacks {
            let registry = Arc::new(CallbackRegistry::new());
            (
                ResultRetrieval::Callback(Arc::clone(&registry)),
                Some(registry),
            )
        } else {
            (
                ResultRetrieval::Poll(Arc::clone(&poller) as Arc<dyn ResultPoller>),
                None,
            )
        };

        let authenticator: Arc<dyn CallbackAuthenticator> = Arc::from(
            create_callback_authenticator(&config.callback_auth)
                .expect("Failed to create callback authenticator"),
        );

        let sessions = SessionRegistry::new(PipelineFactory::new(
            PipelineConfig::from(&config),
            Arc::clone(&submitter) as Arc<dyn SubmissionClient>,
            retrieval,
        ));

        let state = Arc::new(AppState::new(
            config,
            sessions,
            callbacks.clone(),
            authenticator,
        ));

        let router = matchpro_server::api::create_router(state);

        Self {
            router,
            submitter,
            poller,
            callbacks,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with JSON body and extra headers.
    pub async fn post_with_headers(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        self.send(request).await
    }

    /// Create a session and return its id.
    pub async fn create_session(&self) -> String {
        let response = self.request("POST", "/api/v1/sessions", None).await;
        assert_eq!(response.status, StatusCode::CREATED);
        response.body["id"]
            .as_str()
            .expect("session id missing")
            .to_string()
    }

    /// Upload a document as `multipart/form-data`, optionally with a role field.
    pub async fn upload(
        &self,
        session_id: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
        role: Option<&str>,
    ) -> TestResponse {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"document\"; filename=\"{f}\"\r\nContent-Type: {c}\r\n\r\n",
                b = MULTIPART_BOUNDARY,
                f = file_name,
                c = content_type,
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
        if let Some(role) = role {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"declared_role\"\r\n\r\n{r}\r\n",
                    b = MULTIPART_BOUNDARY,
                    r = role,
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/sessions/{}/document", session_id))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Poll the session until its state matches `state` or two seconds pass.
    pub async fn wait_for_state(&self, session_id: &str, state: &str) -> TestResponse {
        let path = format!("/api/v1/sessions/{}", session_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let response = self.get(&path).await;
            if response.body["state"] == state {
                return response;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "Session never reached {}; last body: {}",
                    state,
                    serde_json::to_string_pretty(&response.body).unwrap_or_default()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
