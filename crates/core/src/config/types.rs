use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::document::DEFAULT_MAX_DOCUMENT_BYTES;
use crate::submission::FormFieldNames;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub callback_auth: CallbackAuthConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication for inbound result callbacks from the workflow engine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CallbackAuthConfig {
    #[serde(default)]
    pub method: CallbackAuthMethod,
    /// Shared token (required when method = "token")
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallbackAuthMethod {
    #[default]
    None,
    Token,
}

/// How the pipeline obtains the asynchronous analysis result.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Poll `result_url` on a fixed interval.
    #[default]
    Poll,
    /// Wait for the workflow engine to push the result to the callback endpoint.
    Callback,
}

/// External analysis workflow configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Endpoint receiving the multipart CV submission
    pub submission_url: String,
    /// Result endpoint template, `{id}` is replaced with the correlation id.
    /// Required when strategy = "poll".
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub strategy: RetrievalStrategy,
    /// Delay between two poll requests (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum time to wait for a result once submitted (seconds)
    #[serde(default = "default_wait_budget")]
    pub wait_budget_secs: u64,
    /// Per-request HTTP timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Multipart field names expected by the submission endpoint
    #[serde(default)]
    pub fields: FormFieldNames,
}

fn default_poll_interval() -> u64 {
    3000 // 3 seconds
}

fn default_wait_budget() -> u64 {
    120 // 2 minutes
}

fn default_request_timeout() -> u64 {
    30
}

/// Document acceptance policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

fn default_max_document_bytes() -> u64 {
    DEFAULT_MAX_DOCUMENT_BYTES
}

/// Lifetime of per-candidate sessions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    /// Sessions untouched for this long are dropped (seconds)
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
    /// Upper bound on live sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_idle_ttl() -> u64 {
    1800 // 30 minutes
}

fn default_max_sessions() -> usize {
    1000
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub callback_auth: SanitizedCallbackAuthConfig,
    pub analysis: AnalysisConfig,
    pub validation: ValidationConfig,
    pub sessions: SessionsConfig,
}

/// Sanitized callback auth config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCallbackAuthConfig {
    pub method: String,
    pub token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            callback_auth: SanitizedCallbackAuthConfig {
                method: match config.callback_auth.method {
                    CallbackAuthMethod::None => "none".to_string(),
                    CallbackAuthMethod::Token => "token".to_string(),
                },
                token_configured: config
                    .callback_auth
                    .token
                    .as_deref()
                    .is_some_and(|t| !t.is_empty()),
            },
            analysis: config.analysis.clone(),
            validation: config.validation.clone(),
            sessions: config.sessions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[analysis]
submission_url = "http://localhost:5678/webhook/upload-cv"
result_url = "http://localhost:5678/webhook/analysis/{id}"
"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.analysis.strategy, RetrievalStrategy::Poll);
        assert_eq!(config.analysis.poll_interval_ms, 3000);
        assert_eq!(config.analysis.wait_budget_secs, 120);
        assert_eq!(config.analysis.request_timeout_secs, 30);
        assert_eq!(config.analysis.fields.document, "document");
        assert_eq!(config.validation.max_document_bytes, 10 * 1024 * 1024);
        assert_eq!(config.callback_auth.method, CallbackAuthMethod::None);
        assert_eq!(config.sessions.idle_ttl_secs, 1800);
        assert_eq!(config.sessions.max_sessions, 1000);
    }

    #[test]
    fn test_deserialize_missing_analysis_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_callback_strategy_with_legacy_fields() {
        let toml = r#"
[callback_auth]
method = "token"
token = "s3cret"

[analysis]
submission_url = "https://flows.example.com/form/upload"
strategy = "callback"
wait_budget_secs = 300

[analysis.fields]
document = "cv"
declared_role = "professionalTitle"
document_name = "fileName"
document_size = "fileSize"
submitted_at = "uploadDate"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.analysis.strategy, RetrievalStrategy::Callback);
        assert!(config.analysis.result_url.is_none());
        assert_eq!(config.analysis.wait_budget_secs, 300);
        assert_eq!(config.analysis.fields.document, "cv");
        assert_eq!(config.analysis.fields.declared_role, "professionalTitle");
        assert_eq!(config.callback_auth.method, CallbackAuthMethod::Token);
    }

    #[test]
    fn test_sanitized_config_hides_token() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.callback_auth = CallbackAuthConfig {
            method: CallbackAuthMethod::Token,
            token: Some("s3cret".to_string()),
        };

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.callback_auth.method, "token");
        assert!(sanitized.callback_auth.token_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("s3cret"));
    }
}
