use super::{
    types::{CallbackAuthMethod, Config, RetrievalStrategy},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Submission URL is a valid absolute http(s) URL
/// - Poll strategy has a result URL template containing `{id}`
/// - Poll interval, wait budget and document size limit are non-zero
/// - Session TTL and session cap are non-zero
/// - Token callback auth has a non-empty token
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let analysis = &config.analysis;
    check_url("analysis.submission_url", &analysis.submission_url)?;

    if analysis.strategy == RetrievalStrategy::Poll {
        let result_url = analysis.result_url.as_deref().ok_or_else(|| {
            ConfigError::ValidationError(
                "analysis.result_url is required when strategy = \"poll\"".to_string(),
            )
        })?;
        if !result_url.contains("{id}") {
            return Err(ConfigError::ValidationError(
                "analysis.result_url must contain the {id} placeholder".to_string(),
            ));
        }
        check_url("analysis.result_url", &result_url.replace("{id}", "0"))?;

        if analysis.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.poll_interval_ms cannot be 0".to_string(),
            ));
        }
    }

    if analysis.wait_budget_secs == 0 {
        return Err(ConfigError::ValidationError(
            "analysis.wait_budget_secs cannot be 0".to_string(),
        ));
    }

    if analysis.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "analysis.request_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.validation.max_document_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "validation.max_document_bytes cannot be 0".to_string(),
        ));
    }

    if config.sessions.idle_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sessions.idle_ttl_secs cannot be 0".to_string(),
        ));
    }

    if config.sessions.max_sessions == 0 {
        return Err(ConfigError::ValidationError(
            "sessions.max_sessions cannot be 0".to_string(),
        ));
    }

        if config.callback_auth.method == CallbackAuthMethod::Token
        && config
            .callback_auth
            .token
            .as_deref()
            .is_none_or(|t| t.is_empty())
    {
        return Err(ConfigError::ValidationError(
            "callback_auth.token must be set when method = \"token\"".to_string(),
        ));
    }

    Ok(())
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| ConfigError::ValidationError(format!("{} is not a valid URL: {}", field, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::ValidationError(format!(
            "{} must use http or https, got {}",
            field, other
        ))),
    }
}
