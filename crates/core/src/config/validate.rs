use super::{
    types::{AuthMethod, Config},
    ConfigError,
};
use crate::analysis::AiProvider;

/// Validate configuration.
///
/// Serde enforces the presence of `[auth]`; everything that depends on more
/// than one field is checked here.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::ApiKey {
        if config.auth.tokens.is_empty() {
            return Err(invalid(
                "auth.tokens must contain at least one token when method = \"api_key\"",
            ));
        }
        if config.auth.tokens.iter().any(|t| t.token.is_empty()) {
            return Err(invalid("auth.tokens entries cannot have an empty token"));
        }
    }

    if config.queue.max_attempts == 0 {
        return Err(invalid("queue.max_attempts must be at least 1"));
    }
    if config.queue.backoff_max_ms < config.queue.backoff_base_ms {
        return Err(invalid("queue.backoff_max_ms must be >= queue.backoff_base_ms"));
    }

    if config.worker.concurrency == 0 {
        return Err(invalid("worker.concurrency must be at least 1"));
    }
    if config.worker.rate_limit_max == 0 || config.worker.rate_limit_window_ms == 0 {
        return Err(invalid(
            "worker.rate_limit_max and worker.rate_limit_window_ms must be positive",
        ));
    }
    if config.worker.analysis_timeout_ms == 0 {
        return Err(invalid("worker.analysis_timeout_ms must be positive"));
    }

    if config.ai.provider != AiProvider::Mock
        && config.ai.api_key.as_deref().unwrap_or("").is_empty()
    {
        return Err(invalid(format!(
            "ai.api_key is required for provider \"{}\"",
            config.ai.provider.as_str()
        )));
    }

    if config.events.channel_capacity == 0 || config.events.subscriber_buffer == 0 {
        return Err(invalid(
            "events.channel_capacity and events.subscriber_buffer must be positive",
        ));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
