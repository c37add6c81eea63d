//! AI provider configuration.

use serde::{Deserialize, Serialize};

use super::AiProvider;

/// Configuration for the analysis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: AiProvider,

    /// API key for real providers.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Override the provider endpoint (OpenAI-compatible gateways, proxies).
    #[serde(default)]
    pub base_url: Option<String>,

    /// HTTP timeout for provider calls (milliseconds).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_provider() -> AiProvider {
    AiProvider::Mock
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout() -> u64 {
    15_000
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: default_model(),
            base_url: None,
            timeout_ms: default_timeout(),
        }
    }
}
