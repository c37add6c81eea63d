//! AI analysis: classify a ticket and draft a response.
//!
//! The backend is picked once at startup by [`create_analyzer`].

mod config;
mod gemini;
mod mock;
mod openai;
mod types;

pub use config::AiConfig;
pub use gemini::GeminiAnalyzer;
pub use mock::MockAnalyzer;
pub use openai::OpenAiAnalyzer;
pub use types::{
    parse_analysis, AiProvider, AnalysisError, Analyzer, RawAnalysis, TicketAnalysis,
    MIN_DRAFT_CHARS,
};

use std::sync::Arc;
use std::time::Duration;

pub(crate) const SYSTEM_PROMPT: &str =
    "You are a helpful support triage assistant. Analyze the incoming ticket and output the results.";

/// Factory function to create the analyzer from config.
pub fn create_analyzer(config: &AiConfig) -> Result<Arc<dyn Analyzer>, AnalysisError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let api_key = || config.api_key.clone().unwrap_or_default();

    match config.provider {
        AiProvider::Mock => Ok(Arc::new(MockAnalyzer::new())),
        AiProvider::OpenAi => {
            let mut analyzer = OpenAiAnalyzer::new(api_key(), config.model.clone(), timeout)?;
            if let Some(ref base_url) = config.base_url {
                analyzer = analyzer.with_api_base(base_url.clone());
            }
            Ok(Arc::new(analyzer))
        }
        AiProvider::Gemini => {
            let mut analyzer = GeminiAnalyzer::new(api_key(), config.model.clone(), timeout)?;
            if let Some(ref base_url) = config.base_url {
                analyzer = analyzer.with_api_base(base_url.clone());
            }
            Ok(Arc::new(analyzer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_analyzer() {
        let analyzer = create_analyzer(&AiConfig::default()).unwrap();
        assert_eq!(analyzer.provider(), "mock");
    }

    #[test]
    fn test_create_openai_analyzer() {
        let config = AiConfig {
            provider: AiProvider::OpenAi,
            api_key: Some("sk-test".to_string()),
            base_url: Some("http://localhost:1234/v1".to_string()),
            ..Default::default()
        };
        let analyzer = create_analyzer(&config).unwrap();
        assert_eq!(analyzer.provider(), "openai");
    }

    #[test]
    fn test_create_real_provider_without_key_fails() {
        for provider in [AiProvider::OpenAi, AiProvider::Gemini] {
            let config = AiConfig {
                provider,
                api_key: None,
                ..Default::default()
            };
            assert!(matches!(
                create_analyzer(&config),
                Err(AnalysisError::NotConfigured(_))
            ));
        }
    }
}
