//! Analysis result, errors and the analyzer trait.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ticket::{Category, Urgency};

/// Shortest acceptable drafted response, in characters.
pub const MIN_DRAFT_CHARS: usize = 10;

/// Error type for analysis operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid analysis: {0}")]
    Validation(String),

    #[error("Analyzer not configured: {0}")]
    NotConfigured(String),
}

/// Validated triage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAnalysis {
    /// 1 (very negative) to 10 (very positive).
    pub sentiment: u8,
    pub urgency: Urgency,
    pub category: Category,
    /// Drafted reply to the customer.
    pub draft: String,
}

impl TicketAnalysis {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(1..=10).contains(&self.sentiment) {
            return Err(AnalysisError::Validation(format!(
                "sentiment must be between 1 and 10, got {}",
                self.sentiment
            )));
        }
        if self.draft.trim().chars().count() < MIN_DRAFT_CHARS {
            return Err(AnalysisError::Validation(format!(
                "draft must be at least {} characters",
                MIN_DRAFT_CHARS
            )));
        }
        Ok(())
    }
}

/// Analysis as returned by an upstream model, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnalysis {
    pub sentiment: f64,
    pub urgency: String,
    pub category: String,
    pub draft: String,
}

impl TryFrom<RawAnalysis> for TicketAnalysis {
    type Error = AnalysisError;

    fn try_from(raw: RawAnalysis) -> Result<Self, Self::Error> {
        if !raw.sentiment.is_finite() || raw.sentiment.fract() != 0.0 {
            return Err(AnalysisError::Validation(format!(
                "sentiment must be an integer, got {}",
                raw.sentiment
            )));
        }
        if !(1.0..=10.0).contains(&raw.sentiment) {
            return Err(AnalysisError::Validation(format!(
                "sentiment must be between 1 and 10, got {}",
                raw.sentiment
            )));
        }

        // Exact enum spelling is part of the response schema.
        let urgency = match raw.urgency.as_str() {
            "LOW" | "MEDIUM" | "HIGH" => Urgency::from_str(&raw.urgency),
            _ => Err(format!("unknown urgency: {}", raw.urgency)),
        }
        .map_err(AnalysisError::Validation)?;
        let category = match raw.category.as_str() {
            "BILLING" | "TECHNICAL" | "FEATURE_REQUEST" => Category::from_str(&raw.category),
            _ => Err(format!("unknown category: {}", raw.category)),
        }
        .map_err(AnalysisError::Validation)?;

        let analysis = TicketAnalysis {
            sentiment: raw.sentiment as u8,
            urgency,
            category,
            draft: raw.draft,
        };
        analysis.validate()?;
        Ok(analysis)
    }
}

/// Parse and validate a model's JSON output.
pub fn parse_analysis(text: &str) -> Result<TicketAnalysis, AnalysisError> {
    let raw: RawAnalysis = serde_json::from_str(text)
        .map_err(|e| AnalysisError::Provider(format!("malformed response: {}", e)))?;
    TicketAnalysis::try_from(raw)
}

/// Configured analysis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// Deterministic keyword rules; no network.
    Mock,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::Mock => "mock",
            AiProvider::OpenAi => "openai",
            AiProvider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for ticket analyzers.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Provider name (e.g., "mock", "openai").
    fn provider(&self) -> &str;

    /// Classify a ticket and draft a response.
    async fn analyze(&self, title: &str, description: &str)
        -> Result<TicketAnalysis, AnalysisError>;
}
