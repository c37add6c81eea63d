//! Deterministic keyword analyzer.

use async_trait::async_trait;

use super::{AnalysisError, Analyzer, TicketAnalysis};
use crate::ticket::{Category, Urgency};

/// Rule-based analyzer that never touches the network.
///
/// Keywords are matched case-insensitively against `title + description`:
/// - urgency: "urgent" → HIGH, else "error" → MEDIUM, else LOW
/// - category: "bug" → TECHNICAL, else "bill" → BILLING, else FEATURE_REQUEST
pub struct MockAnalyzer;

impl MockAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(title: &str, description: &str) -> TicketAnalysis {
        let text = format!("{}{}", title, description).to_lowercase();

        let urgency = if text.contains("urgent") {
            Urgency::High
        } else if text.contains("error") {
            Urgency::Medium
        } else {
            Urgency::Low
        };

        let category = if text.contains("bug") {
            Category::Technical
        } else if text.contains("bill") {
            Category::Billing
        } else {
            Category::FeatureRequest
        };

        TicketAnalysis {
            sentiment: 5,
            urgency,
            category,
            draft: format!(
                "Thank you for reaching out regarding \"{}\". We have logged your request.",
                title
            ),
        }
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn analyze(
        &self,
        title: &str,
        description: &str,
    ) -> Result<TicketAnalysis, AnalysisError> {
        Ok(Self::classify(title, description))
    }
}
