//! Google Gemini analyzer using `generateContent` with a response schema.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::openai::map_reqwest_error;
use super::{parse_analysis, AnalysisError, Analyzer, TicketAnalysis, SYSTEM_PROMPT};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Analyzer backed by the Gemini REST API.
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl GeminiAnalyzer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AnalysisError::NotConfigured(
                "api_key is required for the gemini provider".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(title: &str, description: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: format!(
                        "{}\n\nTicket Title: {}\nTicket Description: {}",
                        SYSTEM_PROMPT, title, description
                    ),
                }],
            }],
            generation_config: json!({
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "sentiment": {
                            "type": "NUMBER",
                            "description": "Sentiment score from 1-10 (1=negative, 10=positive)"
                        },
                        "urgency": {
                            "type": "STRING",
                            "enum": ["LOW", "MEDIUM", "HIGH"],
                            "format": "enum"
                        },
                        "category": {
                            "type": "STRING",
                            "enum": ["BILLING", "TECHNICAL", "FEATURE_REQUEST"],
                            "format": "enum"
                        },
                        "draft": {
                            "type": "STRING",
                            "description": "A polite and concise response draft to the customer"
                        }
                    },
                    "required": ["sentiment", "urgency", "category", "draft"]
                }
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

/// Models sometimes wrap JSON in a markdown code fence despite the mime type.
fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

#[async_trait]
impl Analyzer for GeminiAnalyzer {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn analyze(
        &self,
        title: &str,
        description: &str,
    ) -> Result<TicketAnalysis, AnalysisError> {
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.api_base, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(title, description))
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let status = response.status().as_u16();

        if status != 200 {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(AnalysisError::Provider(format!("{} - {}", status, message)));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let text = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AnalysisError::Provider("no content received".to_string()))?;

        parse_analysis(&strip_code_fences(&text))
    }
}
