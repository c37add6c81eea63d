//! OpenAI chat-completions analyzer with strict structured output.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{parse_analysis, AnalysisError, Analyzer, TicketAnalysis, SYSTEM_PROMPT};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Analyzer backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl OpenAiAnalyzer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AnalysisError::NotConfigured(
                "api_key is required for the openai provider".to_string(),
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

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, title: &str, description: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Ticket Title: {}\nTicket Description: {}",
                        title, description
                    ),
                },
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "ticket_analysis",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "sentiment": {
                                "type": "number",
                                "description": "Sentiment score from 1-10 (1=negative, 10=positive)"
                            },
                            "urgency": { "type": "string", "enum": ["LOW", "MEDIUM", "HIGH"] },
                            "category": {
                                "type": "string",
                                "enum": ["BILLING", "TECHNICAL", "FEATURE_REQUEST"]
                            },
                            "draft": {
                                "type": "string",
                                "description": "A polite and concise response draft to the customer"
                            }
                        },
                        "required": ["sentiment", "urgency", "category", "draft"],
                        "additionalProperties": false
                    }
                }
            }),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: serde_json::Value,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn analyze(
        &self,
        title: &str,
        description: &str,
    ) -> Result<TicketAnalysis, AnalysisError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(title, description))
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let status = response.status().as_u16();

        if status != 200 {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(AnalysisError::Provider(format!("{} - {}", status, message)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AnalysisError::Provider("no content received".to_string()))?;

        parse_analysis(&content)
    }
}

pub(super) fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> AnalysisError {
    if error.is_timeout() {
        AnalysisError::Timeout(timeout)
    } else {
        AnalysisError::Provider(error.to_string())
    }
}
