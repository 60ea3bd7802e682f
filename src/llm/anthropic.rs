//! Anthropic Claude provider implementation

use super::types::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anthropic model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnthropicModel {
    Claude45Haiku,
    Claude45Sonnet,
    Claude35Haiku,
}

impl AnthropicModel {
    pub fn api_name(self) -> &'static str {
        match self {
            AnthropicModel::Claude45Haiku => "claude-haiku-4-5-20251001",
            AnthropicModel::Claude45Sonnet => "claude-sonnet-4-5-20250929",
            AnthropicModel::Claude35Haiku => "claude-3-5-haiku-20241022",
        }
    }

    pub fn model_id(self) -> &'static str {
        match self {
            AnthropicModel::Claude45Haiku => "claude-4.5-haiku",
            AnthropicModel::Claude45Sonnet => "claude-4.5-sonnet",
            AnthropicModel::Claude35Haiku => "claude-3.5-haiku",
        }
    }
}

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: AnthropicModel,
    base_url: String,
}

impl AnthropicService {
    pub fn new(api_key: String, model: AnthropicModel, gateway: Option<&str>) -> Result<Self, String> {
        let base_url = match gateway {
            Some(gw) => format!("{}/_/gateway/anthropic/v1/messages", gw.trim_end_matches('/')),
            None => "https://api.anthropic.com/v1/messages".to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> AnthropicRequest {
        let system: Vec<AnthropicSystemBlock> = request
            .system
            .iter()
            .map(|s| AnthropicSystemBlock {
                r#type: "text".to_string(),
                text: s.text.clone(),
            })
            .collect();

        let messages: Vec<AnthropicMessage> =
            request.messages.iter().map(translate_message).collect();

        AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: request.max_tokens.unwrap_or(1024),
            system,
            messages,
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::auth(format!("Authentication failed: {body}")),
            429 => {
                let mut err = LlmError::rate_limit(format!("Rate limited: {body}"));
                if let Some(retry_after) = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|parsed| parsed.get("error")?.get("retry_after")?.as_f64())
                {
                    err = err.with_retry_after(Duration::from_secs_f64(retry_after));
                }
                err
            }
            400 => LlmError::invalid_request(format!("Invalid request: {body}")),
            500..=599 => LlmError::server_error(format!("Server error: {body}")),
            _ => LlmError::unknown(format!("HTTP {status}: {body}")),
        }
    }
}

fn translate_message(msg: &LlmMessage) -> AnthropicMessage {
    let role = match msg.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };

    let content = msg
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        })
        .collect();

    AnthropicMessage {
        role: role.to_string(),
        content,
    }
}

fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
    let content = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(ContentBlock::Text { text }),
            AnthropicContentBlock::Other => None,
        })
        .collect();

    LlmResponse {
        content,
        end_turn: resp.stop_reason.as_deref() == Some("end_turn"),
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let anthropic_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        let anthropic_response: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(normalize_response(anthropic_response))
    }

    fn model_id(&self) -> &str {
        self.model.model_id()
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: Vec<AnthropicSystemBlock>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    r#type: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    /// Thinking, tool use and anything else we never ask for
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
