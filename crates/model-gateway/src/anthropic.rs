//! Anthropic Messages API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ModelError;
use crate::{CompletionRequest, ModelClient};

/// Default API endpoint
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub user_agent: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        AnthropicConfig {
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            model: std::env::var("STORYFORGE_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
            user_agent: concat!("storyforge-model-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AnthropicConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn classify_error(status: u16, body: &str) -> ModelError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    match status {
        401 | 403 => ModelError::Auth { status, message },
        _ => ModelError::Api { status, message },
    }
}

fn extract_text(body: &str) -> Result<String, ModelError> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Envelope(e.to_string()))?;
    if parsed.stop_reason.as_deref() == Some("max_tokens") {
        debug!("model response stopped at the token budget");
    }
    let text: String = parsed
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();
    if text.trim().is_empty() {
        return Err(ModelError::Envelope("response contained no text".to_string()));
    }
    Ok(text)
}

/// Anthropic Messages API client
pub struct AnthropicClient {
    config: AnthropicConfig,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, ModelError> {
        if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ModelError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self, ModelError> {
        Self::new(AnthropicConfig::from_env())
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let api_key = self.config.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: [UserMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .http
            .post(self.config.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_error(status, &text));
        }
        extract_text(&text)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_key() {
        let config = AnthropicConfig {
            api_key: None,
            ..AnthropicConfig::default()
        };
        assert!(matches!(
            AnthropicClient::new(config),
            Err(ModelError::MissingApiKey)
        ));
    }

    #[test]
    fn test_messages_url() {
        let config = AnthropicConfig {
            base_url: "https://proxy.internal/".to_string(),
            ..AnthropicConfig::default()
        };
        assert_eq!(config.messages_url(), "https://proxy.internal/v1/messages");
    }

    #[test]
    fn test_extract_text_joins_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"\"b\"}"}],"stop_reason":"end_turn"}"#;
        assert_eq!(extract_text(body).unwrap(), r#"{"a":"b"}"#);
    }

    #[test]
    fn test_extract_text_rejects_empty() {
        let body = r#"{"content":[],"stop_reason":"end_turn"}"#;
        assert!(matches!(extract_text(body), Err(ModelError::Envelope(_))));
    }

    #[test]
    fn test_classify_error_reads_envelope() {
        let err = classify_error(
            429,
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#,
        );
        assert_eq!(
            err,
            ModelError::Api {
                status: 429,
                message: "slow down".into()
            }
        );
        assert!(matches!(
            classify_error(401, "nope"),
            ModelError::Auth { status: 401, .. }
        ));
    }
}
