use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;

/// A language-model vendor. Closed set: one adapter per id, all normalizing
/// into the same reply-text shape. The router never sees vendor fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmVendor {
    OpenAi,
    Anthropic,
    Groq,
}

impl LlmVendor {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "groq" => Some(Self::Groq),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Groq => "groq",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A fully-resolved completion request: model and sampling already chosen
/// by the router, messages already bounded to the recent window.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no credential configured for {0}")]
    CredentialMissing(&'static str),
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("empty or malformed response")]
    EmptyResponse,
}

/// Vendor seam used by the model router. Stubbed in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, vendor: LlmVendor, req: &ChatRequest) -> Result<String, ProviderError>;
}

/// Real HTTP adapter over the supported chat-completion vendors.
pub struct LlmClient {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl LlmClient {
    pub fn new(config: Arc<Config>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.routing.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn openai_compatible(
        &self,
        base_url: &str,
        api_key: &str,
        req: &ChatRequest,
    ) -> Result<String, ProviderError> {
        let messages: Vec<serde_json::Value> = req
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        let resp = self
            .client
            .post(format!("{base_url}/chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {body}")));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        non_empty(text)
    }

    async fn anthropic(&self, api_key: &str, req: &ChatRequest) -> Result<String, ProviderError> {
        // Anthropic takes the system instruction as a top-level field, not a turn
        let system: String = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages: Vec<serde_json::Value> = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }

        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {body}")));
        }

        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        non_empty(text)
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn complete(&self, vendor: LlmVendor, req: &ChatRequest) -> Result<String, ProviderError> {
        match vendor {
            LlmVendor::OpenAi => {
                let key = credential(&self.config.openai.api_key, "OPENAI_API_KEY", "openai")?;
                self.openai_compatible("https://api.openai.com/v1", &key, req)
                    .await
            }
            LlmVendor::Groq => {
                let key = credential(&self.config.groq.api_key, "GROQ_API_KEY", "groq")?;
                self.openai_compatible("https://api.groq.com/openai/v1", &key, req)
                    .await
            }
            LlmVendor::Anthropic => {
                let key = credential(
                    &self.config.anthropic.api_key,
                    "ANTHROPIC_API_KEY",
                    "anthropic",
                )?;
                self.anthropic(&key, req).await
            }
        }
    }
}

pub(crate) fn credential(
    configured: &str,
    env_key: &str,
    provider: &'static str,
) -> Result<String, ProviderError> {
    if !configured.trim().is_empty() {
        return Ok(configured.to_string());
    }
    match std::env::var(env_key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ProviderError::CredentialMissing(provider)),
    }
}

fn non_empty(text: String) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_ids_round_trip() {
        for vendor in [LlmVendor::OpenAi, LlmVendor::Anthropic, LlmVendor::Groq] {
            assert_eq!(LlmVendor::from_id(vendor.id()), Some(vendor));
        }
        assert_eq!(LlmVendor::from_id("cohere"), None);
    }

    #[test]
    fn missing_credential_is_typed() {
        let err = credential("", "VOICE_DESK_TEST_NO_SUCH_KEY", "openai").unwrap_err();
        assert!(matches!(err, ProviderError::CredentialMissing("openai")));
    }

    #[test]
    fn configured_credential_wins_over_env() {
        let key = credential("sk-configured", "HOME", "openai").unwrap();
        assert_eq!(key, "sk-configured");
    }

    #[test]
    fn blank_reply_is_an_error() {
        assert!(matches!(
            non_empty("   \n".to_string()),
            Err(ProviderError::EmptyResponse)
        ));
        assert_eq!(non_empty("ok".to_string()).unwrap(), "ok");
    }
}
