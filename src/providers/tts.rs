use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::Config;
use crate::providers::llm::{credential, ProviderError};

/// A speech-synthesis vendor that actually produces audio bytes.
///
/// The Twilio platform voice is deliberately absent: it never synthesizes
/// anything on our side, so the speech router handles it without a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsVendor {
    ElevenLabs,
    OpenAi,
}

impl TtsVendor {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "elevenlabs" => Some(Self::ElevenLabs),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::ElevenLabs => "elevenlabs",
            Self::OpenAi => "openai",
        }
    }
}

/// Per-request character limit shared by the supported vendors.
const MAX_CHARS: usize = 2000;

/// Vendor seam used by the speech router. Stubbed in tests.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(
        &self,
        vendor: TtsVendor,
        voice: &str,
        text: &str,
    ) -> Result<Bytes, ProviderError>;
}

/// Real HTTP adapter over the supported synthesis vendors. Returns MP3 audio
/// suitable for a TwiML `<Play>` of a URL we serve ourselves.
pub struct TtsClient {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl TtsClient {
    pub fn new(config: Arc<Config>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.routing.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn elevenlabs_chunk(&self, voice: &str, text: &str) -> Result<Bytes, ProviderError> {
        let key = credential(
            &self.config.elevenlabs.api_key,
            "ELEVENLABS_API_KEY",
            "elevenlabs",
        )?;

        let body = serde_json::json!({
            "text": text,
            "model_id": &self.config.elevenlabs.model,
        });

        let resp = self
            .client
            .post(format!(
                "https://api.elevenlabs.io/v1/text-to-speech/{voice}"
            ))
            .header("xi-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {body}")));
        }

        resp.bytes()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))
    }

    async fn openai_chunk(&self, voice: &str, text: &str) -> Result<Bytes, ProviderError> {
        let key = credential(&self.config.openai.api_key, "OPENAI_API_KEY", "openai")?;

        let body = serde_json::json!({
            "model": "tts-1",
            "input": text,
            "voice": voice,
            "response_format": "mp3",
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {body}")));
        }

        resp.bytes()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))
    }
}

#[async_trait]
impl SpeechBackend for TtsClient {
    async fn synthesize(
        &self,
        vendor: TtsVendor,
        voice: &str,
        text: &str,
    ) -> Result<Bytes, ProviderError> {
        let chunks = split_text(text, MAX_CHARS);
        let mut all_audio = Vec::new();

        for chunk in &chunks {
            let audio = match vendor {
                TtsVendor::ElevenLabs => self.elevenlabs_chunk(voice, chunk).await?,
                TtsVendor::OpenAi => self.openai_chunk(voice, chunk).await?,
            };
            all_audio.extend_from_slice(&audio);
        }

        if all_audio.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(Bytes::from(all_audio))
    }
}

/// Split text at sentence boundaries to stay under the character limit.
///
/// Splits on `. `, `! `, `? ` boundaries. If a single sentence exceeds the
/// limit, falls back to splitting at the limit (mid-word if necessary).
fn split_text(text: &str, max_chars: usize) -> Vec<&str> {
    if text.len() <= max_chars {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            chunks.push(remaining);
            break;
        }

        // Find the last sentence boundary within the limit
        let search_slice = &remaining[..max_chars];
        let split_pos = search_slice
            .rmatch_indices(". ")
            .chain(search_slice.rmatch_indices("! "))
            .chain(search_slice.rmatch_indices("? "))
            .map(|(i, s)| i + s.len())
            .max();

        let pos = split_pos.unwrap_or(max_chars);
        chunks.push(&remaining[..pos]);
        remaining = remaining[pos..].trim_start();
    }

    chunks
}
