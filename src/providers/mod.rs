pub mod llm;
pub mod tts;

use std::sync::Arc;

use crate::config::Config;

/// Which side of the conversation a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Chat completion — the agent's brain.
    Language,
    /// Text-to-speech — the agent's voice.
    Speech,
}

/// Static description of a vendor: identity and what it can run.
/// Never mutated at runtime; availability is computed per call.
#[derive(Debug)]
pub struct ProviderDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    /// Supported models (language) or voices (speech).
    pub models: &'static [&'static str],
    pub default_model: &'static str,
}

const LANGUAGE_PROVIDERS: &[ProviderDescriptor] = &[
    ProviderDescriptor {
        id: "openai",
        name: "OpenAI",
        models: &["gpt-4o", "gpt-4o-mini", "gpt-4.1-mini"],
        default_model: "gpt-4o-mini",
    },
    ProviderDescriptor {
        id: "anthropic",
        name: "Anthropic",
        models: &["claude-3-5-haiku-latest", "claude-3-5-sonnet-latest"],
        default_model: "claude-3-5-haiku-latest",
    },
    ProviderDescriptor {
        id: "groq",
        name: "Groq",
        models: &["llama-3.3-70b-versatile", "llama-3.1-8b-instant"],
        default_model: "llama-3.3-70b-versatile",
    },
];

const SPEECH_PROVIDERS: &[ProviderDescriptor] = &[
    ProviderDescriptor {
        id: "elevenlabs",
        name: "ElevenLabs",
        models: &["EXAVITQu4vr4xnSDxMaL", "21m00Tcm4TlvDq8ikWAM"],
        default_model: "EXAVITQu4vr4xnSDxMaL",
    },
    ProviderDescriptor {
        id: "openai",
        name: "OpenAI TTS",
        models: &["alloy", "echo", "nova", "shimmer"],
        default_model: "alloy",
    },
    // Rides on the telephony platform: no synthesis call of its own, just a
    // voice-name hint rendered into the call instruction.
    ProviderDescriptor {
        id: "twilio",
        name: "Twilio <Say>",
        models: &["Polly.Joanna", "Polly.Matthew", "alice"],
        default_model: "Polly.Joanna",
    },
];

/// Lookup over the known vendors plus a fresh credential check.
///
/// `is_available` always re-reads configuration (including the process
/// environment), so a credential exported while the server is running
/// becomes usable without a restart.
#[derive(Clone)]
pub struct ProviderRegistry {
    config: Arc<Config>,
}

impl ProviderRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn table(kind: ProviderKind) -> &'static [ProviderDescriptor] {
        match kind {
            ProviderKind::Language => LANGUAGE_PROVIDERS,
            ProviderKind::Speech => SPEECH_PROVIDERS,
        }
    }

    /// Unknown ids yield `None`, never a panic.
    pub fn describe(&self, kind: ProviderKind, id: &str) -> Option<&'static ProviderDescriptor> {
        Self::table(kind).iter().find(|d| d.id == id)
    }

    /// True iff the provider exists and its required credential is currently
    /// configured. The Twilio voice is special-cased: it rides on the
    /// already-verified telephony channel and needs no credential of its own.
    pub fn is_available(&self, kind: ProviderKind, id: &str) -> bool {
        if self.describe(kind, id).is_none() {
            return false;
        }
        match (kind, id) {
            (ProviderKind::Language, "openai") => {
                has_credential(&self.config.openai.api_key, "OPENAI_API_KEY")
            }
            (ProviderKind::Language, "anthropic") => {
                has_credential(&self.config.anthropic.api_key, "ANTHROPIC_API_KEY")
            }
            (ProviderKind::Language, "groq") => {
                has_credential(&self.config.groq.api_key, "GROQ_API_KEY")
            }
            (ProviderKind::Speech, "elevenlabs") => {
                has_credential(&self.config.elevenlabs.api_key, "ELEVENLABS_API_KEY")
            }
            (ProviderKind::Speech, "openai") => {
                has_credential(&self.config.openai.api_key, "OPENAI_API_KEY")
            }
            (ProviderKind::Speech, "twilio") => true,
            _ => false,
        }
    }

    /// Known providers that are usable right now, in descriptor order.
    pub fn list_available(&self, kind: ProviderKind) -> Vec<&'static str> {
        Self::table(kind)
            .iter()
            .filter(|d| self.is_available(kind, d.id))
            .map(|d| d.id)
            .collect()
    }
}

fn has_credential(configured: &str, env_key: &str) -> bool {
    if !configured.trim().is_empty() {
        return true;
    }
    std::env::var(env_key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 0
        external_url = "https://desk.test"

        [twilio]
        account_sid = "ACtest"
        auth_token = "token"
        phone_number = "+15550001111"
    "#;
    toml::from_str(toml).expect("test config")
}
