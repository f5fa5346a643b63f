use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub groq: GroqConfig,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub calls: CallsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub external_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    /// Voice name passed through in `<Say>` when no synthesis provider is used.
    #[serde(default = "default_say_voice")]
    pub say_voice: String,
}

fn default_say_voice() -> String {
    "Polly.Joanna".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_voice")]
    pub tts_voice: String,
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_voice() -> String {
    "alloy".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GroqConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_groq_model")]
    pub model: String,
}

fn default_groq_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ElevenLabsConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_elevenlabs_model")]
    pub model: String,
}

fn default_voice_id() -> String {
    "EXAVITQu4vr4xnSDxMaL".to_string()
}

fn default_elevenlabs_model() -> String {
    "eleven_turbo_v2_5".to_string()
}

/// Provider selection and failover order. Fallback chains are ordered data,
/// not code — operators can reorder or extend them without a rebuild.
#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    /// Default language-model provider for the voice channel.
    #[serde(default = "default_voice_llm")]
    pub voice_llm: String,
    /// Default language-model provider for text-chat channels.
    #[serde(default = "default_chat_llm")]
    pub chat_llm: String,
    #[serde(default = "default_llm_fallback")]
    pub llm_fallback: Vec<String>,
    #[serde(default = "default_tts")]
    pub tts: String,
    #[serde(default = "default_tts_fallback")]
    pub tts_fallback: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            voice_llm: default_voice_llm(),
            chat_llm: default_chat_llm(),
            llm_fallback: default_llm_fallback(),
            tts: default_tts(),
            tts_fallback: default_tts_fallback(),
            request_timeout_secs: default_request_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_voice_llm() -> String {
    "openai".to_string()
}

fn default_chat_llm() -> String {
    "groq".to_string()
}

fn default_llm_fallback() -> Vec<String> {
    vec![
        "openai".to_string(),
        "groq".to_string(),
        "anthropic".to_string(),
    ]
}

fn default_tts() -> String {
    "elevenlabs".to_string()
}

fn default_tts_fallback() -> Vec<String> {
    vec![
        "elevenlabs".to_string(),
        "openai".to_string(),
        "twilio".to_string(),
    ]
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Profile used when no bound phone number matches the called number.
    #[serde(default = "default_agent_id")]
    pub default_id: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_id: default_agent_id(),
        }
    }
}

fn default_agent_id() -> String {
    "sales".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_session_sweep")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_session_sweep(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    900
}

fn default_session_sweep() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_flush")]
    pub flush_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_cache_flush(),
        }
    }
}

fn default_cache_flush() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct CallsConfig {
    /// Oldest call records are dropped past this count.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// How many prior turns are replayed to the language model.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            history_window: default_history_window(),
        }
    }
}

fn default_max_records() -> usize {
    500
}

fn default_history_window() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiConfig {
    /// Bearer token required for /api/* endpoints. If empty, all requests are rejected.
    #[serde(default)]
    pub token: String,
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file from same directory as config.toml
        let env_path = config_dir().join(".env");
        match dotenvy::from_path(&env_path) {
            Ok(()) => tracing::info!("Loaded .env from {}", env_path.display()),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!(
                    "No .env file at {}, using environment only",
                    env_path.display()
                );
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let path = config_path();
        tracing::info!("Loading config from {}", path.display());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            format!(
                "Failed to read config at {}: {}. Run voice-desk --setup to create it",
                path.display(),
                e,
            )
        })?;

        let mut config: Config = toml::from_str(&contents)?;

        // Allow env var overrides for secrets
        if let Ok(v) = std::env::var("TWILIO_ACCOUNT_SID") {
            config.twilio.account_sid = v;
        }
        if let Ok(v) = std::env::var("TWILIO_AUTH_TOKEN") {
            config.twilio.auth_token = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            config.openai.api_key = v;
        }
        if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
            config.anthropic.api_key = v;
        }
        if let Ok(v) = std::env::var("GROQ_API_KEY") {
            config.groq.api_key = v;
        }
        if let Ok(v) = std::env::var("ELEVENLABS_API_KEY") {
            config.elevenlabs.api_key = v;
        }
        if let Ok(v) = std::env::var("VOICE_DESK_API_TOKEN") {
            config.api.token = v;
        }
        if let Ok(v) = std::env::var("SERVER_EXTERNAL_URL") {
            config.server.external_url = v;
        }

        Ok(config)
    }
}

pub fn config_dir() -> PathBuf {
    if let Ok(p) = std::env::var("VOICE_DESK_CONFIG") {
        // If pointing to a file, use its parent directory
        let path = PathBuf::from(p);
        return path.parent().map(|p| p.to_path_buf()).unwrap_or(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".voice-desk")
}

fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("VOICE_DESK_CONFIG") {
        return PathBuf::from(p);
    }

    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 8443
            external_url = "https://desk.example.com"

            [twilio]
            account_sid = "ACxxx"
            auth_token = "secret"
            phone_number = "+15550001111"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.routing.voice_llm, "openai");
        assert_eq!(config.routing.tts_fallback.last().unwrap(), "twilio");
        assert_eq!(config.twilio.say_voice, "Polly.Joanna");
        assert_eq!(config.calls.history_window, 8);
        assert!(config.api.token.is_empty());
    }

    #[test]
    fn fallback_chain_is_operator_data() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 1
            external_url = ""

            [twilio]
            account_sid = ""
            auth_token = ""
            phone_number = ""

            [routing]
            llm_fallback = ["groq"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.routing.llm_fallback, vec!["groq".to_string()]);
    }
}
