use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::providers::llm::{ChatBackend, ChatMessage, ChatRequest, LlmVendor};
use crate::providers::{ProviderKind, ProviderRegistry};
use crate::routing::{candidate_order, RouteError, RoutingDecision};
use crate::session::Channel;

/// Routing hint for one completion request.
#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    pub channel: Option<Channel>,
    /// Explicit provider override; otherwise the per-channel default applies.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub provider: &'static str,
    pub model: String,
    pub latency: Duration,
}

/// Picks a language-model vendor per request and walks the configured
/// fallback chain on failure. One attempt per candidate, no backoff — a
/// live caller is waiting.
pub struct ModelRouter {
    backend: Arc<dyn ChatBackend>,
    registry: ProviderRegistry,
    config: Arc<Config>,
}

impl ModelRouter {
    pub fn new(backend: Arc<dyn ChatBackend>, registry: ProviderRegistry, config: Arc<Config>) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    pub async fn complete(
        &self,
        turns: &[ChatMessage],
        opts: &CompleteOptions,
    ) -> Result<Completion, RouteError> {
        let preferred = self.preferred_provider(opts);
        let order = candidate_order(&preferred, &self.config.routing.llm_fallback);

        let candidates: Vec<LlmVendor> = order
            .iter()
            .filter(|id| {
                let available = self.registry.is_available(ProviderKind::Language, id);
                if !available {
                    // Unconfigured providers are skipped silently; this is
                    // routing, not an error
                    tracing::debug!(provider = %id, "Skipping unavailable language provider");
                }
                available
            })
            .filter_map(|id| LlmVendor::from_id(id))
            .collect();

        if candidates.is_empty() {
            return Err(RouteError::NoProviderAvailable);
        }

        let mut attempted = Vec::new();
        let mut last_error = None;

        for vendor in candidates {
            let model = opts
                .model
                .clone()
                .unwrap_or_else(|| self.model_for(vendor));
            let request = ChatRequest {
                model: model.clone(),
                messages: turns.to_vec(),
                max_tokens: opts.max_tokens.unwrap_or(self.config.routing.max_tokens),
                temperature: opts
                    .temperature
                    .unwrap_or(self.config.routing.temperature),
            };

            attempted.push(vendor.id().to_string());
            let started = Instant::now();
            match self.backend.complete(vendor, &request).await {
                Ok(text) => {
                    let latency = started.elapsed();
                    RoutingDecision {
                        kind: "llm",
                        provider: vendor.id().to_string(),
                        choice: model.clone(),
                        attempted,
                        latency,
                        from_cache: false,
                    }
                    .log();
                    return Ok(Completion {
                        text,
                        provider: vendor.id(),
                        model,
                        latency,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        provider = vendor.id(),
                        model = %model,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "Language provider failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(RouteError::AllProvidersFailed {
            last: last_error.unwrap_or(crate::providers::llm::ProviderError::EmptyResponse),
        })
    }

    fn preferred_provider(&self, opts: &CompleteOptions) -> String {
        if let Some(ref provider) = opts.provider {
            return provider.clone();
        }
        match opts.channel {
            Some(Channel::Chat) => self.config.routing.chat_llm.clone(),
            _ => self.config.routing.voice_llm.clone(),
        }
    }

    fn model_for(&self, vendor: LlmVendor) -> String {
        match vendor {
            LlmVendor::OpenAi => self.config.openai.model.clone(),
            LlmVendor::Anthropic => self.config.anthropic.model.clone(),
            LlmVendor::Groq => self.config.groq.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::ProviderError;
    use crate::providers::test_config;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted backend: records invocation order, fails listed vendors.
    struct ScriptedBackend {
        calls: Mutex<Vec<&'static str>>,
        failing: Vec<LlmVendor>,
        reply: String,
    }

    impl ScriptedBackend {
        fn new(failing: Vec<LlmVendor>, reply: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing,
                reply: reply.to_string(),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(
            &self,
            vendor: LlmVendor,
            _req: &ChatRequest,
        ) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push(vendor.id());
            if self.failing.contains(&vendor) {
                Err(ProviderError::Api("503: overloaded".to_string()))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    fn router(backend: Arc<ScriptedBackend>, keys: &[&str]) -> ModelRouter {
        let mut config = test_config();
        for key in keys {
            match *key {
                "openai" => config.openai.api_key = "sk-test".into(),
                "anthropic" => config.anthropic.api_key = "sk-ant".into(),
                "groq" => config.groq.api_key = "gsk".into(),
                _ => unreachable!(),
            }
        }
        let config = Arc::new(config);
        let registry = ProviderRegistry::new(config.clone());
        ModelRouter::new(backend, registry, config)
    }

    fn turns() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are a test persona."),
            ChatMessage::user("hello"),
        ]
    }

    #[tokio::test]
    async fn uses_the_channel_default_when_available() {
        let backend = Arc::new(ScriptedBackend::new(vec![], "hi"));
        let router = router(backend.clone(), &["openai", "groq", "anthropic"]);

        let completion = router
            .complete(&turns(), &CompleteOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.provider, "openai");
        assert_eq!(completion.text, "hi");
        assert_eq!(backend.calls(), vec!["openai"]);
    }

    #[tokio::test]
    async fn credential_less_providers_are_never_invoked() {
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return; // availability is read from the environment too
        }
        // openai has no key: the first available fallback is invoked instead
        let backend = Arc::new(ScriptedBackend::new(vec![], "hi"));
        let router = router(backend.clone(), &["groq", "anthropic"]);

        let completion = router
            .complete(&turns(), &CompleteOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.provider, "groq");
        assert!(!backend.calls().contains(&"openai"));
    }

    #[tokio::test]
    async fn fallback_stops_at_first_success() {
        // Chain openai -> groq -> anthropic; openai fails, groq succeeds,
        // anthropic must never be attempted
        let backend = Arc::new(ScriptedBackend::new(vec![LlmVendor::OpenAi], "fallback hi"));
        let router = router(backend.clone(), &["openai", "groq", "anthropic"]);

        let completion = router
            .complete(&turns(), &CompleteOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.provider, "groq");
        assert_eq!(backend.calls(), vec!["openai", "groq"]);
    }

    #[tokio::test]
    async fn explicit_provider_overrides_channel_default() {
        let backend = Arc::new(ScriptedBackend::new(vec![], "hi"));
        let router = router(backend.clone(), &["openai", "groq", "anthropic"]);

        let opts = CompleteOptions {
            provider: Some("anthropic".to_string()),
            ..Default::default()
        };
        let completion = router.complete(&turns(), &opts).await.unwrap();
        assert_eq!(completion.provider, "anthropic");
    }

    #[tokio::test]
    async fn no_credentials_anywhere_is_no_provider_available() {
        for key in ["OPENAI_API_KEY", "ANTHROPIC_API_KEY", "GROQ_API_KEY"] {
            if std::env::var(key).is_ok() {
                return;
            }
        }
        let backend = Arc::new(ScriptedBackend::new(vec![], "hi"));
        let router = router(backend.clone(), &[]);

        let err = router
            .complete(&turns(), &CompleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::NoProviderAvailable));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn exhausted_chain_carries_last_error() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![LlmVendor::OpenAi, LlmVendor::Anthropic, LlmVendor::Groq],
            "unused",
        ));
        let router = router(backend.clone(), &["openai", "groq", "anthropic"]);

        let err = router
            .complete(&turns(), &CompleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::AllProvidersFailed { .. }));
        assert_eq!(backend.calls().len(), 3);
    }
}
