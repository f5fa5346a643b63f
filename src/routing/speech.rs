use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use uuid::Uuid;

use crate::audio_cache::AudioCache;
use crate::config::Config;
use crate::providers::tts::{SpeechBackend, TtsVendor};
use crate::providers::{ProviderKind, ProviderRegistry};
use crate::routing::{candidate_order, RouteError, RoutingDecision};

/// Provider id of the synthesis-free platform voice.
const PLATFORM_VOICE: &str = "twilio";

#[derive(Debug, Clone, Default)]
pub struct SpeakOptions {
    pub provider: Option<String>,
    pub voice: Option<String>,
}

/// What the chosen provider produced.
#[derive(Debug, Clone)]
pub enum SpeechOutput {
    /// Synthesized audio, cached and addressable by id.
    Audio { id: Uuid, audio: Bytes },
    /// No audio on our side: a voice-name directive the telephony platform
    /// renders itself.
    PlatformVoice { voice: String },
}

#[derive(Debug, Clone)]
pub struct SpokenReply {
    pub output: SpeechOutput,
    pub provider: &'static str,
    pub voice: String,
    pub latency: Duration,
    pub from_cache: bool,
}

/// Speech-synthesis twin of the model router: same candidate-then-fallback
/// walk, with the audio cache consulted before any vendor call.
pub struct SpeechRouter {
    backend: Arc<dyn SpeechBackend>,
    registry: ProviderRegistry,
    cache: AudioCache,
    config: Arc<Config>,
}

impl SpeechRouter {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        registry: ProviderRegistry,
        cache: AudioCache,
        config: Arc<Config>,
    ) -> Self {
        Self {
            backend,
            registry,
            cache,
            config,
        }
    }

    pub async fn synthesize(
        &self,
        text: &str,
        opts: &SpeakOptions,
    ) -> Result<SpokenReply, RouteError> {
        let preferred = opts
            .provider
            .clone()
            .unwrap_or_else(|| self.config.routing.tts.clone());
        let order = candidate_order(&preferred, &self.config.routing.tts_fallback);

        let candidates: Vec<String> = order
            .into_iter()
            .filter(|id| {
                let available = self.registry.is_available(ProviderKind::Speech, id);
                if !available {
                    tracing::debug!(provider = %id, "Skipping unavailable speech provider");
                }
                available
            })
            .collect();

        if candidates.is_empty() {
            return Err(RouteError::NoProviderAvailable);
        }

        let mut attempted = Vec::new();
        let mut last_error = None;

        for id in candidates {
            attempted.push(id.clone());

            // Nothing to synthesize or cache for the platform voice; the
            // instruction just names a voice for the platform to render.
            if id == PLATFORM_VOICE {
                let voice = opts
                    .voice
                    .clone()
                    .unwrap_or_else(|| self.config.twilio.say_voice.clone());
                RoutingDecision {
                    kind: "tts",
                    provider: id,
                    choice: voice.clone(),
                    attempted,
                    latency: Duration::ZERO,
                    from_cache: false,
                }
                .log();
                return Ok(SpokenReply {
                    output: SpeechOutput::PlatformVoice {
                        voice: voice.clone(),
                    },
                    provider: PLATFORM_VOICE,
                    voice,
                    latency: Duration::ZERO,
                    from_cache: false,
                });
            }

            let Some(vendor) = TtsVendor::from_id(&id) else {
                tracing::warn!(provider = %id, "Unknown speech provider in fallback chain");
                continue;
            };
            let voice = opts
                .voice
                .clone()
                .unwrap_or_else(|| self.voice_for(vendor));

            // Consult the cache on the final chosen key before any vendor call
            if let Some(hit) = self.cache.get(vendor.id(), &voice, text) {
                RoutingDecision {
                    kind: "tts",
                    provider: vendor.id().to_string(),
                    choice: voice.clone(),
                    attempted,
                    latency: Duration::ZERO,
                    from_cache: true,
                }
                .log();
                return Ok(SpokenReply {
                    output: SpeechOutput::Audio {
                        id: hit.id,
                        audio: hit.audio,
                    },
                    provider: vendor.id(),
                    voice,
                    latency: Duration::ZERO,
                    from_cache: true,
                });
            }

            let started = Instant::now();
            match self.backend.synthesize(vendor, &voice, text).await {
                Ok(audio) => {
                    let latency = started.elapsed();
                    let id = self.cache.put(vendor.id(), &voice, text, audio.clone());
                    RoutingDecision {
                        kind: "tts",
                        provider: vendor.id().to_string(),
                        choice: voice.clone(),
                        attempted,
                        latency,
                        from_cache: false,
                    }
                    .log();
                    return Ok(SpokenReply {
                        output: SpeechOutput::Audio { id, audio },
                        provider: vendor.id(),
                        voice,
                        latency,
                        from_cache: false,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        provider = vendor.id(),
                        voice = %voice,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "Speech provider failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(RouteError::AllProvidersFailed {
            last: last_error
                .unwrap_or(crate::providers::llm::ProviderError::EmptyResponse),
        })
    }

    fn voice_for(&self, vendor: TtsVendor) -> String {
        match vendor {
            TtsVendor::ElevenLabs => self.config.elevenlabs.voice_id.clone(),
            TtsVendor::OpenAi => self.config.openai.tts_voice.clone(),
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

    struct ScriptedSpeech {
        calls: Mutex<Vec<&'static str>>,
        failing: Vec<TtsVendor>,
    }

    impl ScriptedSpeech {
        fn new(failing: Vec<TtsVendor>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing,
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpeechBackend for ScriptedSpeech {
        async fn synthesize(
            &self,
            vendor: TtsVendor,
            _voice: &str,
            text: &str,
        ) -> Result<Bytes, ProviderError> {
            self.calls.lock().unwrap().push(vendor.id());
            if self.failing.contains(&vendor) {
                Err(ProviderError::Api("quota exceeded".to_string()))
            } else {
                Ok(Bytes::from(format!("mp3:{text}")))
            }
        }
    }

    fn router(
        backend: Arc<ScriptedSpeech>,
        keys: &[&str],
    ) -> (SpeechRouter, AudioCache) {
        let mut config = test_config();
        for key in keys {
            match *key {
                "elevenlabs" => config.elevenlabs.api_key = "el-test".into(),
                "openai" => config.openai.api_key = "sk-test".into(),
                _ => unreachable!(),
            }
        }
        let config = Arc::new(config);
        let registry = ProviderRegistry::new(config.clone());
        let cache = AudioCache::new();
        (
            SpeechRouter::new(backend, registry, cache.clone(), config),
            cache,
        )
    }

    #[tokio::test]
    async fn synthesis_result_is_cached_and_replayed() {
        let backend = Arc::new(ScriptedSpeech::new(vec![]));
        let (router, _cache) = router(backend.clone(), &["elevenlabs"]);

        let first = router
            .synthesize("Hello!", &SpeakOptions::default())
            .await
            .unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.provider, "elevenlabs");

        let second = router
            .synthesize("Hello!", &SpeakOptions::default())
            .await
            .unwrap();
        assert!(second.from_cache);
        // Only the first request reached the vendor
        assert_eq!(backend.calls().len(), 1);

        match (first.output, second.output) {
            (SpeechOutput::Audio { audio: a, .. }, SpeechOutput::Audio { audio: b, .. }) => {
                assert_eq!(a, b)
            }
            other => panic!("expected audio outputs, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sweep_makes_the_next_request_miss() {
        let backend = Arc::new(ScriptedSpeech::new(vec![]));
        let (router, cache) = router(backend.clone(), &["elevenlabs"]);

        router
            .synthesize("Hello!", &SpeakOptions::default())
            .await
            .unwrap();
        cache.flush();

        let reply = router
            .synthesize("Hello!", &SpeakOptions::default())
            .await
            .unwrap();
        assert!(!reply.from_cache);
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_vendor_falls_through_to_next() {
        let backend = Arc::new(ScriptedSpeech::new(vec![TtsVendor::ElevenLabs]));
        let (router, _cache) = router(backend.clone(), &["elevenlabs", "openai"]);

        let reply = router
            .synthesize("Hi", &SpeakOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.provider, "openai");
        assert_eq!(backend.calls(), vec!["elevenlabs", "openai"]);
    }

    #[tokio::test]
    async fn platform_voice_needs_no_vendor_and_no_cache() {
        for key in ["ELEVENLABS_API_KEY", "OPENAI_API_KEY"] {
            if std::env::var(key).is_ok() {
                return; // availability is read from the environment too
            }
        }
        // No synthesis credentials at all: the chain bottoms out at the
        // platform voice, which always works
        let backend = Arc::new(ScriptedSpeech::new(vec![]));
        let (router, cache) = router(backend.clone(), &[]);

        let reply = router
            .synthesize("Hi there", &SpeakOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.provider, "twilio");
        assert!(matches!(
            reply.output,
            SpeechOutput::PlatformVoice { ref voice } if voice == "Polly.Joanna"
        ));
        assert!(backend.calls().is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn explicit_voice_overrides_vendor_default() {
        let backend = Arc::new(ScriptedSpeech::new(vec![]));
        let (router, cache) = router(backend.clone(), &["openai"]);

        let opts = SpeakOptions {
            provider: Some("openai".to_string()),
            voice: Some("nova".to_string()),
        };
        let reply = router.synthesize("Hi", &opts).await.unwrap();
        assert_eq!(reply.voice, "nova");
        assert!(cache.get("openai", "nova", "Hi").is_some());
    }
}
