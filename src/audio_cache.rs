use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

/// Synthesized audio is deterministic per (provider, voice, text), so repeated
/// prompts — a fixed greeting, the retry line — collapse to one vendor call.
///
/// Eviction is coarse: the whole cache is flushed on a fixed interval instead
/// of tracking per-entry expiry. Bounded memory, at the cost of sometimes
/// re-synthesizing an entry that was younger than the nominal lifetime.
#[derive(Clone, Default)]
pub struct AudioCache {
    by_key: Arc<DashMap<(String, String, String), CachedAudio>>,
    by_id: Arc<DashMap<Uuid, Bytes>>,
}

#[derive(Clone)]
pub struct CachedAudio {
    pub id: Uuid,
    pub audio: Bytes,
    created_at: Instant,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, provider: &str, voice: &str, text: &str) -> Option<CachedAudio> {
        self.by_key
            .get(&(provider.to_string(), voice.to_string(), text.to_string()))
            .map(|entry| entry.clone())
    }

    pub fn put(&self, provider: &str, voice: &str, text: &str, audio: Bytes) -> Uuid {
        let id = Uuid::new_v4();
        self.by_id.insert(id, audio.clone());
        self.by_key.insert(
            (provider.to_string(), voice.to_string(), text.to_string()),
            CachedAudio {
                id,
                audio,
                created_at: Instant::now(),
            },
        );
        id
    }

    /// Lookup by entry id, used to serve `<Play>` URLs.
    pub fn get_by_id(&self, id: &Uuid) -> Option<Bytes> {
        self.by_id.get(id).map(|entry| entry.clone())
    }

    /// Clear everything. Called from the periodic sweep task.
    pub fn flush(&self) -> usize {
        let count = self.by_key.len();
        let oldest_secs = self
            .by_key
            .iter()
            .map(|entry| entry.created_at.elapsed())
            .max()
            .unwrap_or(Duration::ZERO)
            .as_secs();
        self.by_key.clear();
        self.by_id.clear();
        if count > 0 {
            tracing::info!(entries = count, oldest_secs, "Flushed audio cache");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn spawn_sweeper(self, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh cache
            // isn't flushed at startup.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.flush();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_identical_bytes() {
        let cache = AudioCache::new();
        let audio = Bytes::from_static(b"\xff\xf3audio-frames");
        cache.put("elevenlabs", "rachel", "Hello there", audio.clone());

        let hit = cache.get("elevenlabs", "rachel", "Hello there").unwrap();
        assert_eq!(hit.audio, audio);
    }

    #[test]
    fn key_is_provider_voice_and_text() {
        let cache = AudioCache::new();
        cache.put("elevenlabs", "rachel", "Hello", Bytes::from_static(b"a"));

        assert!(cache.get("openai", "rachel", "Hello").is_none());
        assert!(cache.get("elevenlabs", "nova", "Hello").is_none());
        assert!(cache.get("elevenlabs", "rachel", "Goodbye").is_none());
    }

    #[test]
    fn id_lookup_serves_stored_audio() {
        let cache = AudioCache::new();
        let audio = Bytes::from_static(b"mp3");
        let id = cache.put("openai", "alloy", "Hi", audio.clone());
        assert_eq!(cache.get_by_id(&id).unwrap(), audio);
        assert!(cache.get_by_id(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn flush_clears_both_indexes() {
        let cache = AudioCache::new();
        let id = cache.put("openai", "alloy", "Hi", Bytes::from_static(b"x"));
        cache.put("openai", "alloy", "Bye", Bytes::from_static(b"y"));

        assert_eq!(cache.flush(), 2);
        assert!(cache.get("openai", "alloy", "Hi").is_none());
        assert!(cache.get_by_id(&id).is_none());
        assert!(cache.is_empty());
    }
}
