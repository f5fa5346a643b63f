use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

/// A conversational surface with its own event shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Voice,
    Chat,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerRole {
    Caller,
    Agent,
}

#[derive(Debug, Clone)]
pub struct SessionTurn {
    pub role: SpeakerRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Conversation state for one (channel, identity) pair, carried across the
/// independent events of a conversation.
#[derive(Debug)]
pub struct ConversationSession {
    pub channel: Channel,
    pub identity: String,
    /// Current step label, starts at "start".
    pub step: String,
    /// Key/value data extracted from the conversation so far.
    pub data: HashMap<String, String>,
    pub transcript: Vec<SessionTurn>,
    last_activity: Instant,
}

impl ConversationSession {
    fn new(channel: Channel, identity: String) -> Self {
        Self {
            channel,
            identity,
            step: "start".to_string(),
            data: HashMap::new(),
            transcript: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn record(&mut self, role: SpeakerRole, text: impl Into<String>) {
        self.transcript.push(SessionTurn {
            role,
            text: text.into(),
            at: Utc::now(),
        });
        self.touch();
    }

    /// Read a numeric counter out of the collected data, defaulting to 0.
    pub fn counter(&self, key: &str) -> u32 {
        self.data
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_counter(&mut self, key: &str, value: u32) {
        self.data.insert(key.to_string(), value.to_string());
    }
}

/// Keyed in-memory session state with inactivity-based eviction.
///
/// Entries are individually locked, so two events for the same identity
/// serialize against each other while unrelated identities never contend.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<DashMap<(Channel, String), Arc<Mutex<ConversationSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the session for an identity, creating it on first event.
    pub fn get_or_create(
        &self,
        channel: Channel,
        identity: &str,
    ) -> Arc<Mutex<ConversationSession>> {
        self.inner
            .entry((channel, identity.to_string()))
            .or_insert_with(|| {
                tracing::debug!(channel = channel.as_str(), identity, "Session created");
                Arc::new(Mutex::new(ConversationSession::new(
                    channel,
                    identity.to_string(),
                )))
            })
            .clone()
    }

    /// Remove sessions idle beyond the threshold. A session whose lock is
    /// currently held is mid-event and therefore not idle; it is skipped.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let mut removed = 0;
        self.inner.retain(|_, session| match session.try_lock() {
            Ok(guard) => {
                if guard.idle_for() > max_idle {
                    removed += 1;
                    false
                } else {
                    true
                }
            }
            Err(_) => true,
        });
        if removed > 0 {
            tracing::info!(removed, remaining = self.inner.len(), "Swept idle sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Run the inactivity sweep on a recurring timer, independent of
    /// request handling.
    pub fn spawn_sweeper(self, max_idle: Duration, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.sweep(max_idle);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_lazily_and_reuses() {
        let store = SessionStore::new();
        let a = store.get_or_create(Channel::Voice, "+15551230000");
        {
            let mut session = a.lock().await;
            assert_eq!(session.step, "start");
            assert!(session.transcript.is_empty());
            session.step = "engaged".to_string();
        }

        let again = store.get_or_create(Channel::Voice, "+15551230000");
        assert_eq!(again.lock().await.step, "engaged");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn channels_do_not_collide() {
        let store = SessionStore::new();
        store.get_or_create(Channel::Voice, "id-1");
        store.get_or_create(Channel::Chat, "id-1");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn sweep_removes_only_idle_sessions() {
        let store = SessionStore::new();
        store.get_or_create(Channel::Voice, "stale");
        tokio::time::sleep(Duration::from_millis(120)).await;

        let fresh = store.get_or_create(Channel::Voice, "fresh");
        fresh.lock().await.touch();

        let removed = store.sweep(Duration::from_millis(60));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        // The surviving entry is the fresh one: re-fetching it creates nothing
        store.get_or_create(Channel::Voice, "fresh");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sweep_skips_sessions_in_use() {
        let store = SessionStore::new();
        let busy = store.get_or_create(Channel::Voice, "busy");
        let guard = busy.lock().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Lock is still held: the sweep must not evict mid-event state
        assert_eq!(store.sweep(Duration::from_millis(1)), 0);
        assert_eq!(store.len(), 1);
        drop(guard);
    }

    #[tokio::test]
    async fn counters_round_trip_through_data() {
        let store = SessionStore::new();
        let session = store.get_or_create(Channel::Voice, "x");
        let mut session = session.lock().await;
        assert_eq!(session.counter("no_input"), 0);
        session.set_counter("no_input", 2);
        assert_eq!(session.counter("no_input"), 2);
    }
}
