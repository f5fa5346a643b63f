use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Busy,
    NoAnswer,
}

impl CallStatus {
    /// Parse a telephony-platform status string. Unknown values map to the
    /// nearest non-terminal state instead of erroring.
    pub fn from_platform(s: &str) -> Self {
        match s {
            "queued" | "initiated" => Self::Queued,
            "ringing" => Self::Ringing,
            "in-progress" | "answered" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" | "canceled" => Self::Failed,
            "busy" => Self::Busy,
            "no-answer" => Self::NoAnswer,
            other => {
                tracing::warn!(status = other, "Unknown call status");
                Self::InProgress
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Busy | Self::NoAnswer
        )
    }
}

/// One utterance-and-reply pair.
#[derive(Debug, Clone)]
pub struct TranscriptTurn {
    pub caller: String,
    pub agent: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: String,
    pub from: String,
    pub to: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub agent_id: String,
    pub turns: Vec<TranscriptTurn>,
    pub duration_secs: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields known when a call first appears.
#[derive(Debug, Clone)]
pub struct NewCall {
    pub from: String,
    pub to: String,
    pub direction: CallDirection,
    pub agent_id: String,
}

struct Inner {
    records: HashMap<String, CallRecord>,
    /// Insertion order, for bounded retention and recency listing.
    order: VecDeque<String>,
}

/// Append-mostly log of call metadata and transcripts. Bounded: the oldest
/// records are dropped once the count exceeds `max_records`.
#[derive(Clone)]
pub struct CallStore {
    inner: Arc<Mutex<Inner>>,
    max_records: usize,
}

impl CallStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: HashMap::new(),
                order: VecDeque::new(),
            })),
            max_records: max_records.max(1),
        }
    }

    /// Register a call. Idempotent under telephony-platform retries: a second
    /// register with the same id returns the existing record untouched.
    pub async fn register(&self, call_id: &str, new_call: NewCall) -> CallRecord {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.records.get(call_id) {
            return existing.clone();
        }

        let now = Utc::now();
        let record = CallRecord {
            call_id: call_id.to_string(),
            from: new_call.from,
            to: new_call.to,
            direction: new_call.direction,
            status: CallStatus::Ringing,
            agent_id: new_call.agent_id,
            turns: Vec::new(),
            duration_secs: None,
            created_at: now,
            updated_at: now,
        };
        inner.records.insert(call_id.to_string(), record.clone());
        inner.order.push_back(call_id.to_string());
        Self::enforce_retention(&mut inner, self.max_records);

        tracing::info!(
            call_id,
            from = %record.from,
            to = %record.to,
            direction = ?record.direction,
            agent = %record.agent_id,
            "Call registered"
        );
        record
    }

    /// Apply a status update. Creates a minimal record when the call was
    /// never registered, tolerating out-of-order webhook delivery. A record
    /// in a terminal status only accepts late duration updates.
    pub async fn update_status(
        &self,
        call_id: &str,
        status: CallStatus,
        duration_secs: Option<u64>,
    ) -> CallRecord {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.records.get_mut(call_id) {
            if !record.status.is_terminal() {
                record.status = status;
            }
            if let Some(d) = duration_secs {
                record.duration_secs = Some(d);
            }
            record.updated_at = Utc::now();
            return record.clone();
        }

        let now = Utc::now();
        let record = CallRecord {
            call_id: call_id.to_string(),
            from: String::new(),
            to: String::new(),
            direction: CallDirection::Inbound,
            status,
            agent_id: String::new(),
            turns: Vec::new(),
            duration_secs,
            created_at: now,
            updated_at: now,
        };
        inner.records.insert(call_id.to_string(), record.clone());
        inner.order.push_back(call_id.to_string());
        Self::enforce_retention(&mut inner, self.max_records);
        tracing::debug!(call_id, "Status arrived before registration, created stub");
        record
    }

    /// Append one utterance/reply turn. Returns false for unknown calls.
    pub async fn append_turn(&self, call_id: &str, caller: &str, agent: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(call_id) else {
            tracing::warn!(call_id, "Transcript append for unknown call");
            return false;
        };
        record.turns.push(TranscriptTurn {
            caller: caller.to_string(),
            agent: agent.to_string(),
            at: Utc::now(),
        });
        record.updated_at = Utc::now();
        true
    }

    pub async fn get(&self, call_id: &str) -> Option<CallRecord> {
        self.inner.lock().await.records.get(call_id).cloned()
    }

    /// All retained records, oldest first.
    pub async fn list(&self) -> Vec<CallRecord> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    fn enforce_retention(inner: &mut Inner, max_records: usize) {
        while inner.order.len() > max_records {
            if let Some(oldest) = inner.order.pop_front() {
                inner.records.remove(&oldest);
                tracing::debug!(call_id = %oldest, "Dropped oldest call record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_call() -> NewCall {
        NewCall {
            from: "+15551110000".to_string(),
            to: "+15550001111".to_string(),
            direction: CallDirection::Inbound,
            agent_id: "sales".to_string(),
        }
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let store = CallStore::new(100);
        let first = store.register("CA1", new_call()).await;

        let mut retried = new_call();
        retried.from = "+19998887777".to_string();
        let second = store.register("CA1", retried).await;

        // Retry returns the original record, new fields ignored
        assert_eq!(second.from, first.from);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn transcript_preserves_arrival_order() {
        let store = CallStore::new(100);
        store.register("CA1", new_call()).await;
        assert!(store.append_turn("CA1", "u1", "r1").await);
        // A status update interleaved with speech turns must not corrupt them
        store
            .update_status("CA1", CallStatus::InProgress, None)
            .await;
        assert!(store.append_turn("CA1", "u2", "r2").await);

        let record = store.get("CA1").await.unwrap();
        assert_eq!(record.turns.len(), 2);
        assert_eq!(record.turns[0].caller, "u1");
        assert_eq!(record.turns[0].agent, "r1");
        assert_eq!(record.turns[1].caller, "u2");
        assert_eq!(record.status, CallStatus::InProgress);
    }

    #[tokio::test]
    async fn status_before_registration_creates_stub() {
        let store = CallStore::new(100);
        let record = store
            .update_status("CA9", CallStatus::Completed, Some(42))
            .await;
        assert_eq!(record.status, CallStatus::Completed);
        assert_eq!(record.duration_secs, Some(42));
        assert!(store.get("CA9").await.is_some());
    }

    #[tokio::test]
    async fn terminal_status_freezes_except_duration() {
        let store = CallStore::new(100);
        store.register("CA1", new_call()).await;
        store
            .update_status("CA1", CallStatus::Completed, None)
            .await;

        let record = store
            .update_status("CA1", CallStatus::Ringing, Some(17))
            .await;
        assert_eq!(record.status, CallStatus::Completed);
        assert_eq!(record.duration_secs, Some(17));
    }

    #[tokio::test]
    async fn retention_drops_oldest_records() {
        let store = CallStore::new(3);
        for i in 0..5 {
            store.register(&format!("CA{i}"), new_call()).await;
        }
        assert_eq!(store.len().await, 3);
        assert!(store.get("CA0").await.is_none());
        assert!(store.get("CA1").await.is_none());
        assert!(store.get("CA4").await.is_some());

        let ids: Vec<String> = store.list().await.into_iter().map(|r| r.call_id).collect();
        assert_eq!(ids, vec!["CA2", "CA3", "CA4"]);
    }

    #[test]
    fn platform_status_parsing() {
        assert_eq!(CallStatus::from_platform("ringing"), CallStatus::Ringing);
        assert_eq!(
            CallStatus::from_platform("in-progress"),
            CallStatus::InProgress
        );
        assert_eq!(CallStatus::from_platform("no-answer"), CallStatus::NoAnswer);
        assert!(CallStatus::from_platform("completed").is_terminal());
        assert!(!CallStatus::from_platform("somethingelse").is_terminal());
    }
}
