pub mod model;
pub mod speech;

use std::time::Duration;

use crate::providers::llm::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("no provider with a usable credential is configured")]
    NoProviderAvailable,
    #[error("all candidate providers failed, last error: {last}")]
    AllProvidersFailed { last: ProviderError },
}

/// Per-request routing outcome, produced for observability only.
#[derive(Debug)]
pub struct RoutingDecision {
    pub kind: &'static str,
    pub provider: String,
    pub choice: String,
    pub attempted: Vec<String>,
    pub latency: Duration,
    pub from_cache: bool,
}

impl RoutingDecision {
    pub fn log(&self) {
        tracing::info!(
            kind = self.kind,
            provider = %self.provider,
            choice = %self.choice,
            attempted = ?self.attempted,
            latency_ms = self.latency.as_millis() as u64,
            from_cache = self.from_cache,
            "Routed request"
        );
    }
}

/// Candidate order: the preferred provider first, then the configured
/// fallback chain with duplicates removed. Availability filtering happens at
/// walk time so a credential exported mid-flight is picked up.
pub(crate) fn candidate_order(preferred: &str, fallback: &[String]) -> Vec<String> {
    let mut order = vec![preferred.to_string()];
    for id in fallback {
        if !order.iter().any(|seen| seen == id) {
            order.push(id.clone());
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_leads_and_duplicates_collapse() {
        let fallback = vec![
            "openai".to_string(),
            "groq".to_string(),
            "anthropic".to_string(),
        ];
        let order = candidate_order("groq", &fallback);
        assert_eq!(order, vec!["groq", "openai", "anthropic"]);
    }

    #[test]
    fn preferred_outside_fallback_is_still_first() {
        let fallback = vec!["a".to_string(), "b".to_string()];
        let order = candidate_order("z", &fallback);
        assert_eq!(order, vec!["z", "a", "b"]);
    }
}
