use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::calls::store::{CallDirection, CallRecord, CallStatus};
use crate::AppState;

use super::call::check_auth;

#[derive(Debug, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    pub from: String,
    pub to: String,
    pub direction: &'static str,
    pub status: &'static str,
    pub agent_id: String,
    pub turns: usize,
    pub duration_secs: Option<u64>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CallDetail {
    #[serde(flatten)]
    pub summary: CallSummary,
    pub transcript: Vec<TurnView>,
}

#[derive(Debug, Serialize)]
pub struct TurnView {
    pub caller: String,
    pub agent: String,
    pub at: String,
}

fn direction_str(direction: CallDirection) -> &'static str {
    match direction {
        CallDirection::Inbound => "inbound",
        CallDirection::Outbound => "outbound",
    }
}

fn status_str(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Queued => "queued",
        CallStatus::Ringing => "ringing",
        CallStatus::InProgress => "in-progress",
        CallStatus::Completed => "completed",
        CallStatus::Failed => "failed",
        CallStatus::Busy => "busy",
        CallStatus::NoAnswer => "no-answer",
    }
}

fn summarize(record: &CallRecord) -> CallSummary {
    CallSummary {
        call_id: record.call_id.clone(),
        from: record.from.clone(),
        to: record.to.clone(),
        direction: direction_str(record.direction),
        status: status_str(record.status),
        agent_id: record.agent_id.clone(),
        turns: record.turns.len(),
        duration_secs: record.duration_secs,
        created_at: record.created_at.to_rfc3339(),
    }
}

/// GET /api/calls — retained call records, oldest first. Bearer auth.
pub async fn list_calls(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let summaries: Vec<CallSummary> = state.calls.list().await.iter().map(summarize).collect();
    Json(summaries).into_response()
}

/// GET /api/calls/{id} — one call with its full transcript. Bearer auth.
pub async fn get_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let Some(record) = state.calls.get(&id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let detail = CallDetail {
        summary: summarize(&record),
        transcript: record
            .turns
            .iter()
            .map(|t| TurnView {
                caller: t.caller.clone(),
                agent: t.agent.clone(),
                at: t.at.to_rfc3339(),
            })
            .collect(),
    };
    Json(detail).into_response()
}
