use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::calls::machine::{CallEvent, Instruction};
use crate::calls::store::CallStatus;
use crate::twilio::twiml;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VoiceParams {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "To", default)]
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct GatherParams {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    /// Absent when the gather timed out without any speech.
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: String,
    #[serde(rename = "CallDuration", default)]
    pub call_duration: Option<String>,
}

/// POST /twilio/voice — a call reached us (inbound ring, or an outbound call
/// that was just answered). Responds with TwiML for the greeting.
pub async fn handle_voice(
    State(state): State<AppState>,
    Form(params): Form<VoiceParams>,
) -> Response {
    let event = CallEvent::Incoming {
        call_id: params.call_sid,
        from: params.from,
        to: params.to,
    };
    respond(&state, state.machine.handle_event(event).await)
}

/// POST /twilio/voice/gather — one listen window finished; the recognized
/// speech (possibly none) drives the next turn.
pub async fn handle_gather(
    State(state): State<AppState>,
    Form(params): Form<GatherParams>,
) -> Response {
    let event = CallEvent::Speech {
        call_id: params.call_sid,
        text: params.speech_result.unwrap_or_default(),
    };
    respond(&state, state.machine.handle_event(event).await)
}

/// POST /twilio/voice/status — call progress notification. Side channel
/// only: the record is updated and no TwiML is returned.
pub async fn handle_status(
    State(state): State<AppState>,
    Form(params): Form<StatusParams>,
) -> Response {
    let event = CallEvent::Status {
        call_id: params.call_sid,
        status: CallStatus::from_platform(&params.call_status),
        duration_secs: params.call_duration.and_then(|d| d.parse().ok()),
    };
    state.machine.handle_event(event).await;
    ().into_response()
}

fn respond(state: &AppState, instruction: Option<Instruction>) -> Response {
    let instruction = instruction.unwrap_or(Instruction::Hangup);
    let action = gather_action(&state.config.server.external_url);
    let body = twiml::render(&instruction, &action);
    ([("Content-Type", "text/xml")], body).into_response()
}

fn gather_action(external_url: &str) -> String {
    format!("{}/twilio/voice/gather", external_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_action_is_rooted_at_external_url() {
        assert_eq!(
            gather_action("https://desk.example.com/"),
            "https://desk.example.com/twilio/voice/gather"
        );
    }
}
