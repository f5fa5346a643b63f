use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::AppState;

/// GET /audio/{id} — serve cached synthesized audio for TwiML `<Play>`.
///
/// Entries disappear on the periodic cache flush; Twilio fetches the URL
/// within moments of receiving the TwiML, so a 404 here means a badly stale
/// or fabricated id.
pub async fn serve_audio(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(audio) = Uuid::parse_str(&id)
        .ok()
        .and_then(|id| state.cache.get_by_id(&id))
    else {
        tracing::warn!(id = %id, "Audio requested for unknown cache entry");
        return StatusCode::NOT_FOUND.into_response();
    };

    ([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response()
}
