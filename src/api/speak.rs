//! Local announcement endpoint
//!
//! `POST /speak {"text": "..."}` lets other services on the LAN make the
//! assistant say something. The request is accepted immediately and spoken
//! by the daemon between utterances.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use serde::Deserialize;
use tokio::sync::mpsc::error::TrySendError;

use super::ApiState;

/// Announcement body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpeakRequest {
    /// Text to speak
    #[serde(default)]
    pub text: String,
}

/// Build speak router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/speak", post(speak))
        .with_state(state)
}

/// Queue an announcement
async fn speak(State(state): State<Arc<ApiState>>, Json(request): Json<SpeakRequest>) -> StatusCode {
    let text = request.text.trim();
    if text.is_empty() {
        tracing::debug!("empty announcement ignored");
        return StatusCode::ACCEPTED;
    }

    tracing::info!(text = %text, "speak request");
    match state.speak_tx.try_send(SpeakRequest {
        text: text.to_string(),
    }) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("announcement queue full, request dropped");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(TrySendError::Closed(_)) => {
            tracing::warn!("daemon not accepting announcements");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
