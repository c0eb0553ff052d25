//! Published audio endpoint
//!
//! Renderers fetch `GET /tts/<id>.<ext>` after a play command. Only the
//! audio currently published is served.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use super::ApiState;

/// Build media router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/tts/{file}", get(published_audio))
        .with_state(state)
}

async fn published_audio(State(state): State<Arc<ApiState>>, Path(file): Path<String>) -> Response {
    let Some(audio) = state.media.get(&file) else {
        tracing::debug!(%file, "requested audio not published");
        return StatusCode::NOT_FOUND.into_response();
    };

    (
        [
            (header::CONTENT_TYPE, audio.media_type.mime()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        audio.bytes.clone(),
    )
        .into_response()
}
