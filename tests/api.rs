//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use yui_voice::api::{ApiServerBuilder, SpeakRequest};
use yui_voice::voice::{MediaStore, MediaType, SynthesizedAudio};

/// Build a test API router
fn build_test_router(
    capacity: usize,
) -> (axum::Router, Arc<MediaStore>, mpsc::Receiver<SpeakRequest>) {
    let media = Arc::new(MediaStore::new("http://10.0.0.101:18765"));
    let (speak_tx, speak_rx) = mpsc::channel(capacity);
    let router = ApiServerBuilder::new(0, Arc::clone(&media), speak_tx)
        .build()
        .router();
    (router, media, speak_rx)
}

fn speak_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/speak")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _media, _rx) = build_test_router(4);

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_speak_queues_announcement() {
    let (app, _media, mut rx) = build_test_router(4);

    let response = app
        .oneshot(speak_request(r#"{"text": "  Le dîner est servi.  "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        rx.try_recv().unwrap(),
        SpeakRequest {
            text: "Le dîner est servi.".to_string()
        }
    );
}

#[tokio::test]
async fn test_speak_ignores_empty_text() {
    let (app, _media, mut rx) = build_test_router(4);

    let response = app.clone().oneshot(speak_request(r#"{"text": "   "}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.oneshot(speak_request("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_speak_rejects_invalid_json() {
    let (app, _media, mut rx) = build_test_router(4);

    let response = app.oneshot(speak_request("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_speak_refuses_when_queue_is_full() {
    let (app, _media, _rx) = build_test_router(1);

    let first = app
        .clone()
        .oneshot(speak_request(r#"{"text": "Un."}"#))
        .await
        .unwrap();
    let second = app
        .oneshot(speak_request(r#"{"text": "Deux."}"#))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_tts_not_found_before_publish() {
    let (app, _media, _rx) = build_test_router(4);

    let response = app.oneshot(get("/tts/1700000000000.mp3")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tts_serves_published_audio() {
    let (app, media, _rx) = build_test_router(4);
    let bytes = vec![0xFF, 0xFB, 0x90, 0x64];

    let url = media.publish(SynthesizedAudio::new(bytes.clone(), MediaType::Mpeg));
    let file = url.rsplit('/').next().unwrap();

    let response = app.oneshot(get(&format!("/tts/{file}"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.as_ref(), bytes.as_slice());
}

#[tokio::test]
async fn test_tts_does_not_serve_replaced_audio() {
    let (app, media, _rx) = build_test_router(4);

    let first = media.publish(SynthesizedAudio::new(vec![1], MediaType::Wav));
    media.publish(SynthesizedAudio::new(vec![2], MediaType::Wav));
    let stale = first.rsplit('/').next().unwrap();

    let response = app.oneshot(get(&format!("/tts/{stale}"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_spawn_reports_taken_port() {
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let (speak_tx, _speak_rx) = mpsc::channel(1);
    let media = Arc::new(MediaStore::new("http://10.0.0.101:18765"));

    let result = ApiServerBuilder::new(port, media, speak_tx)
        .build()
        .spawn()
        .await;

    assert!(result.is_err());
}
