//! Main loop tests: feedback suppression and startup failures
//!
//! The loop runs on a loopback socket against an in-process orchestrator
//! that always answers with one sentence.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, http::header, response::IntoResponse, routing::post};
use secrecy::SecretString;
use tokio::sync::mpsc;
use yui_voice::config::OrchestratorConfig;
use yui_voice::pipeline::{OrchestratorClient, PlaybackConsumer, Responder};
use yui_voice::voice::{
    MediaStore, PlaybackDevice, Transcriber, UdpIngest, UtteranceTranscriber,
};
use yui_voice::{Config, Daemon, Result, VoiceLoop};

mod common;
use common::{MockSynthesizer, RecordingDevice, frame_bytes, test_vad_config};

const REPLY: &str = "D'accord.";

/// Speaking user, well above the speech threshold
const VOICE: i16 = 1_000;

/// The assistant heard back through the microphone
const ECHO: i16 = 8_000;

/// Peak above which a transcribed utterance must have contained echo
const ECHO_PEAK: f32 = 0.15;

/// Transcriber that answers from a script and records each utterance's peak
struct ScriptedTranscriber {
    script: Mutex<VecDeque<&'static str>>,
    peaks: Mutex<Vec<f32>>,
}

impl ScriptedTranscriber {
    fn new(script: &[&'static str]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            peaks: Mutex::new(Vec::new()),
        }
    }

    fn peaks(&self) -> Vec<f32> {
        self.peaks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    fn engine(&self) -> &'static str {
        "scripted"
    }

    async fn transcribe(&self, samples: &[f32], _sample_rate: u32) -> Result<String> {
        let peak = samples.iter().fold(0.0_f32, |max, s| max.max(s.abs()));
        self.peaks.lock().unwrap().push(peak);
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
            .to_string())
    }
}

async fn stream_handler() -> impl IntoResponse {
    let body = format!(
        "data: {}\n\ndata: [DONE]\n\n",
        serde_json::json!({ "token": REPLY })
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

async fn spawn_orchestrator() -> Arc<OrchestratorClient> {
    let app = Router::new().route("/order/stream", post(stream_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Arc::new(
        OrchestratorClient::new(&OrchestratorConfig {
            order_url: format!("http://{addr}/order"),
            stream_url: format!("http://{addr}/order/stream"),
            bearer_token: SecretString::from("yui-test".to_string()),
            stream_timeout: Duration::from_secs(5),
            fallback_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    )
}

/// One complete utterance: 10 voiced frames, then 5 silent ones
fn utterance(amplitude: i16) -> Vec<u8> {
    let mut bytes = Vec::new();
    for _ in 0..10 {
        bytes.extend_from_slice(&frame_bytes(amplitude));
    }
    for _ in 0..5 {
        bytes.extend_from_slice(&frame_bytes(0));
    }
    bytes
}

/// A running loop and the handles a test drives it with
struct Harness {
    addr: SocketAddr,
    sender: std::net::UdpSocket,
    device: Arc<RecordingDevice>,
    transcriber: Arc<ScriptedTranscriber>,
    shutdown: mpsc::Sender<()>,
    _speak_tx: mpsc::Sender<yui_voice::api::SpeakRequest>,
    task: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn start(script: &[&'static str]) -> Self {
        let ingest = UdpIngest::bind("127.0.0.1:0".parse().unwrap(), Duration::from_millis(100))
            .await
            .unwrap();
        let addr = ingest.local_addr().unwrap();

        let media = Arc::new(MediaStore::new("http://10.0.0.101:18765"));
        let device = Arc::new(RecordingDevice::new(Arc::clone(&media)));
        let responder = Responder::new(
            Arc::new(MockSynthesizer::new()),
            spawn_orchestrator().await,
            PlaybackConsumer::new(
                Some(Arc::clone(&device) as Arc<dyn PlaybackDevice>),
                media,
            ),
        );

        let transcriber = Arc::new(ScriptedTranscriber::new(script));
        let voice = VoiceLoop::new(
            ingest,
            test_vad_config(),
            UtteranceTranscriber::new(Arc::clone(&transcriber) as Arc<dyn Transcriber>),
            responder,
        )
        .unwrap();

        let (speak_tx, speak_rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(voice.run(speak_rx, shutdown_rx));

        Self {
            addr,
            sender: std::net::UdpSocket::bind("127.0.0.1:0").unwrap(),
            device,
            transcriber,
            shutdown,
            _speak_tx: speak_tx,
            task,
        }
    }

    fn send(&self, datagram: &[u8]) {
        self.sender.send_to(datagram, self.addr).unwrap();
    }

    async fn stop(self) {
        self.shutdown.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_audio_heard_during_reply_is_discarded() {
    let harness = Harness::start(&["Allume la lumière", "Merci"]).await;

    harness.send(&utterance(VOICE));
    wait_until(|| harness.device.played().len() == 1).await;

    // The device is now speaking; the microphone hears it
    harness.send(&utterance(ECHO));

    // Playback of a short clip is waited out for at least 1.35 s
    tokio::time::sleep(Duration::from_secs(2)).await;
    harness.send(&utterance(VOICE));
    wait_until(|| harness.transcriber.peaks().len() == 2).await;

    let peaks = harness.transcriber.peaks();
    assert!(peaks.iter().all(|&p| p < ECHO_PEAK), "echo was transcribed: {peaks:?}");
    wait_until(|| harness.device.played() == vec![REPLY, REPLY]).await;

    harness.stop().await;
}

#[tokio::test]
async fn test_empty_transcription_keeps_listening_to_the_same_datagram() {
    let harness = Harness::start(&["", "Bonjour"]).await;

    // Two utterances back to back in one datagram
    let mut datagram = utterance(VOICE);
    datagram.extend_from_slice(&utterance(ECHO));
    harness.send(&datagram);

    wait_until(|| harness.transcriber.peaks().len() == 2).await;
    wait_until(|| harness.device.played().len() == 1).await;

    let peaks = harness.transcriber.peaks();
    assert!(peaks[0] < ECHO_PEAK);
    assert!(peaks[1] > ECHO_PEAK);

    harness.stop().await;
}

#[tokio::test]
async fn test_rest_of_datagram_is_dropped_after_a_reply() {
    let harness = Harness::start(&["Allume la lumière", "Merci"]).await;

    let mut datagram = utterance(VOICE);
    datagram.extend_from_slice(&utterance(ECHO));
    harness.send(&datagram);

    wait_until(|| harness.device.played().len() == 1).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(harness.transcriber.peaks().len(), 1);
    assert_eq!(harness.device.played(), vec![REPLY]);

    harness.stop().await;
}

#[tokio::test]
async fn test_run_fails_when_http_port_is_taken() {
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port().to_string();

    let vars = [
        ("HTTP_PORT", port.as_str()),
        ("VOICE_UDP_PORT", "0"),
        ("PLAYBACK_DEVICE", "none"),
        ("WHISPER_API_KEY", "sk-test"),
        ("VAD_CONFIG", "/nonexistent/vad.toml"),
    ];
    let config = Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_string())
    })
    .unwrap();
    let daemon = Daemon::new(config).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), daemon.run())
        .await
        .expect("run kept going on a taken port");

    let error = result.unwrap_err().to_string();
    assert!(error.contains("failed to bind API server"), "{error}");
}
