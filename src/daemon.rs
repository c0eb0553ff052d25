//! Daemon - the voice front-end service
//!
//! Owns every component and runs the main loop: UDP frames feed the
//! segmenter, finished utterances are transcribed and answered, and local
//! announcements are spoken between utterances.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::{ApiServerBuilder, SPEAK_QUEUE_CAPACITY, SpeakRequest};
use crate::pipeline::{OrchestratorClient, PlaybackConsumer, PlaybackReport, Responder, announce};
use crate::voice::{
    Frame, FrameAssembler, MediaStore, PlaybackDevice, Received, SegmentEvent, Synthesizer,
    UdpIngest, Utterance, UtteranceSegmenter, UtteranceTranscriber, VadConfig, build_synthesizer,
    build_transcriber, open_device,
};
use crate::{Config, Error, Result};

/// One turn of the main loop, owned so the ingest borrow ends before it is handled
enum Step {
    Shutdown,
    Announce(String),
    Frames(Vec<Frame>),
    Timeout,
    RecvError(Error),
}

/// The Yui voice daemon
pub struct Daemon {
    config: Config,
    synthesizer: Arc<dyn Synthesizer>,
    transcriber: UtteranceTranscriber,
    orchestrator: Arc<OrchestratorClient>,
    media: Arc<MediaStore>,
}

impl Daemon {
    /// Build every client from the configuration
    ///
    /// # Errors
    ///
    /// Returns error if an engine or HTTP client cannot be created
    pub fn new(config: Config) -> Result<Self> {
        let synthesizer = build_synthesizer(&config.tts)?;
        let transcriber = UtteranceTranscriber::new(build_transcriber(&config.stt)?);
        let orchestrator = Arc::new(OrchestratorClient::new(&config.orchestrator)?);
        let media = Arc::new(MediaStore::new(config.api.public_base_url()));

        Ok(Self {
            config,
            synthesizer,
            transcriber,
            orchestrator,
            media,
        })
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP or ingest socket cannot be bound or the VAD
    /// configuration is invalid
    pub async fn run(self) -> Result<()> {
        let (speak_tx, speak_rx) = mpsc::channel::<SpeakRequest>(SPEAK_QUEUE_CAPACITY);
        let api = self.spawn_api(speak_tx).await?;

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.ingest.udp_port));
        let ingest = UdpIngest::bind(addr, self.config.ingest.recv_timeout).await?;

        let device = self.open_device().await;
        let responder = Responder::new(
            Arc::clone(&self.synthesizer),
            Arc::clone(&self.orchestrator),
            PlaybackConsumer::new(device, Arc::clone(&self.media)),
        );

        tracing::info!(
            udp_port = self.config.ingest.udp_port,
            http_port = self.config.api.http_port,
            tts = self.synthesizer.engine(),
            speech_threshold = self.config.vad.speech_threshold,
            silence_end_ms = self.config.vad.silence_end_ms(),
            "voice front-end listening"
        );

        let voice = VoiceLoop::new(ingest, self.config.vad, self.transcriber, responder)?;

        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        voice.run(speak_rx, shutdown_rx).await;
        api.abort();

        Ok(())
    }

    /// Speak one text through the configured engine and device
    ///
    /// Serves the audio over HTTP for the duration so a remote renderer can
    /// fetch it.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP port cannot be bound or no playback device
    /// could be opened
    pub async fn say(self, text: &str) -> Result<PlaybackReport> {
        let (speak_tx, _speak_rx) = mpsc::channel::<SpeakRequest>(1);
        let api = self.spawn_api(speak_tx).await?;

        let Some(device) = self.open_device().await else {
            api.abort();
            return Err(Error::DeviceUnavailable(
                "no playback device to speak through".to_string(),
            ));
        };
        let consumer = PlaybackConsumer::new(Some(device), Arc::clone(&self.media));

        let report = announce(Arc::clone(&self.synthesizer), &consumer, text).await;
        api.abort();
        Ok(report)
    }

    async fn spawn_api(
        &self,
        speak_tx: mpsc::Sender<SpeakRequest>,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let handle =
            ApiServerBuilder::new(self.config.api.http_port, Arc::clone(&self.media), speak_tx)
                .build()
                .spawn()
                .await?;
        tracing::info!(base_url = self.media.base_url(), "serving published audio");
        Ok(handle)
    }

    async fn open_device(&self) -> Option<Arc<dyn PlaybackDevice>> {
        open_device(&self.config.playback, Arc::clone(&self.media)).await
    }
}

/// The listen, transcribe and reply loop
///
/// Owns the ingest socket so audio queued while a reply plays can be
/// drained before listening resumes.
pub struct VoiceLoop {
    ingest: UdpIngest,
    segmenter: UtteranceSegmenter,
    assembler: FrameAssembler,
    transcriber: UtteranceTranscriber,
    responder: Responder,
}

impl VoiceLoop {
    /// Assemble the loop
    ///
    /// # Errors
    ///
    /// Returns error if the VAD configuration is invalid
    pub fn new(
        ingest: UdpIngest,
        vad: VadConfig,
        transcriber: UtteranceTranscriber,
        responder: Responder,
    ) -> Result<Self> {
        Ok(Self {
            ingest,
            segmenter: UtteranceSegmenter::new(vad)?,
            assembler: FrameAssembler::new(),
            transcriber,
            responder,
        })
    }

    /// Process audio and announcements until `shutdown` fires or closes
    pub async fn run(
        mut self,
        mut speak_rx: mpsc::Receiver<SpeakRequest>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        loop {
            let step = tokio::select! {
                _ = shutdown.recv() => Step::Shutdown,
                Some(request) = speak_rx.recv() => Step::Announce(request.text),
                received = self.ingest.recv() => match received {
                    Ok(Received::Data(bytes)) => Step::Frames(self.assembler.push(bytes)),
                    Ok(Received::Timeout) => Step::Timeout,
                    Err(e) => Step::RecvError(e),
                },
            };

            match step {
                Step::Shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Step::Announce(text) => self.announce(&text).await,
                Step::Frames(frames) => self.on_frames(&frames).await,
                Step::Timeout => {
                    if let Some(event) = self.segmenter.on_timeout()
                        && self.handle_event(event).await
                    {
                        self.suppress_feedback();
                    }
                }
                Step::RecvError(e) => {
                    tracing::warn!(error = %e, "ingest receive failed");
                }
            }
        }
    }

    async fn announce(&mut self, text: &str) {
        // A partial recording would hear the announcement itself
        self.segmenter.reset();
        self.assembler.clear();
        let report = self.responder.announce(text).await;
        tracing::info!(played = report.played, "announcement done");
        self.suppress_feedback();
    }

    async fn on_frames(&mut self, frames: &[Frame]) {
        for frame in frames {
            let Some(event) = self.segmenter.push_frame(frame) else {
                continue;
            };
            if self.handle_event(event).await {
                // The rest of this datagram was captured before the reply
                // started and may hold its opening words
                self.suppress_feedback();
                break;
            }
        }
    }

    /// Forget audio the microphone picked up while the device was speaking
    fn suppress_feedback(&mut self) {
        self.ingest.drain();
        self.assembler.clear();
    }

    /// Handle a segmenter event; true if a reply was played
    async fn handle_event(&self, event: SegmentEvent) -> bool {
        match event {
            SegmentEvent::SpeechStarted { energy } => {
                tracing::info!(energy, "speech detected");
                false
            }
            SegmentEvent::Discarded {
                reason,
                duration_secs,
            } => {
                tracing::debug!(%reason, duration_secs, "utterance too short, discarded");
                false
            }
            SegmentEvent::Utterance(utterance) => {
                let span = tracing::info_span!("utterance", id = %Uuid::new_v4());
                self.handle_utterance(utterance).instrument(span).await
            }
        }
    }

    async fn handle_utterance(&self, utterance: Utterance) -> bool {
        tracing::info!(
            duration_secs = utterance.duration_secs(),
            reason = %utterance.reason,
            "utterance captured"
        );

        let Some(text) = self.transcriber.transcribe(&utterance.pcm).await else {
            return false;
        };

        self.responder.reply(&text).await;
        true
    }
}
