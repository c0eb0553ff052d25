//! Shared test utilities
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use yui_voice::voice::{
    FRAME_BYTES, FRAME_SAMPLES, Frame, MediaStore, MediaType, PlaybackDevice, SynthesizedAudio,
    Synthesizer, VadConfig,
};
use yui_voice::{Error, Result};

/// Raw bytes of one frame where every sample has the same amplitude
///
/// The RMS energy of such a frame is `amplitude`.
#[must_use]
pub fn frame_bytes(amplitude: i16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(FRAME_BYTES);
    for _ in 0..FRAME_SAMPLES {
        bytes.extend_from_slice(&amplitude.to_le_bytes());
    }
    bytes
}

/// One frame of constant energy
#[must_use]
pub fn tone_frame(amplitude: i16) -> Frame {
    Frame::from_bytes(&frame_bytes(amplitude)).expect("frame size")
}

/// One silent frame
#[must_use]
pub fn silence_frame() -> Frame {
    tone_frame(0)
}

/// VAD tuning used by the integration tests
///
/// Hold of 3 frames, 5 silent frames to end, 0.2 s minimum, 1 s maximum.
#[must_use]
pub fn test_vad_config() -> VadConfig {
    VadConfig {
        speech_threshold: 300.0,
        silence_threshold: 200.0,
        speech_hold_frames: 3,
        silence_end_frames: 5,
        min_utterance_secs: 0.2,
        max_utterance_secs: 1.0,
    }
}

/// Synthesizer with per-sentence delays and failures
///
/// Audio bytes are the sentence text itself, tagged as MPEG, so a
/// [`RecordingDevice`] can tell which sentence it was asked to play.
#[derive(Default)]
pub struct MockSynthesizer {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay synthesis of `sentence`
    #[must_use]
    pub fn with_delay(mut self, sentence: &str, delay: Duration) -> Self {
        self.delays.insert(sentence.to_string(), delay);
        self
    }

    /// Make synthesis of `sentence` fail
    #[must_use]
    pub fn failing(mut self, sentence: &str) -> Self {
        self.failures.insert(sentence.to_string());
        self
    }

    /// Sentences synthesized so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    fn engine(&self) -> &'static str {
        "mock"
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        self.calls.lock().unwrap().push(text.to_string());

        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.contains(text) {
            return Err(Error::Synthesis(format!("mock failure for '{text}'")));
        }

        Ok(SynthesizedAudio::new(
            text.as_bytes().to_vec(),
            MediaType::Mpeg,
        ))
    }
}

/// Playback device that records what it was asked to play
pub struct RecordingDevice {
    media: Arc<MediaStore>,
    played: Mutex<Vec<String>>,
    urls: Mutex<Vec<String>>,
}

impl RecordingDevice {
    #[must_use]
    pub fn new(media: Arc<MediaStore>) -> Self {
        Self {
            media,
            played: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Texts of the clips played, in order
    #[must_use]
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    /// URLs the device was given, in order
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackDevice for RecordingDevice {
    fn name(&self) -> &str {
        "recording"
    }

    async fn play(&self, url: &str, _media_type: MediaType) -> Result<()> {
        let audio = self
            .media
            .resolve(url)
            .ok_or_else(|| Error::Device(format!("{url} is not published")))?;

        self.urls.lock().unwrap().push(url.to_string());
        self.played
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&audio.bytes).into_owned());
        Ok(())
    }

    async fn wait_active(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
