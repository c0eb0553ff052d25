//! Utterance segmentation
//!
//! Energy-based voice activity detection over fixed 20 ms frames. Two
//! thresholds give hysteresis: speech must exceed `speech_threshold` to arm
//! and start a recording, while only energy below the lower
//! `silence_threshold` counts toward ending it.

use serde::Deserialize;

use super::frame::{FRAME_MS, Frame, SAMPLE_RATE, SAMPLE_WIDTH, pcm_duration_secs};
use crate::{Error, Result};

/// Tuning parameters for the segmenter
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// RMS energy at or above which a frame counts as speech while idle
    pub speech_threshold: f32,
    /// RMS energy below which a frame counts as silence while recording
    pub silence_threshold: f32,
    /// Speech frames needed to start recording (8 frames = 160 ms)
    pub speech_hold_frames: u32,
    /// Trailing silent frames that end a recording (40 frames = 800 ms)
    pub silence_end_frames: u32,
    /// Shorter recordings are discarded
    pub min_utterance_secs: f32,
    /// Recordings are cut at this length
    pub max_utterance_secs: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 300.0,
            silence_threshold: 200.0,
            speech_hold_frames: 8,
            silence_end_frames: 40,
            min_utterance_secs: 0.5,
            max_utterance_secs: 12.0,
        }
    }
}

impl VadConfig {
    /// Check that the parameters describe a usable state machine
    ///
    /// # Errors
    ///
    /// Returns a configuration error when thresholds are inverted or a
    /// counter limit is zero
    pub fn validate(&self) -> Result<()> {
        if self.speech_threshold <= self.silence_threshold {
            return Err(Error::Config(format!(
                "speech_threshold ({}) must be greater than silence_threshold ({})",
                self.speech_threshold, self.silence_threshold
            )));
        }
        if self.speech_hold_frames == 0 || self.silence_end_frames == 0 {
            return Err(Error::Config(
                "speech_hold_frames and silence_end_frames must be at least 1".to_string(),
            ));
        }
        if self.min_utterance_secs < 0.0 || self.max_utterance_secs <= self.min_utterance_secs {
            return Err(Error::Config(format!(
                "max_utterance_secs ({}) must exceed min_utterance_secs ({})",
                self.max_utterance_secs, self.min_utterance_secs
            )));
        }
        Ok(())
    }

    /// Trailing silence needed to end an utterance, in milliseconds
    #[must_use]
    pub const fn silence_end_ms(&self) -> u32 {
        self.silence_end_frames * FRAME_MS
    }
}

/// Observable state of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Not recording, no speech seen
    Idle,
    /// Not recording yet, speculatively buffering loud frames
    Armed,
    /// Capturing an utterance
    Recording,
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Enough trailing silence ("natural end")
    Silence,
    /// Maximum utterance length reached ("forced end")
    MaxDuration,
    /// No data arrived within the receive timeout
    Timeout,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Silence => "silence",
            Self::MaxDuration => "max",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// A completed utterance ready for transcription
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Raw s16le PCM at the ingest rate
    pub pcm: Vec<u8>,
    /// What ended the recording
    pub reason: EndReason,
}

impl Utterance {
    /// Utterance length in seconds
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        pcm_duration_secs(&self.pcm)
    }
}

/// Outcome of feeding a frame (or a timeout) to the segmenter
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    /// Hold frames reached, recording started
    SpeechStarted {
        /// Energy of the frame that completed the hold
        energy: f32,
    },
    /// Recording ended and is long enough to transcribe
    Utterance(Utterance),
    /// Recording ended but was shorter than the minimum
    Discarded {
        /// What ended the recording
        reason: EndReason,
        /// Length of the dropped audio
        duration_secs: f32,
    },
}

/// Frame-driven voice activity state machine
///
/// Owns the utterance buffer for its whole lifetime.
#[derive(Debug)]
pub struct UtteranceSegmenter {
    config: VadConfig,
    min_bytes: usize,
    max_bytes: usize,
    recording: bool,
    speech_frames: u32,
    silence_frames: u32,
    buffer: Vec<u8>,
}

impl UtteranceSegmenter {
    /// Create a segmenter in the idle state
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails validation
    pub fn new(config: VadConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            min_bytes: secs_to_bytes(config.min_utterance_secs),
            max_bytes: secs_to_bytes(config.max_utterance_secs),
            config,
            recording: false,
            speech_frames: 0,
            silence_frames: 0,
            buffer: Vec::new(),
        })
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> VadState {
        if self.recording {
            VadState::Recording
        } else if self.speech_frames > 0 {
            VadState::Armed
        } else {
            VadState::Idle
        }
    }

    /// Consecutive speech counter (idle side)
    #[must_use]
    pub const fn speech_frames(&self) -> u32 {
        self.speech_frames
    }

    /// Consecutive silence counter (recording side)
    #[must_use]
    pub const fn silence_frames(&self) -> u32 {
        self.silence_frames
    }

    /// Bytes currently buffered (speculative or recorded)
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Feed one frame
    pub fn push_frame(&mut self, frame: &Frame) -> Option<SegmentEvent> {
        let energy = frame.energy();

        if !self.recording {
            if energy >= self.config.speech_threshold {
                self.speech_frames += 1;
                self.buffer.extend_from_slice(frame.as_bytes());

                if self.speech_frames >= self.config.speech_hold_frames {
                    self.recording = true;
                    self.silence_frames = 0;
                    tracing::debug!(energy, "speech started");
                    return Some(SegmentEvent::SpeechStarted { energy });
                }
            } else {
                self.speech_frames = self.speech_frames.saturating_sub(1);
                if self.speech_frames == 0 {
                    self.buffer.clear();
                }
            }
            return None;
        }

        self.buffer.extend_from_slice(frame.as_bytes());

        if energy < self.config.silence_threshold {
            self.silence_frames += 1;
        } else {
            self.silence_frames = 0;
        }

        // Silence takes precedence when both limits trip on the same frame
        if self.silence_frames >= self.config.silence_end_frames {
            Some(self.finish(EndReason::Silence))
        } else if self.buffer.len() >= self.max_bytes {
            Some(self.finish(EndReason::MaxDuration))
        } else {
            None
        }
    }

    /// Handle a receive timeout
    ///
    /// Flushes a recording in progress under the usual minimum-length rule.
    /// An idle or armed segmenter is left untouched.
    pub fn on_timeout(&mut self) -> Option<SegmentEvent> {
        if self.recording && !self.buffer.is_empty() {
            Some(self.finish(EndReason::Timeout))
        } else {
            None
        }
    }

    /// Drop any buffered audio and return to idle
    pub fn reset(&mut self) {
        self.recording = false;
        self.speech_frames = 0;
        self.silence_frames = 0;
        self.buffer.clear();
    }

    fn finish(&mut self, reason: EndReason) -> SegmentEvent {
        let pcm = std::mem::take(&mut self.buffer);
        self.reset();

        let duration_secs = pcm_duration_secs(&pcm);
        tracing::debug!(%reason, duration_secs, "utterance end");

        if pcm.len() >= self.min_bytes {
            SegmentEvent::Utterance(Utterance { pcm, reason })
        } else {
            SegmentEvent::Discarded {
                reason,
                duration_secs,
            }
        }
    }
}

/// Convert seconds of ingest audio to a byte count
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn secs_to_bytes(secs: f32) -> usize {
    let samples = (f64::from(secs) * f64::from(SAMPLE_RATE)).round() as usize;
    samples * SAMPLE_WIDTH
}
