//! Yui voice front-end - speech in, streamed speech out
//!
//! This library provides the voice layer in front of the Yui orchestrator:
//! - Utterance segmentation of a raw UDP PCM stream (energy VAD)
//! - Speech-to-text through a hosted or self-hosted backend
//! - Streaming replies split into sentences and synthesized concurrently
//! - Ordered playback on a Home Assistant media player or the local speaker
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Capture device (48 kHz s16le over UDP)      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  yui-voice                           │
//! │   VAD  │  STT  │  Sentence split  │  TTS  │  Play   │
//! └──────────┬──────────────────────────────┬───────────┘
//!            │ order / SSE tokens           │ /tts/<id>
//! ┌──────────▼───────────┐      ┌───────────▼───────────┐
//! │   Yui orchestrator   │      │  Media player / cpal  │
//! └──────────────────────┘      └───────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod pipeline;
pub mod voice;

pub use config::Config;
pub use daemon::{Daemon, VoiceLoop};
pub use error::{Error, Result};
