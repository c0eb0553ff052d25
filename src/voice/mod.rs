//! Voice processing module
//!
//! Handles audio ingest, utterance detection, STT/TTS engines and playback.

pub mod device;
pub mod duration;
pub mod frame;
pub mod ingest;
pub mod media;
pub mod pcm;
pub mod playback;
pub mod stt;
pub mod tts;
pub mod vad;

pub use device::{HomeAssistantDevice, PlaybackDevice, open_device};
pub use duration::{TAIL_BUFFER, audio_duration, playback_wait};
pub use frame::{FRAME_BYTES, FRAME_SAMPLES, Frame, FrameAssembler, SAMPLE_RATE, pcm_rms};
pub use ingest::{Received, UdpIngest};
pub use media::{MediaStore, PublishedMedia};
pub use pcm::{pcm_to_f32, resample, samples_to_wav};
pub use playback::LocalSpeaker;
pub use stt::{Transcriber, UtteranceTranscriber, WHISPER_SAMPLE_RATE, build_transcriber};
pub use tts::{MediaType, SynthesizedAudio, Synthesizer, build_synthesizer};
pub use vad::{EndReason, SegmentEvent, Utterance, UtteranceSegmenter, VadConfig, VadState};
