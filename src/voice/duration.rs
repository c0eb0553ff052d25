//! Playback duration estimation
//!
//! Remote renderers report when playback starts but not when it ends, so the
//! playback loop waits out an estimate instead.

use std::io::Cursor;
use std::time::Duration;

use super::tts::MediaType;

/// Added to every estimate to absorb network jitter
pub const TAIL_BUFFER: Duration = Duration::from_millis(350);

/// Used when a WAV header cannot be parsed
const WAV_FALLBACK_SECS: f64 = 3.0;

/// Assumed compressed bitrate in bytes per second (128 kbit/s)
const COMPRESSED_BYTES_PER_SEC: f64 = 16_000.0;

/// Shortest estimate for compressed audio
const COMPRESSED_MIN_SECS: f64 = 1.0;

/// Length of the encoded audio, without the tail buffer
#[must_use]
pub fn audio_duration(audio: &[u8], media_type: MediaType) -> Duration {
    let secs = match media_type {
        MediaType::Wav => wav_duration_secs(audio).unwrap_or(WAV_FALLBACK_SECS),
        MediaType::Mpeg => compressed_duration_secs(audio.len()),
    };
    Duration::from_secs_f64(secs)
}

/// How long the playback loop blocks after the device goes active
#[must_use]
pub fn playback_wait(audio: &[u8], media_type: MediaType) -> Duration {
    audio_duration(audio, media_type) + TAIL_BUFFER
}

/// Duration declared by the WAV header, if it can be read
fn wav_duration_secs(audio: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(audio)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return None;
    }
    Some(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

#[allow(clippy::cast_precision_loss)]
fn compressed_duration_secs(len: usize) -> f64 {
    (len as f64 / COMPRESSED_BYTES_PER_SEC).max(COMPRESSED_MIN_SECS)
}
