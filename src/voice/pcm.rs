//! Sample conversion, resampling and WAV encoding

use rubato::{FftFixedIn, Resampler};

use super::frame::SAMPLE_WIDTH;
use crate::{Error, Result};

/// Input chunk size for the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Convert s16le PCM bytes to f32 samples in [-1.0, 1.0)
#[must_use]
pub fn pcm_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(SAMPLE_WIDTH)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

/// Resample a complete mono buffer
///
/// The output length is `samples.len() * to / from`, with the resampler's
/// delay trimmed so the signal stays aligned.
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from as usize,
        to as usize,
        RESAMPLE_CHUNK,
        2,
        1,
    )
    .map_err(|e| Error::Audio(format!("failed to create resampler: {e}")))?;

    let expected = samples.len() * to as usize / from as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let next = resampler.input_frames_next();
        let input: &[&[f32]] = &[&samples[pos..pos + next]];
        let chunk = resampler
            .process(input, None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&chunk[0]);
        pos += next;
    }

    if pos < samples.len() {
        let tail: &[&[f32]] = &[&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(tail), None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&chunk[0]);
    }

    // Flush the filter tail until the delayed signal is fully out
    while output.len() < expected + delay {
        let chunk = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
