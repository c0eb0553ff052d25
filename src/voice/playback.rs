//! Audio playback to local speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use super::device::PlaybackDevice;
use super::media::MediaStore;
use super::pcm::resample;
use super::tts::{MediaType, SynthesizedAudio};
use crate::{Error, Result};

/// Plays published audio on the default output device
///
/// Audio is taken straight from the [`MediaStore`] rather than fetched over
/// HTTP. Each clip plays on a blocking thread because `cpal` streams are not
/// `Send`.
pub struct LocalSpeaker {
    name: String,
    media: Arc<MediaStore>,
    /// Signals that the current clip has started
    started: Mutex<Option<oneshot::Receiver<()>>>,
    /// Previous clip, awaited before the next one starts
    current: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl LocalSpeaker {
    /// Check that an output device exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if there is no output device
    pub fn new(media: Arc<MediaStore>) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let name = device.name().unwrap_or_else(|_| "speaker".to_string());
        tracing::debug!(device = %name, "audio playback initialized");

        Ok(Self {
            name,
            media,
            started: Mutex::new(None),
            current: Mutex::new(None),
        })
    }
}

#[async_trait]
impl PlaybackDevice for LocalSpeaker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn play(&self, url: &str, _media_type: MediaType) -> Result<()> {
        let audio = self
            .media
            .resolve(url)
            .ok_or_else(|| Error::Device(format!("{url} is not published")))?;

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            // Earlier clip is either finished or failed; either way it is done
            let _ = previous.await;
        }

        let (tx, rx) = oneshot::channel();
        *self.started.lock().await = Some(rx);
        *current = Some(tokio::task::spawn_blocking(move || {
            play_blocking(&audio, tx)
        }));
        Ok(())
    }

    async fn wait_active(&self, timeout: Duration) -> Result<()> {
        let Some(started) = self.started.lock().await.take() else {
            return Err(Error::Device("nothing is playing".to_string()));
        };

        match tokio::time::timeout(timeout, started).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Device("playback failed to start".to_string())),
            Err(_) => Err(Error::Device(format!(
                "playback not started after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

/// Decode and play one clip, blocking until it ends
fn play_blocking(audio: &SynthesizedAudio, started: oneshot::Sender<()>) -> Result<()> {
    let (samples, source_rate) = match audio.media_type {
        MediaType::Mpeg => decode_mp3(&audio.bytes)?,
        MediaType::Wav => decode_wav(&audio.bytes)?,
    };
    if samples.is_empty() {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|e| Error::Audio(e.to_string()))?
        .config();
    let channels = usize::from(config.channels);

    let samples = resample(&samples, source_rate, config.sample_rate.0)?;
    let sample_count = samples.len();

    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let position_cb = Arc::clone(&position);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position_cb.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(pos).copied().unwrap_or_else(|| {
                        finished_cb.store(true, Ordering::Relaxed);
                        0.0
                    });
                    frame.fill(sample);
                    pos = (pos + 1).min(samples.len());
                }
                position_cb.store(pos, Ordering::Relaxed);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    let _ = started.send(());

    let duration_ms = (sample_count as u64 * 1000) / u64::from(config.sample_rate.0);
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = Instant::now();

    while !finished.load(Ordering::Relaxed) && start.elapsed() < timeout {
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    tracing::debug!(
        samples = sample_count,
        played = position.load(Ordering::Relaxed),
        "playback complete"
    );
    Ok(())
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }
                let channels = frame.channels.max(1);
                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    let sum: f32 = chunk.iter().map(|&s| f32::from(s) / 32768.0).sum();
                    #[allow(clippy::cast_precision_loss)]
                    let mono = sum / chunk.len() as f32;
                    mono
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 contained no frames".to_string()));
    }
    Ok((samples, sample_rate))
}

/// Decode WAV bytes to mono f32 samples and their sample rate
fn decode_wav(wav_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(wav_data))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| {
                    #[allow(clippy::cast_precision_loss)]
                    let v = v as f32;
                    v / scale
                }))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|chunk| {
            #[allow(clippy::cast_precision_loss)]
            let len = chunk.len() as f32;
            chunk.iter().sum::<f32>() / len
        })
        .collect();

    Ok((mono, spec.sample_rate))
}
