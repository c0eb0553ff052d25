//! Speech-to-text (STT) processing

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::frame::SAMPLE_RATE;
use super::pcm::{pcm_to_f32, resample, samples_to_wav};
use crate::config::{DeepgramConfig, SttConfig, SttEngine, WhisperConfig};
use crate::{Error, Result};

/// Rate expected by the transcription engines
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Hosted `OpenAI` endpoint; a key is mandatory only here
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// A speech recognition backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Engine name for logs
    fn engine(&self) -> &'static str;

    /// Transcribe mono samples in [-1.0, 1.0)
    ///
    /// # Errors
    ///
    /// Returns error if the request or response parsing fails
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// Build the configured backend
///
/// # Errors
///
/// Returns a configuration error if the backend's credential is missing
pub fn build_transcriber(config: &SttConfig) -> Result<Arc<dyn Transcriber>> {
    let transcriber: Arc<dyn Transcriber> = match config.engine {
        SttEngine::OpenAi => Arc::new(WhisperApi::new(&config.whisper)?),
        SttEngine::Deepgram => Arc::new(Deepgram::new(&config.deepgram)?),
    };

    tracing::info!(engine = transcriber.engine(), "STT engine ready");
    Ok(transcriber)
}

/// OpenAI-compatible `/v1/audio/transcriptions` endpoint
///
/// Works against the hosted API as well as local servers exposing the same
/// route (faster-whisper, whisper.cpp).
pub struct WhisperApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    language: String,
}

impl WhisperApi {
    /// Create a new Whisper client
    ///
    /// # Errors
    ///
    /// Returns error if the hosted API is selected without a key
    pub fn new(config: &WhisperConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let api_key = config
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().is_empty())
            .map(|k| SecretString::from(k.expose_secret().to_owned()));

        if api_key.is_none() && base_url == OPENAI_BASE_URL {
            return Err(Error::Config(
                "OpenAI API key required for Whisper (set WHISPER_API_KEY)".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperApi {
    fn engine(&self) -> &'static str {
        "whisper"
    }

    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        let audio = samples_to_wav(samples, sample_rate)?;
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let mut request = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Whisper request failed");
            e
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        Ok(result.text)
    }
}

/// Deepgram pre-recorded transcription
pub struct Deepgram {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    language: String,
}

impl Deepgram {
    /// Create a new Deepgram client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &DeepgramConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| {
                Error::Config("Deepgram API key required (set DEEPGRAM_API_KEY)".to_string())
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(api_key.expose_secret().to_owned()),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for Deepgram {
    fn engine(&self) -> &'static str {
        "deepgram"
    }

    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        let audio = samples_to_wav(samples, sample_rate)?;
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true&language={}",
            self.model, self.language
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            e
        })?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

/// Turns a raw utterance into text
///
/// Converts the 48 kHz s16le buffer to floats, resamples to 16 kHz and
/// hands it to the backend. Failures are logged and reported as no text so
/// the caller simply skips the utterance.
pub struct UtteranceTranscriber {
    inner: Arc<dyn Transcriber>,
}

impl UtteranceTranscriber {
    /// Wrap a backend
    #[must_use]
    pub fn new(inner: Arc<dyn Transcriber>) -> Self {
        Self { inner }
    }

    /// Transcribe one utterance, `None` when nothing usable was heard
    pub async fn transcribe(&self, pcm: &[u8]) -> Option<String> {
        let samples = pcm_to_f32(pcm);
        let samples = match resample(&samples, SAMPLE_RATE, WHISPER_SAMPLE_RATE) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(error = %e, "failed to resample utterance");
                return None;
            }
        };

        match self.inner.transcribe(&samples, WHISPER_SAMPLE_RATE).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::debug!("empty transcription");
                    None
                } else {
                    tracing::info!(transcript = %text, "transcription complete");
                    Some(text.to_string())
                }
            }
            Err(e) => {
                tracing::error!(engine = self.inner.engine(), error = %e, "transcription failed");
                None
            }
        }
    }
}
