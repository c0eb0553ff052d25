//! Text-to-speech (TTS) engines
//!
//! One [`Synthesizer`] implementation per engine. The engine is chosen once
//! at startup by [`build_synthesizer`]; call sites only see the trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{ElevenLabsConfig, OpenAiTtsConfig, TtsConfig, TtsEngine, XttsConfig};
use crate::{Error, Result};

/// Longest text accepted for a single synthesis request
pub const MAX_TTS_INPUT_BYTES: usize = 4096;

/// Timeout for a single synthesis request
const TTS_TIMEOUT: Duration = Duration::from_secs(30);

/// Encoded audio container returned by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// RIFF/WAVE, carries its own duration
    Wav,
    /// MP3, duration must be estimated from size
    Mpeg,
}

impl MediaType {
    /// MIME type for HTTP and device commands
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mpeg => "audio/mpeg",
        }
    }

    /// File extension used in published URLs
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mpeg => "mp3",
        }
    }

    /// Parse a MIME type, ignoring parameters
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(Self::Wav),
            "audio/mpeg" | "audio/mp3" => Some(Self::Mpeg),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}

/// Synthesized speech for one sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// Encoded audio bytes
    pub bytes: Vec<u8>,
    /// Container of `bytes`
    pub media_type: MediaType,
}

impl SynthesizedAudio {
    /// Bundle bytes with their media type
    #[must_use]
    pub const fn new(bytes: Vec<u8>, media_type: MediaType) -> Self {
        Self { bytes, media_type }
    }
}

/// A text-to-speech engine
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Engine name for logs
    fn engine(&self) -> &'static str;

    /// Synthesize text to speech
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] on any engine or network problem
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;
}

/// Build the configured engine
///
/// # Errors
///
/// Returns a configuration error if the engine's credential is missing
pub fn build_synthesizer(config: &TtsConfig) -> Result<Arc<dyn Synthesizer>> {
    let synthesizer: Arc<dyn Synthesizer> = match config.engine {
        TtsEngine::Xtts => Arc::new(XttsSynthesizer::new(&config.xtts)?),
        TtsEngine::OpenAi => Arc::new(OpenAiSynthesizer::new(&config.openai)?),
        TtsEngine::ElevenLabs => Arc::new(ElevenLabsSynthesizer::new(&config.elevenlabs)?),
    };

    tracing::info!(engine = synthesizer.engine(), "TTS engine ready");
    Ok(synthesizer)
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(TTS_TIMEOUT)
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}

fn check_input(text: &str) -> Result<()> {
    if text.len() > MAX_TTS_INPUT_BYTES {
        return Err(Error::Synthesis(format!(
            "text exceeds maximum size: {} bytes (limit: {MAX_TTS_INPUT_BYTES} bytes)",
            text.len()
        )));
    }
    Ok(())
}

async fn read_audio(response: reqwest::Response, engine: &str) -> Result<Vec<u8>> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Synthesis(format!("{engine} error {status}: {body}")));
    }

    let audio = response
        .bytes()
        .await
        .map_err(|e| Error::Synthesis(format!("{engine} body read failed: {e}")))?;
    if audio.is_empty() {
        return Err(Error::Synthesis(format!("{engine} returned no audio")));
    }
    Ok(audio.to_vec())
}

/// Local XTTS v2 server (voice cloning, WAV output)
pub struct XttsSynthesizer {
    client: reqwest::Client,
    url: String,
    language: String,
    speed: f32,
    speaker: String,
    speaker_wav: Option<String>,
}

impl XttsSynthesizer {
    /// Create a client for the XTTS server
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &XttsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: config.url.clone(),
            language: config.language.clone(),
            speed: config.speed,
            speaker: config.speaker.clone(),
            speaker_wav: config.speaker_wav.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for XttsSynthesizer {
    fn engine(&self) -> &'static str {
        "xtts"
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        #[derive(serde::Serialize)]
        struct XttsRequest<'a> {
            text: &'a str,
            language: &'a str,
            speed: f32,
            #[serde(skip_serializing_if = "Option::is_none")]
            speaker: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            speaker_wav: Option<&'a str>,
        }

        check_input(text)?;

        // A cloned reference voice wins over the named speaker
        let request = XttsRequest {
            text,
            language: &self.language,
            speed: self.speed,
            speaker: self
                .speaker_wav
                .is_none()
                .then_some(self.speaker.as_str()),
            speaker_wav: self.speaker_wav.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("XTTS request failed: {e}")))?;

        let audio = read_audio(response, "XTTS").await?;
        Ok(SynthesizedAudio::new(audio, MediaType::Wav))
    }
}

/// `OpenAI` speech API
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
}

impl OpenAiSynthesizer {
    /// Create a new `OpenAI` TTS client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &OpenAiTtsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| {
                Error::Config("TTS_ENGINE=openai requires OPENAI_TTS_KEY to be set".to_string())
            })?;

        Ok(Self {
            client: http_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.expose_secret().to_owned()),
            voice: config.voice.clone(),
            speed: config.speed,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    fn engine(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        check_input(text)?;

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("OpenAI TTS request failed: {e}")))?;

        let audio = read_audio(response, "OpenAI TTS").await?;
        Ok(SynthesizedAudio::new(audio, MediaType::Mpeg))
    }
}

/// `ElevenLabs` speech API
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: SecretString,
    voice_id: String,
    model: String,
}

impl ElevenLabsSynthesizer {
    /// Create a new `ElevenLabs` TTS client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &ElevenLabsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "TTS_ENGINE=elevenlabs requires ELEVENLABS_API_KEY to be set".to_string(),
                )
            })?;

        Ok(Self {
            client: http_client()?,
            api_key: SecretString::from(api_key.expose_secret().to_owned()),
            voice_id: config.voice_id.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    fn engine(&self) -> &'static str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        check_input(text)?;

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("ElevenLabs request failed: {e}")))?;

        let audio = read_audio(response, "ElevenLabs").await?;
        Ok(SynthesizedAudio::new(audio, MediaType::Mpeg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_from_mime() {
        assert_eq!(MediaType::from_mime("audio/wav"), Some(MediaType::Wav));
        assert_eq!(
            MediaType::from_mime("audio/mpeg; charset=binary"),
            Some(MediaType::Mpeg)
        );
        assert_eq!(MediaType::from_mime("text/plain"), None);
        assert_eq!(MediaType::Mpeg.extension(), "mp3");
    }

    #[test]
    fn openai_requires_key() {
        let config = OpenAiTtsConfig {
            api_key: None,
            ..OpenAiTtsConfig::default()
        };
        assert!(matches!(
            OpenAiSynthesizer::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn elevenlabs_rejects_empty_key() {
        let config = ElevenLabsConfig {
            api_key: Some(SecretString::from(String::new())),
            ..ElevenLabsConfig::default()
        };
        assert!(matches!(
            ElevenLabsSynthesizer::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn oversized_text_is_a_synthesis_error() {
        let text = "a".repeat(MAX_TTS_INPUT_BYTES + 1);
        assert!(matches!(check_input(&text), Err(Error::Synthesis(_))));
    }
}
