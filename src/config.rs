//! Configuration management for the voice front-end
//!
//! Everything comes from environment variables except VAD tuning, which
//! lives in an optional `vad.toml`. Loading goes through a lookup function
//! so tests never touch the process environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::voice::VadConfig;
use crate::{Error, Result};

/// Voice front-end configuration
#[derive(Debug)]
pub struct Config {
    /// UDP audio ingest
    pub ingest: IngestConfig,

    /// Utterance segmentation tuning
    pub vad: VadConfig,

    /// Reasoning service endpoints
    pub orchestrator: OrchestratorConfig,

    /// Speech-to-text backend
    pub stt: SttConfig,

    /// Text-to-speech engine
    pub tts: TtsConfig,

    /// Where replies are played
    pub playback: PlaybackConfig,

    /// Local HTTP server
    pub api: ApiConfig,
}

/// UDP ingest configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Port bound on all interfaces
    pub udp_port: u16,

    /// Receive timeout; a recording in progress is flushed when it expires
    pub recv_timeout: Duration,
}

/// Orchestrator (reasoning service) configuration
#[derive(Debug)]
pub struct OrchestratorConfig {
    /// Blocking endpoint, `{order}` → `{response}`
    pub order_url: String,

    /// Streaming endpoint, `{order}` → SSE tokens
    pub stream_url: String,

    /// Sent as `Authorization: Bearer <token>`
    pub bearer_token: SecretString,

    /// Overall limit for one streamed reply
    pub stream_timeout: Duration,

    /// Limit for the blocking fallback request
    pub fallback_timeout: Duration,
}

/// STT backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttEngine {
    /// OpenAI-compatible transcription endpoint
    OpenAi,
    /// Deepgram hosted API
    Deepgram,
}

impl FromStr for SttEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "whisper" => Ok(Self::OpenAi),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!(
                "unknown STT_ENGINE '{other}' (expected openai or deepgram)"
            ))),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug)]
pub struct SttConfig {
    /// Selected backend
    pub engine: SttEngine,

    /// Whisper-compatible backend settings
    pub whisper: WhisperConfig,

    /// Deepgram settings
    pub deepgram: DeepgramConfig,
}

/// OpenAI-compatible transcription settings
#[derive(Debug)]
pub struct WhisperConfig {
    /// Base URL without the `/v1/...` path
    pub base_url: String,

    /// Required for the hosted API only
    pub api_key: Option<SecretString>,

    /// Model name
    pub model: String,

    /// ISO 639-1 language hint
    pub language: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            language: "fr".to_string(),
        }
    }
}

/// Deepgram settings
#[derive(Debug)]
pub struct DeepgramConfig {
    /// API key
    pub api_key: Option<SecretString>,

    /// Model name
    pub model: String,

    /// Language code
    pub language: String,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "nova-2".to_string(),
            language: "fr".to_string(),
        }
    }
}

/// TTS engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEngine {
    /// Local XTTS v2 server
    Xtts,
    /// `OpenAI` speech API
    OpenAi,
    /// `ElevenLabs` API
    ElevenLabs,
}

impl FromStr for TtsEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xtts" => Ok(Self::Xtts),
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!(
                "unknown TTS_ENGINE '{other}' (expected xtts, openai or elevenlabs)"
            ))),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug)]
pub struct TtsConfig {
    /// Selected engine
    pub engine: TtsEngine,

    /// XTTS settings
    pub xtts: XttsConfig,

    /// `OpenAI` settings
    pub openai: OpenAiTtsConfig,

    /// `ElevenLabs` settings
    pub elevenlabs: ElevenLabsConfig,
}

/// Local XTTS server settings
#[derive(Debug, Clone)]
pub struct XttsConfig {
    /// Synthesis endpoint
    pub url: String,

    /// Built-in speaker name
    pub speaker: String,

    /// Reference WAV for voice cloning, path on the XTTS host
    pub speaker_wav: Option<String>,

    /// Speed multiplier
    pub speed: f32,

    /// Language code
    pub language: String,
}

impl Default for XttsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:18770/tts".to_string(),
            speaker: "Lilya Stainthorpe".to_string(),
            speaker_wav: None,
            speed: 1.15,
            language: "fr".to_string(),
        }
    }
}

/// `OpenAI` speech settings
#[derive(Debug)]
pub struct OpenAiTtsConfig {
    /// Base URL without the `/v1/...` path
    pub base_url: String,

    /// API key
    pub api_key: Option<SecretString>,

    /// Model name
    pub model: String,

    /// Voice name
    pub voice: String,

    /// Speed multiplier (0.25 to 4.0)
    pub speed: f32,
}

impl Default for OpenAiTtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "tts-1-hd".to_string(),
            voice: "nova".to_string(),
            speed: 1.0,
        }
    }
}

/// `ElevenLabs` settings
#[derive(Debug)]
pub struct ElevenLabsConfig {
    /// API key
    pub api_key: Option<SecretString>,

    /// Voice identifier
    pub voice_id: String,

    /// Model identifier
    pub model: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model: "eleven_multilingual_v2".to_string(),
        }
    }
}

/// Playback device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// A Home Assistant `media_player` entity
    HomeAssistant,
    /// The default local output device
    Speaker,
    /// Replies are not spoken
    None,
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home-assistant" | "homeassistant" | "ha" => Ok(Self::HomeAssistant),
            "speaker" | "local" => Ok(Self::Speaker),
            "none" | "off" => Ok(Self::None),
            other => Err(Error::Config(format!(
                "unknown PLAYBACK_DEVICE '{other}' (expected home-assistant, speaker or none)"
            ))),
        }
    }
}

/// Playback configuration
#[derive(Debug)]
pub struct PlaybackConfig {
    /// Selected device
    pub device: DeviceKind,

    /// Home Assistant settings
    pub home_assistant: HomeAssistantConfig,
}

/// Home Assistant connection
#[derive(Debug)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`
    pub url: String,

    /// Long-lived access token
    pub token: Option<SecretString>,

    /// `media_player.*` entity to cast to
    pub entity_id: String,
}

/// Local HTTP server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub http_port: u16,

    /// LAN address renderers use to reach this host
    pub local_ip: String,

    /// Full base URL override (reverse proxy, TLS)
    pub public_url: Option<String>,
}

impl ApiConfig {
    /// Base URL published audio is served under
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.public_url.clone().unwrap_or_else(|| {
            format!("http://{}:{}", self.local_ip, self.http_port)
        })
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns error on an unknown engine or device, a missing credential,
    /// or an invalid `vad.toml`
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secret = |key: &str| var(key).map(SecretString::from);

        let ingest = IngestConfig {
            udp_port: parse_or(&var, "VOICE_UDP_PORT", 5002),
            recv_timeout: Duration::from_millis(parse_or(&var, "VOICE_RECV_TIMEOUT_MS", 500)),
        };

        let vad_path = var("VAD_CONFIG").map(PathBuf::from).or_else(default_vad_path);
        let vad = match vad_path {
            Some(path) if path.exists() => load_vad_config(&path)?,
            _ => VadConfig::default(),
        };
        vad.validate()?;

        // Orchestrator ("Yui") endpoints
        let order_url = var("YUI_URL").unwrap_or_else(|| "http://localhost:3000/order".to_string());
        let stream_url = var("YUI_STREAM_URL").unwrap_or_else(|| format!("{order_url}/stream"));
        let orchestrator = OrchestratorConfig {
            order_url,
            stream_url,
            bearer_token: secret("BEARER_TOKEN").unwrap_or_else(|| SecretString::from("yui".to_string())),
            stream_timeout: Duration::from_secs(parse_or(&var, "YUI_STREAM_TIMEOUT_SECS", 90)),
            fallback_timeout: Duration::from_secs(parse_or(&var, "YUI_FALLBACK_TIMEOUT_SECS", 60)),
        };

        let language = var("WHISPER_LANGUAGE").unwrap_or_else(|| "fr".to_string());
        let stt = SttConfig {
            engine: var("STT_ENGINE").map_or(Ok(SttEngine::OpenAi), |s| s.parse())?,
            whisper: WhisperConfig {
                base_url: var("WHISPER_URL").unwrap_or_else(|| WhisperConfig::default().base_url),
                api_key: secret("WHISPER_API_KEY").or_else(|| secret("OPENAI_API_KEY")),
                model: var("WHISPER_MODEL").unwrap_or_else(|| WhisperConfig::default().model),
                language: language.clone(),
            },
            deepgram: DeepgramConfig {
                api_key: secret("DEEPGRAM_API_KEY"),
                model: var("DEEPGRAM_MODEL").unwrap_or_else(|| DeepgramConfig::default().model),
                language,
            },
        };

        let xtts_defaults = XttsConfig::default();
        let openai_defaults = OpenAiTtsConfig::default();
        let elevenlabs_defaults = ElevenLabsConfig::default();
        let tts = TtsConfig {
            engine: var("TTS_ENGINE").map_or(Ok(TtsEngine::Xtts), |s| s.parse())?,
            xtts: XttsConfig {
                url: var("XTTS_URL").unwrap_or(xtts_defaults.url),
                speaker: var("XTTS_SPEAKER").unwrap_or(xtts_defaults.speaker),
                speaker_wav: var("XTTS_SPEAKER_WAV"),
                speed: parse_or(&var, "XTTS_SPEED", xtts_defaults.speed),
                language: var("XTTS_LANGUAGE").unwrap_or(xtts_defaults.language),
            },
            openai: OpenAiTtsConfig {
                base_url: var("OPENAI_BASE_URL").unwrap_or(openai_defaults.base_url),
                api_key: secret("OPENAI_TTS_KEY").or_else(|| secret("OPENAI_API_KEY")),
                model: var("OPENAI_TTS_MODEL").unwrap_or(openai_defaults.model),
                voice: var("OPENAI_TTS_VOICE").unwrap_or(openai_defaults.voice),
                speed: parse_or(&var, "OPENAI_TTS_SPEED", openai_defaults.speed),
            },
            elevenlabs: ElevenLabsConfig {
                api_key: secret("ELEVENLABS_API_KEY"),
                voice_id: var("ELEVENLABS_VOICE_ID").unwrap_or(elevenlabs_defaults.voice_id),
                model: var("ELEVENLABS_MODEL").unwrap_or(elevenlabs_defaults.model),
            },
        };

        let playback = PlaybackConfig {
            device: var("PLAYBACK_DEVICE").map_or(Ok(DeviceKind::HomeAssistant), |s| s.parse())?,
            home_assistant: HomeAssistantConfig {
                url: var("HA_URL").unwrap_or_else(|| "http://homeassistant.local:8123".to_string()),
                token: secret("HA_TOKEN"),
                entity_id: var("HA_MEDIA_PLAYER").unwrap_or_default(),
            },
        };

        let api = ApiConfig {
            http_port: parse_or(&var, "HTTP_PORT", 18765),
            local_ip: var("LOCAL_IP").unwrap_or_else(|| "10.0.0.101".to_string()),
            public_url: var("PUBLIC_URL").map(|u| u.trim_end_matches('/').to_string()),
        };

        let config = Self {
            ingest,
            vad,
            orchestrator,
            stt,
            tts,
            playback,
            api,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check endpoints parse and the selected engines have their credentials
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending variable
    pub fn validate(&self) -> Result<()> {
        check_url("YUI_URL", &self.orchestrator.order_url)?;
        check_url("YUI_STREAM_URL", &self.orchestrator.stream_url)?;
        check_url("PUBLIC_URL", &self.api.public_base_url())?;
        match self.stt.engine {
            SttEngine::OpenAi => check_url("WHISPER_URL", &self.stt.whisper.base_url)?,
            SttEngine::Deepgram => {}
        }
        match self.tts.engine {
            TtsEngine::Xtts => check_url("XTTS_URL", &self.tts.xtts.url)?,
            TtsEngine::OpenAi => check_url("OPENAI_BASE_URL", &self.tts.openai.base_url)?,
            TtsEngine::ElevenLabs => {}
        }
        if self.playback.device == DeviceKind::HomeAssistant {
            check_url("HA_URL", &self.playback.home_assistant.url)?;
        }

        let has = |key: Option<&SecretString>| key.is_some_and(|k| !k.expose_secret().is_empty());

        match self.tts.engine {
            TtsEngine::OpenAi if !has(self.tts.openai.api_key.as_ref()) => {
                return Err(Error::Config(
                    "TTS_ENGINE=openai requires OPENAI_TTS_KEY or OPENAI_API_KEY".to_string(),
                ));
            }
            TtsEngine::ElevenLabs if !has(self.tts.elevenlabs.api_key.as_ref()) => {
                return Err(Error::Config(
                    "TTS_ENGINE=elevenlabs requires ELEVENLABS_API_KEY".to_string(),
                ));
            }
            _ => {}
        }

        if self.stt.engine == SttEngine::Deepgram && !has(self.stt.deepgram.api_key.as_ref()) {
            return Err(Error::Config(
                "STT_ENGINE=deepgram requires DEEPGRAM_API_KEY".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_url(key: &str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::Config(format!("{key} is not a valid URL ({value}): {e}")))
}

/// `vad.toml` in the user config directory (`~/.config/yui-voice` on Linux)
fn default_vad_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "yui", "yui-voice")
        .map(|d| d.config_dir().join("vad.toml"))
}

/// Read VAD tuning from a TOML file; absent keys keep their defaults
fn load_vad_config(path: &Path) -> Result<VadConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: VadConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded VAD config");
    Ok(config)
}

/// Parse a variable, keeping the default (with a warning) when invalid
fn parse_or<T, F>(var: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
    }
}
