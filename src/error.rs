//! Error types for the Yui voice front-end

use thiserror::Error;

/// Result type alias for voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice front-end
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio decoding, resampling or device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error for a single sentence
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Orchestrator connection dropped or refused
    #[error("transport error: {0}")]
    Transport(String),

    /// No playback target discovered or connected
    #[error("playback device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A playback device command failed
    #[error("device error: {0}")]
    Device(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
