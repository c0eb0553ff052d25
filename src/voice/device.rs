//! Playback devices
//!
//! A device plays audio addressed by URL. Remote renderers report when they
//! start playing but never when they finish, so callers wait out an
//! estimated duration (see [`super::duration`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::MediaType;
use super::media::MediaStore;
use super::playback::LocalSpeaker;
use crate::config::{DeviceKind, HomeAssistantConfig, PlaybackConfig};
use crate::{Error, Result};

/// Interval between state polls while waiting for playback to start
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Timeout for a single device command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can play a published URL
#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Human-readable device name
    fn name(&self) -> &str;

    /// Start playing the audio at `url`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the command is rejected
    async fn play(&self, url: &str, media_type: MediaType) -> Result<()>;

    /// Wait until the device reports it is playing
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] on timeout or if the state cannot be read
    async fn wait_active(&self, timeout: Duration) -> Result<()>;
}

/// Open the configured device
///
/// Returns `None` when playback is disabled, the device is not fully
/// configured or cannot be reached; the daemon keeps running and speech
/// becomes a no-op.
pub async fn open_device(
    config: &PlaybackConfig,
    media: Arc<MediaStore>,
) -> Option<Arc<dyn PlaybackDevice>> {
    let opened: Result<Arc<dyn PlaybackDevice>> = match config.device {
        DeviceKind::None => {
            tracing::warn!("playback disabled, replies will not be spoken");
            return None;
        }
        DeviceKind::HomeAssistant => match HomeAssistantDevice::new(&config.home_assistant) {
            Ok(device) => match device.connect().await {
                Ok(()) => Ok(Arc::new(device)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        },
        DeviceKind::Speaker => match LocalSpeaker::new(media) {
            Ok(speaker) => Ok(Arc::new(speaker)),
            Err(e) => Err(e),
        },
    };

    match opened {
        Ok(device) => {
            tracing::info!(device = device.name(), "playback device ready");
            Some(device)
        }
        Err(e) => {
            tracing::warn!(error = %e, "no playback device, replies will not be spoken");
            None
        }
    }
}

/// Media player entity driven through the Home Assistant REST API
///
/// Home Assistant handles the cast session, so any `media_player` it knows
/// (Chromecast, Sonos, DLNA) can render the published URL.
pub struct HomeAssistantDevice {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
    entity_id: String,
}

#[derive(serde::Deserialize)]
struct EntityState {
    state: String,
    #[serde(default)]
    attributes: serde_json::Value,
}

impl HomeAssistantDevice {
    /// Create a client for one media player entity
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the access token or entity is
    /// missing
    pub fn new(config: &HomeAssistantConfig) -> Result<Self> {
        let token = config
            .token
            .as_ref()
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or_else(|| {
                Error::DeviceUnavailable("HA_TOKEN is not set".to_string())
            })?;

        if config.entity_id.is_empty() {
            return Err(Error::DeviceUnavailable(
                "HA_MEDIA_PLAYER is not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: SecretString::from(token.expose_secret().to_owned()),
            entity_id: config.entity_id.clone(),
        })
    }

    /// Check that the entity exists and is reachable
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the entity cannot be read
    pub async fn connect(&self) -> Result<()> {
        let state = self
            .state()
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("{}: {e}", self.entity_id)))?;

        let friendly = state
            .attributes
            .get("friendly_name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&self.entity_id);
        tracing::info!(entity = %self.entity_id, name = friendly, state = %state.state, "media player found");
        Ok(())
    }

    async fn state(&self) -> Result<EntityState> {
        let response = self
            .client
            .get(format!("{}/api/states/{}", self.base_url, self.entity_id))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Device(format!(
                "state query returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PlaybackDevice for HomeAssistantDevice {
    fn name(&self) -> &str {
        &self.entity_id
    }

    async fn play(&self, url: &str, media_type: MediaType) -> Result<()> {
        let body = serde_json::json!({
            "entity_id": self.entity_id,
            "media_content_id": url,
            "media_content_type": media_type.mime(),
        });

        let response = self
            .client
            .post(format!(
                "{}/api/services/media_player/play_media",
                self.base_url
            ))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Device(format!("play_media failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Device(format!("play_media returned {status}: {body}")));
        }

        tracing::debug!(%url, "play command sent");
        Ok(())
    }

    async fn wait_active(&self, timeout: Duration) -> Result<()> {
        let poll = async {
            loop {
                match self.state().await {
                    Ok(state) if state.state == "playing" => return,
                    Ok(_) => {}
                    Err(e) => tracing::debug!(error = %e, "state poll failed"),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            Error::Device(format!(
                "{} not playing after {}s",
                self.entity_id,
                timeout.as_secs()
            ))
        })
    }
}
