//! Published playable audio
//!
//! Remote renderers fetch audio by URL, so the sentence being played is
//! parked here and served by the `/tts/{file}` route. Only one item is
//! published at a time; each publish gets a fresh id so renderers never
//! replay a cached copy.

use std::sync::{Arc, Mutex, PoisonError};

use super::tts::SynthesizedAudio;

/// The currently published audio
#[derive(Debug, Clone)]
pub struct PublishedMedia {
    /// Millisecond timestamp, unique per publish
    pub id: String,
    /// Audio served under this id
    pub audio: Arc<SynthesizedAudio>,
}

impl PublishedMedia {
    /// File name used in the public URL
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.audio.media_type.extension())
    }
}

/// Shared slot for the audio currently being played
#[derive(Debug)]
pub struct MediaStore {
    base_url: String,
    current: Mutex<Option<PublishedMedia>>,
    last_id: Mutex<i64>,
}

impl MediaStore {
    /// Create an empty store
    ///
    /// `base_url` is how renderers reach this host, e.g. `http://10.0.0.101:18765`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            current: Mutex::new(None),
            last_id: Mutex::new(0),
        }
    }

    /// Public base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the published audio and return its URL
    pub fn publish(&self, audio: SynthesizedAudio) -> String {
        let id = self.next_id().to_string();
        let media = PublishedMedia {
            id,
            audio: Arc::new(audio),
        };
        let url = format!("{}/tts/{}", self.base_url, media.file_name());

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(media);
        tracing::debug!(%url, "audio published");
        url
    }

    /// Audio currently published, if any
    #[must_use]
    pub fn current(&self) -> Option<PublishedMedia> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up audio by the file name of its URL
    ///
    /// A bare name without an extension-qualified id (e.g. `latest`) matches
    /// whatever is currently published.
    #[must_use]
    pub fn get(&self, file: &str) -> Option<Arc<SynthesizedAudio>> {
        let current = self.current()?;
        let requested_id = file.split_once('.').map(|(id, _)| id);

        match requested_id {
            Some(id) if id != current.id => None,
            _ => Some(current.audio),
        }
    }

    /// Look up audio by its full published URL
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<Arc<SynthesizedAudio>> {
        let file = url.strip_prefix(&self.base_url)?.strip_prefix("/tts/")?;
        self.get(file)
    }

    /// Strictly increasing millisecond id
    fn next_id(&self) -> i64 {
        let mut last = self.last_id.lock().unwrap_or_else(PoisonError::into_inner);
        let now = chrono::Utc::now().timestamp_millis();
        *last = now.max(*last + 1);
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::MediaType;

    fn audio(byte: u8) -> SynthesizedAudio {
        SynthesizedAudio::new(vec![byte; 4], MediaType::Wav)
    }

    #[test]
    fn empty_store_serves_nothing() {
        let store = MediaStore::new("http://10.0.0.101:18765");
        assert!(store.current().is_none());
        assert!(store.get("latest.wav").is_none());
    }

    #[test]
    fn every_publish_gets_a_new_url() {
        let store = MediaStore::new("http://10.0.0.101:18765/");
        let first = store.publish(audio(1));
        let second = store.publish(audio(2));

        assert_ne!(first, second);
        assert!(second.starts_with("http://10.0.0.101:18765/tts/"));
        assert!(second.ends_with(".wav"));
    }

    #[test]
    fn stale_id_is_not_served() {
        let store = MediaStore::new("http://host");
        let first = store.publish(audio(1));
        let second = store.publish(audio(2));

        assert!(store.resolve(&first).is_none());
        assert_eq!(store.resolve(&second).unwrap().bytes, vec![2; 4]);
        assert_eq!(store.get("latest").unwrap().bytes, vec![2; 4]);
    }
}
