//! Ordered synthesis and playback
//!
//! Sentences are synthesized concurrently but played strictly in the order
//! they were dispatched:
//!
//! ```text
//! reader ──dispatch──► [slot A][slot B][slot C][End]  (ordered queue)
//!              │          ▲       ▲       ▲
//!              └─spawn──► worker  worker  worker     (one per sentence)
//!
//! consumer: pop slot A, await it, play; pop slot B, await it, play; ...
//! ```
//!
//! Each slot is a oneshot channel written once by its worker. The consumer
//! awaits slots in queue order, so a later sentence that finishes first
//! simply waits its turn.

pub mod reader;
pub mod segmenter;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::voice::{MediaStore, PlaybackDevice, SynthesizedAudio, Synthesizer, playback_wait};

pub use reader::{OrchestratorClient, ReplyOutcome};
pub use segmenter::{SentenceBuffer, find_sentence_end};

/// How long the consumer waits for the device to report playback
pub const ACTIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome written into a synthesis slot
#[derive(Debug)]
pub enum SlotResult {
    /// Audio ready to play
    Ready(SynthesizedAudio),
    /// Synthesis failed; the sentence is skipped
    Failed,
}

/// Entry of the ordered queue
#[derive(Debug)]
pub enum QueueItem {
    /// A dispatched sentence and the slot its audio will arrive in
    Slot {
        /// Sentence text, for logs
        sentence: String,
        /// Written once by the synthesis worker
        slot: oneshot::Receiver<SlotResult>,
    },
    /// No more sentences will be dispatched
    End,
}

/// Create an ordered queue fed by `synthesizer`
#[must_use]
pub fn ordered_queue(
    synthesizer: Arc<dyn Synthesizer>,
) -> (Dispatcher, mpsc::UnboundedReceiver<QueueItem>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher {
        tx,
        synthesizer,
        dispatched: 0,
        ended: false,
    };
    (dispatcher, rx)
}

/// Producer side of the ordered queue
///
/// Pushes [`QueueItem::End`] exactly once: on [`Dispatcher::finish`], or on
/// drop if `finish` was never reached.
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<QueueItem>,
    synthesizer: Arc<dyn Synthesizer>,
    dispatched: usize,
    ended: bool,
}

impl Dispatcher {
    /// Queue a sentence and start synthesizing it
    ///
    /// Never blocks. Blank text is ignored.
    pub fn dispatch(&mut self, sentence: &str) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            return;
        }

        let (slot_tx, slot_rx) = oneshot::channel();
        let item = QueueItem::Slot {
            sentence: sentence.to_string(),
            slot: slot_rx,
        };
        if self.tx.send(item).is_err() {
            tracing::debug!("playback consumer gone, sentence dropped");
            return;
        }

        self.dispatched += 1;
        tracing::debug!(index = self.dispatched, sentence = %preview(sentence), "TTS dispatch");

        let synthesizer = Arc::clone(&self.synthesizer);
        let sentence = sentence.to_string();
        tokio::spawn(async move {
            let result = match synthesizer.synthesize(&sentence).await {
                Ok(audio) => SlotResult::Ready(audio),
                Err(e) => {
                    tracing::error!(
                        engine = synthesizer.engine(),
                        sentence = %preview(&sentence),
                        error = %e,
                        "TTS error"
                    );
                    SlotResult::Failed
                }
            };
            // Receiver is gone only if the consumer stopped early
            let _ = slot_tx.send(result);
        });
    }

    /// Sentences dispatched so far
    #[must_use]
    pub const fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Signal that no more sentences will follow
    pub fn finish(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            let _ = self.tx.send(QueueItem::End);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.end();
    }
}

/// What the consumer did with one queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Sentences handed to the device
    pub played: usize,
    /// Sentences skipped (failed synthesis, no device, rejected command)
    pub skipped: usize,
}

/// Sequential consumer of the ordered queue
///
/// The only component that commands the playback device.
pub struct PlaybackConsumer {
    device: Option<Arc<dyn PlaybackDevice>>,
    media: Arc<MediaStore>,
    active_timeout: Duration,
}

impl PlaybackConsumer {
    /// Create a consumer; `device` is `None` when nothing can play audio
    #[must_use]
    pub fn new(device: Option<Arc<dyn PlaybackDevice>>, media: Arc<MediaStore>) -> Self {
        Self {
            device,
            media,
            active_timeout: ACTIVE_TIMEOUT,
        }
    }

    /// Override the wait for the device to go active
    #[must_use]
    pub const fn with_active_timeout(mut self, timeout: Duration) -> Self {
        self.active_timeout = timeout;
        self
    }

    /// Play every queued sentence in order until [`QueueItem::End`]
    pub async fn run(&self, mut queue: mpsc::UnboundedReceiver<QueueItem>) -> PlaybackReport {
        let mut report = PlaybackReport::default();

        while let Some(item) = queue.recv().await {
            let (sentence, slot) = match item {
                QueueItem::End => break,
                QueueItem::Slot { sentence, slot } => (sentence, slot),
            };

            // Ordering point: wait for this sentence even if later ones are ready
            let result = slot.await.unwrap_or(SlotResult::Failed);

            let audio = match result {
                SlotResult::Ready(audio) => audio,
                SlotResult::Failed => {
                    tracing::debug!(sentence = %preview(&sentence), "skipping failed sentence");
                    report.skipped += 1;
                    continue;
                }
            };

            if self.play(&sentence, audio).await {
                report.played += 1;
            } else {
                report.skipped += 1;
            }
        }

        report
    }

    /// Publish, play and wait out one clip; false if nothing was played
    async fn play(&self, sentence: &str, audio: SynthesizedAudio) -> bool {
        let Some(device) = &self.device else {
            tracing::debug!(sentence = %preview(sentence), "no playback device, skipping");
            return false;
        };

        let wait = playback_wait(&audio.bytes, audio.media_type);
        let media_type = audio.media_type;
        let url = self.media.publish(audio);

        if let Err(e) = device.play(&url, media_type).await {
            tracing::error!(device = device.name(), error = %e, "playback error");
            return false;
        }

        if let Err(e) = device.wait_active(self.active_timeout).await {
            tracing::warn!(device = device.name(), error = %e, "device did not report playing");
        }

        tracing::info!(
            sentence = %preview(sentence),
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "playing"
        );
        tokio::time::sleep(wait).await;
        true
    }
}

/// Speaks replies and announcements through the ordered pipeline
pub struct Responder {
    synthesizer: Arc<dyn Synthesizer>,
    orchestrator: Arc<OrchestratorClient>,
    consumer: PlaybackConsumer,
}

impl Responder {
    /// Wire the pipeline together
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        orchestrator: Arc<OrchestratorClient>,
        consumer: PlaybackConsumer,
    ) -> Self {
        Self {
            synthesizer,
            orchestrator,
            consumer,
        }
    }

    /// Ask the orchestrator about `order` and play the reply
    ///
    /// The reader runs on its own task while playback runs here; returns
    /// once the last sentence has played.
    pub async fn reply(&self, order: &str) -> (ReplyOutcome, PlaybackReport) {
        let (dispatcher, queue) = ordered_queue(Arc::clone(&self.synthesizer));

        let orchestrator = Arc::clone(&self.orchestrator);
        let order = order.to_string();
        let reader = tokio::spawn(async move { orchestrator.respond(&order, dispatcher).await });

        let report = self.consumer.run(queue).await;
        let outcome = reader.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "reply reader task failed");
            ReplyOutcome::Failed
        });

        tracing::info!(?outcome, played = report.played, skipped = report.skipped, "reply done");
        (outcome, report)
    }

    /// Speak a fixed text, bypassing the orchestrator
    pub async fn announce(&self, text: &str) -> PlaybackReport {
        announce(Arc::clone(&self.synthesizer), &self.consumer, text).await
    }
}

/// Speak a fixed text with the given engine and consumer
pub async fn announce(
    synthesizer: Arc<dyn Synthesizer>,
    consumer: &PlaybackConsumer,
    text: &str,
) -> PlaybackReport {
    let (mut dispatcher, queue) = ordered_queue(synthesizer);
    dispatcher.dispatch(text);
    dispatcher.finish();
    consumer.run(queue).await
}

/// First 60 characters of a sentence for log lines
fn preview(sentence: &str) -> &str {
    sentence
        .char_indices()
        .nth(60)
        .map_or(sentence, |(i, _)| &sentence[..i])
}
