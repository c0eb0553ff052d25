//! Ordered synthesis-playback integration tests
//!
//! Run on paused time: synthesis delays and playback waits auto-advance.

use std::sync::Arc;
use std::time::Duration;

use yui_voice::pipeline::{PlaybackConsumer, PlaybackReport, announce, ordered_queue};
use yui_voice::voice::{MediaStore, PlaybackDevice, Synthesizer};

mod common;
use common::{MockSynthesizer, RecordingDevice};

const A: &str = "Il fait beau aujourd'hui.";
const B: &str = "La température est de 21,5 degrés.";
const C: &str = "Bonne journée !";

fn setup() -> (Arc<MediaStore>, Arc<RecordingDevice>, PlaybackConsumer) {
    let media = Arc::new(MediaStore::new("http://10.0.0.101:18765"));
    let device = Arc::new(RecordingDevice::new(Arc::clone(&media)));
    let consumer = PlaybackConsumer::new(
        Some(Arc::clone(&device) as Arc<dyn PlaybackDevice>),
        Arc::clone(&media),
    );
    (media, device, consumer)
}

#[tokio::test(start_paused = true)]
async fn test_playback_follows_dispatch_order_not_completion_order() {
    let (_media, device, consumer) = setup();
    let synthesizer = Arc::new(
        MockSynthesizer::new()
            .with_delay(A, Duration::from_millis(300))
            .with_delay(B, Duration::from_millis(200))
            .with_delay(C, Duration::from_millis(10)),
    );

    let (mut dispatcher, queue) = ordered_queue(synthesizer);
    dispatcher.dispatch(A);
    dispatcher.dispatch(B);
    dispatcher.dispatch(C);
    dispatcher.finish();

    let report = consumer.run(queue).await;

    assert_eq!(device.played(), vec![A, B, C]);
    assert_eq!(
        report,
        PlaybackReport {
            played: 3,
            skipped: 0
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_sentence_is_skipped_without_stalling() {
    let (_media, device, consumer) = setup();
    let synthesizer = Arc::new(MockSynthesizer::new().failing(B));

    let (mut dispatcher, queue) = ordered_queue(synthesizer);
    for sentence in [A, B, C] {
        dispatcher.dispatch(sentence);
    }
    dispatcher.finish();

    let report = consumer.run(queue).await;

    assert_eq!(device.played(), vec![A, C]);
    assert_eq!(
        report,
        PlaybackReport {
            played: 2,
            skipped: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_without_device_queue_still_drains() {
    let media = Arc::new(MediaStore::new("http://10.0.0.101:18765"));
    let consumer = PlaybackConsumer::new(None, Arc::clone(&media));
    let synthesizer = Arc::new(MockSynthesizer::new());

    let (mut dispatcher, queue) = ordered_queue(Arc::clone(&synthesizer) as Arc<dyn Synthesizer>);
    for sentence in [A, B, C] {
        dispatcher.dispatch(sentence);
    }
    dispatcher.finish();

    let report = consumer.run(queue).await;

    assert_eq!(
        report,
        PlaybackReport {
            played: 0,
            skipped: 3
        }
    );
    assert_eq!(synthesizer.calls().len(), 3);
    assert!(media.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_dispatcher_terminates_queue() {
    let (_media, device, consumer) = setup();
    let synthesizer = Arc::new(MockSynthesizer::new());

    let (mut dispatcher, queue) = ordered_queue(synthesizer);
    dispatcher.dispatch(A);
    drop(dispatcher);

    let report = consumer.run(queue).await;

    assert_eq!(device.played(), vec![A]);
    assert_eq!(report.played, 1);
}

#[tokio::test(start_paused = true)]
async fn test_consumer_runs_while_producer_is_still_dispatching() {
    let (_media, device, consumer) = setup();
    let synthesizer = Arc::new(MockSynthesizer::new());

    let (mut dispatcher, queue) = ordered_queue(synthesizer);
    let producer = tokio::spawn(async move {
        for sentence in [A, B, C] {
            dispatcher.dispatch(sentence);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        dispatcher.finish();
    });

    let report = consumer.run(queue).await;
    producer.await.unwrap();

    assert_eq!(device.played(), vec![A, B, C]);
    assert_eq!(report.played, 3);
}

#[tokio::test(start_paused = true)]
async fn test_every_clip_gets_a_fresh_url() {
    let (_media, device, consumer) = setup();
    let synthesizer = Arc::new(MockSynthesizer::new());

    let (mut dispatcher, queue) = ordered_queue(synthesizer);
    dispatcher.dispatch(A);
    dispatcher.dispatch(B);
    dispatcher.finish();
    consumer.run(queue).await;

    let urls = device.urls();
    assert_eq!(urls.len(), 2);
    assert_ne!(urls[0], urls[1]);
    assert!(urls.iter().all(|u| u.starts_with("http://10.0.0.101:18765/tts/")));
}

#[tokio::test(start_paused = true)]
async fn test_blank_sentences_are_not_queued() {
    let synthesizer = Arc::new(MockSynthesizer::new());

    let (mut dispatcher, _queue) = ordered_queue(Arc::clone(&synthesizer) as Arc<dyn Synthesizer>);
    dispatcher.dispatch("   ");
    dispatcher.dispatch("");

    assert_eq!(dispatcher.dispatched(), 0);
    assert!(synthesizer.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_announce_plays_single_text() {
    let (_media, device, consumer) = setup();
    let synthesizer = Arc::new(MockSynthesizer::new());

    let report = announce(synthesizer, &consumer, "  Le café est prêt.  ").await;

    assert_eq!(device.played(), vec!["Le café est prêt."]);
    assert_eq!(report.played, 1);
}
