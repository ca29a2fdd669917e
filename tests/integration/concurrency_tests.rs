/*!
 * Integration tests for concurrent requests sharing one generator and one
 * translator.
 */

use std::time::Duration;

use bulletwise::errors::{ErrorKind, PipelineError};
use bulletwise::pipeline::{OutputEvent, SummaryRequest};
use bulletwise::providers::mock::{MockGenerator, MockTranslator};

use crate::common::{HEBREW_TEXT, collect_events, init_test_logging, mock_pipeline, mock_pipeline_with, test_settings};

fn preview(events: &[OutputEvent]) -> Option<&str> {
    events.iter().find_map(|e| match e {
        OutputEvent::TranslationPreview { text } => Some(text.as_str()),
        _ => None,
    })
}

/// Test that two requests in flight never use a model at the same time
#[tokio::test]
async fn test_concurrentRequests_shouldNeverInterleaveModelCalls() {
    init_test_logging();

    let generator = MockGenerator::with_bullets(&["One.", "Two.", "Three."], 4)
        .with_fragment_delay(Duration::from_millis(2));
    let translator = MockTranslator::working()
        .with_entry("שלום לכולם.", "Hello everyone.")
        .with_delay(Duration::from_millis(3));
    let generator_stats = generator.stats();
    let translator_stats = translator.stats();
    let pipeline = mock_pipeline(generator, translator);

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let stream = pipeline
                .start(SummaryRequest::new(HEBREW_TEXT).with_back_translation(true))
                .await
                .unwrap();
            collect_events(stream).await
        })
    };
    let second = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let stream = pipeline
                .start(SummaryRequest::new("שלום לכולם.").with_back_translation(true))
                .await
                .unwrap();
            collect_events(stream).await
        })
    };

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(generator_stats.calls(), 2);
    assert_eq!(generator_stats.max_in_flight(), 1);
    assert_eq!(translator_stats.max_in_flight(), 1);

    // 3 + 1 forward sentences, 3 + 3 bullets back
    assert_eq!(translator_stats.call_count(), 10);

    // Events never cross requests
    assert_eq!(preview(&second), Some("Hello everyone."));
    assert!(preview(&first).unwrap().starts_with("[eng_Latn]"));
    for events in [&first, &second] {
        let back = events.iter().filter(|e| e.name() == "back_translated_ready").count();
        assert_eq!(back, 3);
        assert_eq!(events.last().map(|e| e.name()), Some("done"));
    }
}

/// Test that a request waiting too long for the generator fails before streaming
#[tokio::test]
async fn test_busyGenerator_shouldFailQueuedRequestWithResourceExhausted() {
    let generator = MockGenerator::endless("word ").with_fragment_delay(Duration::from_millis(10));
    let pipeline = mock_pipeline_with(
        generator,
        MockTranslator::working(),
        Duration::from_millis(50),
        test_settings(),
    );

    // Holds the generator while its stream is alive
    let holder = pipeline.start(SummaryRequest::new(HEBREW_TEXT)).await.unwrap();

    let err = pipeline.start(SummaryRequest::new(HEBREW_TEXT)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(err.kind().http_status(), 503);
    assert!(matches!(err, PipelineError::ResourceExhausted { ref model, .. } if model == "generator"));

    drop(holder);
}

/// Test that a request overrunning its total budget gets a timeout event
#[tokio::test]
async fn test_slowGeneration_shouldEndWithTimeoutEvent() {
    let mut settings = test_settings();
    settings.request_timeout = Duration::from_millis(150);
    let generator = MockGenerator::endless("word ").with_fragment_delay(Duration::from_millis(20));
    let stats = generator.stats();
    let pipeline = mock_pipeline_with(generator, MockTranslator::working(), Duration::from_secs(1), settings);

    let events = collect_events(pipeline.start(SummaryRequest::new(HEBREW_TEXT)).await.unwrap()).await;

    let timeout = events
        .iter()
        .find(|e| matches!(e, OutputEvent::Error { kind: ErrorKind::Timeout, .. }));
    assert!(timeout.is_some());
    assert_eq!(events.last(), Some(&OutputEvent::Done { stop_reason: None }));
    assert_eq!(stats.in_flight(), 0);
}
