/*!
 * Integration tests for full pipeline runs over mock capabilities.
 *
 * These check the ordering guarantees of the event stream rather than
 * exact text: whatever the fragmentation, the preview comes first, bullets
 * come in order, every back-translation follows its bullet and `done` is last.
 */

use futures::StreamExt;
use std::time::Duration;

use bulletwise::errors::ErrorKind;
use bulletwise::generation::{GenerationConfig, StopReason};
use bulletwise::pipeline::{OutputEvent, SummaryRequest};
use bulletwise::providers::SamplingParams;
use bulletwise::providers::mock::{GeneratorTail, MockGenerator, MockTranslator};

use crate::common::{
    HEBREW_TEXT, chunk_text, collect_events, event_names, init_test_logging, mock_pipeline, mock_pipeline_with,
    position_of, test_settings,
};

const BULLETS: [&str; 5] = [
    "A conference opened in Jerusalem.",
    "Hundreds of people attended.",
    "They came from all over the country.",
    "The talks will last three days.",
    "The mood was upbeat.",
];

fn bullet_indices(events: &[OutputEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            OutputEvent::BulletReady { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

/// Test the ordering invariants for several fragmentations of the same summary
#[tokio::test]
async fn test_pipeline_anyFragmentation_shouldKeepEventOrder() {
    init_test_logging();

    for chunk_chars in [1, 2, 5, 17, 400] {
        let generator = MockGenerator::with_bullets(&BULLETS, chunk_chars);
        let translator = MockTranslator::working();
        let translator_stats = translator.stats();
        let pipeline = mock_pipeline(generator, translator);

        let request = SummaryRequest::new(HEBREW_TEXT).with_back_translation(true);
        let events = collect_events(pipeline.start(request).await.unwrap()).await;

        assert_eq!(events.first().map(|e| e.name()), Some("translation_preview"));
        assert_eq!(
            events.last(),
            Some(&OutputEvent::Done {
                stop_reason: Some(StopReason::Marker)
            })
        );
        assert_eq!(bullet_indices(&events), vec![1, 2, 3, 4, 5], "chunk size {}", chunk_chars);

        for index in 1..=5 {
            let bullet = position_of(&events, |e| matches!(e, OutputEvent::BulletReady { index: i, .. } if *i == index));
            let back =
                position_of(&events, |e| matches!(e, OutputEvent::BackTranslatedReady { index: i, .. } if *i == index));
            assert!(bullet.unwrap() < back.unwrap(), "bullet {} at chunk size {}", index, chunk_chars);
        }

        let chunks = chunk_text(&events);
        assert!(!chunks.contains("END SUMMARY"));
        assert!(chunks.starts_with("\u{2022} A conference opened in Jerusalem.\n"));

        // Three source sentences forward, five bullets back
        assert_eq!(translator_stats.call_count(), 8);
    }
}

/// Test that back-translation calls use the reversed pair and the full bullet line
#[tokio::test]
async fn test_pipeline_backTranslation_shouldTranslateBulletLinesIntoSource() {
    let translator = MockTranslator::working();
    let stats = translator.stats();
    let pipeline = mock_pipeline(MockGenerator::with_bullets(&BULLETS[..2], 6), translator);

    let events = collect_events(
        pipeline
            .start(SummaryRequest::new(HEBREW_TEXT).with_back_translation(true))
            .await
            .unwrap(),
    )
    .await;

    let calls = stats.calls();
    let back_calls: Vec<_> = calls.iter().filter(|c| c.pair.target.to_string() == "heb_Hebr").collect();
    assert_eq!(back_calls.len(), 2);
    assert_eq!(back_calls[0].text, "\u{2022} A conference opened in Jerusalem.");
    assert_eq!(back_calls[0].pair.source.to_string(), "eng_Latn");

    let second = events.iter().find_map(|e| match e {
        OutputEvent::BackTranslatedReady { index: 2, text } => Some(text.as_str()),
        _ => None,
    });
    assert_eq!(second, Some("[heb_Hebr] \u{2022} Hundreds of people attended."));
}

/// Test that configured translator sampling reaches both translation directions
#[tokio::test]
async fn test_pipeline_translatorSampling_shouldBeForwarded() {
    let sampling = SamplingParams {
        temperature: Some(0.4),
        top_p: None,
    };
    let mut settings = test_settings();
    settings.translation_sampling = sampling;

    let translator = MockTranslator::working();
    let stats = translator.stats();
    let pipeline = mock_pipeline_with(
        MockGenerator::with_bullets(&BULLETS[..1], 5),
        translator,
        Duration::from_secs(1),
        settings,
    );

    let events = collect_events(
        pipeline
            .start(SummaryRequest::new(HEBREW_TEXT).with_back_translation(true))
            .await
            .unwrap(),
    )
    .await;

    assert!(event_names(&events).contains(&"back_translated_ready"));
    assert_eq!(stats.last_sampling(), Some(sampling));
}

/// Test that without back-translation the translator only sees source sentences
#[tokio::test]
async fn test_pipeline_withoutBackTranslation_shouldNotCallTranslatorPerBullet() {
    let translator = MockTranslator::working();
    let stats = translator.stats();
    let pipeline = mock_pipeline(MockGenerator::with_bullets(&BULLETS, 4), translator);

    let events = collect_events(pipeline.start(SummaryRequest::new(HEBREW_TEXT)).await.unwrap()).await;

    assert_eq!(stats.call_count(), 3);
    assert!(stats.calls().iter().all(|c| c.pair.target.to_string() == "eng_Latn"));
    assert!(!event_names(&events).contains(&"back_translated_ready"));
    assert_eq!(bullet_indices(&events).len(), 5);
}

/// Test that one failing bullet does not affect its neighbours
#[tokio::test]
async fn test_pipeline_oneBackTranslationFails_shouldReportOnlyThatIndex() {
    let pipeline = mock_pipeline(
        MockGenerator::with_bullets(&BULLETS[..3], 8),
        MockTranslator::fail_on("Hundreds"),
    );

    let events = collect_events(
        pipeline
            .start(SummaryRequest::new(HEBREW_TEXT).with_back_translation(true))
            .await
            .unwrap(),
    )
    .await;

    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            OutputEvent::Error { kind, index, .. } => Some((*kind, *index)),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![(ErrorKind::BackTranslationFailure, Some(2))]);

    let recovered: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            OutputEvent::BackTranslatedReady { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(recovered, vec![1, 3]);
    assert!(matches!(events.last(), Some(OutputEvent::Done { stop_reason: Some(StopReason::Marker) })));
}

/// Test that a stream interruption keeps already flushed bullets
#[tokio::test]
async fn test_pipeline_generatorDropsMidStream_shouldKeepFlushedOutput() {
    let generator = MockGenerator::from_fragments(["\u{2022} First.\n", "\u{2022} Sec"]).with_tail(GeneratorTail::Fail);
    let pipeline = mock_pipeline(generator, MockTranslator::working());

    let events = collect_events(pipeline.start(SummaryRequest::new(HEBREW_TEXT)).await.unwrap()).await;

    assert_eq!(bullet_indices(&events), vec![1]);
    let error = position_of(&events, |e| matches!(e, OutputEvent::Error { kind: ErrorKind::GenerationFailure, .. }));
    assert!(error.unwrap() > position_of(&events, |e| e.name() == "bullet_ready").unwrap());
    assert_eq!(events.last(), Some(&OutputEvent::Done { stop_reason: None }));
}

/// Test that a model which never writes the marker is cut at the token budget
#[tokio::test]
async fn test_pipeline_markerNeverArrives_shouldEndOnBudget() {
    let generator = MockGenerator::endless("\u{2022} again\n");
    let stats = generator.stats();
    let pipeline = mock_pipeline(generator, MockTranslator::working());

    let generation = GenerationConfig {
        max_tokens: Some(32),
        ..GenerationConfig::default()
    };
    let events = collect_events(
        pipeline
            .start(SummaryRequest::new(HEBREW_TEXT).with_generation(generation))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(
        events.last(),
        Some(&OutputEvent::Done {
            stop_reason: Some(StopReason::TokenBudget)
        })
    );
    assert_eq!(bullet_indices(&events).len(), 5);
    assert_eq!(stats.served(), 32);
    assert_eq!(stats.in_flight(), 0);
}

/// Test that dropping the consumer frees the models for the next request
#[tokio::test]
async fn test_pipeline_consumerDisconnects_shouldReleaseModels() {
    let generator = MockGenerator::endless("word ").with_fragment_delay(Duration::from_millis(5));
    let stats = generator.stats();
    let pipeline = mock_pipeline(generator, MockTranslator::working());

    let mut stream = pipeline.start(SummaryRequest::new(HEBREW_TEXT)).await.unwrap();
    assert_eq!(stream.next().await.map(|e| e.name()), Some("translation_preview"));
    assert!(stream.next().await.is_some());
    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), async {
        while stats.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("generation was not abandoned");
    assert_eq!(stats.abandoned(), 1);

    // The generator lease is free again
    let second = pipeline.start(SummaryRequest::new(HEBREW_TEXT)).await;
    assert!(second.is_ok());
}
