/*!
 * Common test utilities for the bulletwise test suite
 */

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use bulletwise::language_utils::LanguageTag;
use bulletwise::pipeline::{OutputEvent, PipelineSettings, SummaryPipeline, SummaryStream};
use bulletwise::providers::SamplingParams;
use bulletwise::providers::mock::{MockGenerator, MockTranslator};
use bulletwise::serializer::RequestSerializer;

/// Route library logs to the test output; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Hebrew to English settings with generous limits
pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        source: LanguageTag::parse("heb_Hebr").unwrap(),
        pivot: LanguageTag::parse("eng_Latn").unwrap(),
        request_timeout: Duration::from_secs(10),
        event_buffer: 16,
        translation_sampling: SamplingParams::default(),
    }
}

/// Pipeline over the given mocks with a one second queue timeout
pub fn mock_pipeline(generator: MockGenerator, translator: MockTranslator) -> SummaryPipeline {
    mock_pipeline_with(generator, translator, Duration::from_secs(1), test_settings())
}

pub fn mock_pipeline_with(
    generator: MockGenerator,
    translator: MockTranslator,
    queue_timeout: Duration,
    settings: PipelineSettings,
) -> SummaryPipeline {
    let serializer = RequestSerializer::new(Arc::new(generator), Arc::new(translator), queue_timeout);
    SummaryPipeline::new(serializer, settings)
}

/// Drain a summary stream
pub async fn collect_events(stream: SummaryStream) -> Vec<OutputEvent> {
    stream.collect().await
}

/// Event names in order, e.g. `["translation_preview", "generation_chunk", ...]`
pub fn event_names(events: &[OutputEvent]) -> Vec<&'static str> {
    events.iter().map(|event| event.name()).collect()
}

/// Position of the first event matching `predicate`
pub fn position_of(events: &[OutputEvent], predicate: impl Fn(&OutputEvent) -> bool) -> Option<usize> {
    events.iter().position(predicate)
}

/// Concatenated text of all `GenerationChunk` events
pub fn chunk_text(events: &[OutputEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            OutputEvent::GenerationChunk { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// A short Hebrew paragraph of three sentences
pub const HEBREW_TEXT: &str = "הכנס נפתח הבוקר בירושלים. מאות משתתפים הגיעו מכל הארץ. הדיונים יימשכו שלושה ימים.";
