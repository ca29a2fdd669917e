/*!
 * Model capabilities consumed by the pipeline.
 *
 * The pipeline never talks to a model directly. It sees two narrow seams:
 * - `Generator`: prompt + options in, a finite stream of text fragments out
 * - `Translator`: one text + language pair in, one translated string out
 *
 * Implementations:
 * - `ollama`: Ollama HTTP API (streaming generate, chat-based translation)
 * - `mock`: scripted capabilities for tests
 */

use async_trait::async_trait;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;

use crate::errors::ProviderError;
use crate::generation::GenerationConfig;
use crate::language_utils::LanguagePair;

/// Fragments as emitted by a generator. Boundaries carry no meaning: a
/// fragment may split a word, a line, or the stop marker.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Sampling knobs a caller may pass to a translator; unset means greedy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl SamplingParams {
    /// True when at least one knob is set
    pub fn is_sampling(&self) -> bool {
        self.temperature.is_some() || self.top_p.is_some()
    }
}

/// Streaming text generation capability
#[async_trait]
pub trait Generator: Send + Sync + Debug {
    /// Start generating for `prompt`.
    ///
    /// Only the options set in `config` are forwarded. Dropping the returned
    /// stream abandons the generation.
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<FragmentStream, ProviderError>;

    /// Check that the backing model is reachable
    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Single-call translation capability
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Translate `text` along `pair`. Without sampling params decoding is
    /// deterministic.
    async fn translate(
        &self,
        text: &str,
        pair: &LanguagePair,
        sampling: Option<&SamplingParams>,
    ) -> Result<String, ProviderError>;

    /// Check that the backing model is reachable
    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub mod mock;
pub mod ollama;
