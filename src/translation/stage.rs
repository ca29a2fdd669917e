/*!
 * Translation stage.
 *
 * Wraps the guarded `Translator` capability. Whole texts are translated one
 * sentence per call, which bounds the context of every call and pins a
 * failure to the sentence that caused it. Every call holds the translator
 * lease only for its own duration.
 */

use log::{debug, error};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, ProviderError};
use crate::language_utils::LanguagePair;
use crate::providers::{SamplingParams, Translator};
use crate::serializer::ModelGuard;
use crate::translation::sentences::split_sentences;

/// Translated text and the direction it was translated in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    pub text: String,
    #[serde(skip)]
    pub pair: LanguagePair,
}

/// A single call that has not been placed in request context yet
#[derive(Debug, Clone, PartialEq)]
pub enum UnitFailure {
    /// The translator itself failed
    Provider(ProviderError),
    /// Queueing for the translator failed or the request was cancelled
    Pipeline(PipelineError),
}

impl UnitFailure {
    /// Attach request context to a provider failure
    pub fn into_pipeline(self, wrap: impl FnOnce(ProviderError) -> PipelineError) -> PipelineError {
        match self {
            Self::Provider(source) => wrap(source),
            Self::Pipeline(err) => err,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslationStage {
    translator: ModelGuard<dyn Translator>,
    sampling: Option<SamplingParams>,
}

impl TranslationStage {
    pub fn new(translator: ModelGuard<dyn Translator>) -> Self {
        Self {
            translator,
            sampling: None,
        }
    }

    /// Sample instead of decoding greedily; params are forwarded as-is
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling.is_sampling().then_some(sampling);
        self
    }

    /// Translate a whole text sentence by sentence and join with single spaces.
    ///
    /// Text without any sentence is a validation error. The first failing
    /// sentence aborts the whole translation.
    pub async fn translate_whole(
        &self,
        text: &str,
        pair: &LanguagePair,
        cancel: &CancellationToken,
    ) -> Result<TranslationResult, PipelineError> {
        let spans = split_sentences(text);
        if spans.is_empty() {
            return Err(PipelineError::validation("text must contain at least one sentence"));
        }
        debug!("Translating {} sentence(s) {}", spans.len(), pair);

        let mut pieces = Vec::with_capacity(spans.len());
        for span in &spans {
            let piece = self.translate_unit(&span.text, pair, cancel).await.map_err(|failure| {
                failure.into_pipeline(|source| {
                    error!("Sentence {} failed to translate: {}", span.index, source);
                    PipelineError::TranslationFailure {
                        sentence: span.index,
                        source,
                    }
                })
            })?;
            pieces.push(piece.text);
        }

        Ok(TranslationResult {
            text: pieces.join(" "),
            pair: pair.clone(),
        })
    }

    /// Translate one text in a single call, trimmed of stray whitespace.
    pub async fn translate_unit(
        &self,
        text: &str,
        pair: &LanguagePair,
        cancel: &CancellationToken,
    ) -> Result<TranslationResult, UnitFailure> {
        let lease = self.translator.acquire(cancel).await.map_err(UnitFailure::Pipeline)?;

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UnitFailure::Pipeline(PipelineError::Cancelled)),
            result = lease.translate(text, pair, self.sampling.as_ref()) => result.map_err(UnitFailure::Provider)?,
        };
        drop(lease);

        let translated = raw.trim();
        if translated.is_empty() {
            return Err(UnitFailure::Provider(ProviderError::ParseError(
                "translator returned empty text".to_string(),
            )));
        }

        Ok(TranslationResult {
            text: translated.to_string(),
            pair: pair.clone(),
        })
    }
}
