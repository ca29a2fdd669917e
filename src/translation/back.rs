/*!
 * Back-translation of finished summary bullets into the source language.
 *
 * Each bullet is translated on its own; one failing bullet produces an error
 * for that index only and never touches the others.
 */

use log::warn;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::PipelineError;
use crate::generation::BulletLine;
use crate::language_utils::LanguagePair;
use crate::translation::stage::TranslationStage;

/// A bullet paired with its translation back into the source language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackTranslatedBullet {
    pub index: usize,
    pub original: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct BackTranslationStage {
    translation: TranslationStage,
    /// Pivot -> source
    pair: LanguagePair,
}

impl BackTranslationStage {
    /// `forward` is the direction the request text was translated in; bullets
    /// travel the reverse way.
    pub fn new(translation: TranslationStage, forward: &LanguagePair) -> Self {
        Self {
            translation,
            pair: forward.reversed(),
        }
    }

    pub fn pair(&self) -> &LanguagePair {
        &self.pair
    }

    pub async fn back_translate(
        &self,
        bullet: &BulletLine,
        cancel: &CancellationToken,
    ) -> Result<BackTranslatedBullet, PipelineError> {
        let result = self
            .translation
            .translate_unit(&bullet.text, &self.pair, cancel)
            .await
            .map_err(|failure| {
                failure.into_pipeline(|source| {
                    warn!("Back-translation of bullet {} failed: {}", bullet.index, source);
                    PipelineError::BackTranslationFailure {
                        index: bullet.index,
                        source,
                    }
                })
            })?;

        Ok(BackTranslatedBullet {
            index: bullet.index,
            original: bullet.text.clone(),
            text: result.text,
        })
    }
}
