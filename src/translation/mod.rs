/*!
 * Translation between the source and pivot languages.
 *
 * - `sentences`: script-agnostic sentence splitting
 * - `stage`: whole-text and single-unit translation through the guarded translator
 * - `back`: per-bullet translation back into the source language
 */

pub mod back;
pub mod sentences;
pub mod stage;

pub use back::{BackTranslatedBullet, BackTranslationStage};
pub use sentences::{SentenceSpan, join_sentences, split_sentences};
pub use stage::{TranslationResult, TranslationStage, UnitFailure};
