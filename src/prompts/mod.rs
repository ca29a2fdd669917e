/*!
 * Prompt engineering for summarization and translation.
 *
 * This module provides:
 * - The system prompt template used by LLM-backed translators
 * - The summarization prompt that asks for a fixed number of bullets
 *   terminated by the configured stop marker
 */

pub mod templates;

// Re-export main types
pub use templates::{BULLET_GLYPH, DEFAULT_STOP_MARKER, PromptTemplate, SummaryPromptBuilder};
