/*!
 * # bulletwise
 *
 * A streaming summarization service for texts written in a language the
 * summarizing model does not handle well.
 *
 * ## Features
 *
 * - Translate the input into a pivot language sentence by sentence
 * - Summarize it into five bullets with a local LLM, streamed as generated
 * - Cut generation at a stop marker, even when it arrives split across fragments
 * - Optionally translate each bullet back into the source language while
 *   the remaining bullets are still being written
 * - Serialize access to each model across concurrent requests
 * - Plain text or NDJSON response framing
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `translation`: Sentence splitting, forward and back translation stages
 * - `generation`: Stop marker detection, bullet assembly, generation stage
 * - `prompts`: Summarizer and translator prompts
 * - `pipeline`: Request orchestration and output events
 * - `serializer`: Exclusive, queued access to the models
 * - `providers`: Generator and translator capabilities:
 *   - `providers::ollama`: Ollama API client
 *   - `providers::mock`: Scripted capabilities for tests
 * - `server`: Streaming HTTP endpoint
 * - `language_utils`: Language tags and names
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod errors;
pub mod generation;
pub mod language_utils;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod serializer;
pub mod server;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, ErrorKind, PipelineError, ProviderError};
pub use generation::GenerationConfig;
pub use language_utils::{LanguagePair, LanguageTag, get_language_name};
pub use pipeline::{Framing, OutputEvent, SummaryPipeline, SummaryRequest, SummaryStream};
pub use serializer::RequestSerializer;
