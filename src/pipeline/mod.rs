/*!
 * Request pipeline: source text in, ordered summary events out.
 *
 * The pipeline processes a request through these phases:
 * 1. **Translating**: the whole text into the pivot language
 * 2. **Generating**: five bullets, streamed as they are written
 * 3. **Back-translating**: each bullet into the source language, on request
 */

pub mod events;
pub mod lifecycle;
pub mod orchestrator;

pub use events::{EventWriter, Framing, OutputEvent, generation_divider};
pub use lifecycle::{Lifecycle, RequestPhase};
pub use orchestrator::{PipelineSettings, SummaryPipeline, SummaryRequest, SummaryStream};
