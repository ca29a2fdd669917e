/*!
 * Generation stage.
 *
 * Drives the guarded `Generator` with a prompt and turns its raw fragments
 * into clean text: nothing at or after the stop marker is ever yielded. The
 * generator lease is held while fragments are pulled and released the moment
 * the stream ends, fails, is cancelled or is dropped.
 */

use futures::{Stream, StreamExt};
use log::{debug, error};
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, ProviderError};
use crate::generation::config::GenerationConfig;
use crate::generation::stop::{StopScan, StopSequenceDetector};
use crate::providers::{FragmentStream, Generator};
use crate::serializer::{ModelGuard, ModelLease};

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The stop marker was found
    Marker,
    /// The generator ran out of tokens before writing the marker
    TokenBudget,
}

/// Item of a generation stream
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationChunk {
    /// Clean text, in order
    Text(String),
    /// Always the last item of a successful stream
    Finished(StopReason),
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk, PipelineError>> + Send>>;

#[derive(Debug, Clone)]
pub struct GenerationStage {
    generator: ModelGuard<dyn Generator>,
}

struct DriveState {
    lease: Option<ModelLease<dyn Generator>>,
    fragments: Option<FragmentStream>,
    detector: StopSequenceDetector,
    cancel: CancellationToken,
    queue: VecDeque<Result<GenerationChunk, PipelineError>>,
    /// Fragments still allowed before the budget counts as spent
    budget: Option<u32>,
}

impl DriveState {
    /// Stop pulling: drops the fragment stream (aborting the generator) and
    /// frees the generator for the next request.
    fn release(&mut self) {
        self.fragments = None;
        self.lease = None;
    }

    fn end(&mut self, reason: StopReason, clean: Option<String>) {
        self.release();
        if let Some(text) = clean.filter(|t| !t.is_empty()) {
            self.queue.push_back(Ok(GenerationChunk::Text(text)));
        }
        debug!("Generation finished: {:?}", reason);
        self.queue.push_back(Ok(GenerationChunk::Finished(reason)));
    }

    fn fail(&mut self, err: PipelineError) {
        self.release();
        self.queue.push_back(Err(err));
    }
}

enum Step {
    Cancelled,
    Next(Option<Result<String, ProviderError>>),
}

impl GenerationStage {
    pub fn new(generator: ModelGuard<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Start generating; the returned stream is finite and not restartable.
    ///
    /// Waiting for the generator and starting the call happen here, so queue
    /// timeouts and immediate generator failures surface as an `Err` before
    /// any text exists. Later failures arrive as an `Err` item that ends the
    /// stream.
    pub async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, PipelineError> {
        config.validate()?;
        let lease = self.generator.acquire(cancel).await?;

        let fragments = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = lease.generate(prompt, config) => result.map_err(|e| {
                error!("Generator refused to start: {}", e);
                PipelineError::GenerationFailure(e)
            })?,
        };

        let state = DriveState {
            lease: Some(lease),
            fragments: Some(fragments),
            detector: StopSequenceDetector::new(config.stop_marker.as_str()),
            cancel: cancel.clone(),
            queue: VecDeque::new(),
            budget: config.max_tokens,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.queue.pop_front() {
                    return Some((item, state));
                }

                let step = {
                    let fragments = state.fragments.as_mut()?;
                    tokio::select! {
                        biased;
                        _ = state.cancel.cancelled() => Step::Cancelled,
                        next = fragments.next() => Step::Next(next),
                    }
                };

                match step {
                    Step::Cancelled => state.fail(PipelineError::Cancelled),
                    Step::Next(None) => {
                        let rest = state.detector.finish();
                        state.end(StopReason::TokenBudget, rest);
                    }
                    Step::Next(Some(Err(e))) => {
                        error!("Generator failed mid-stream: {}", e);
                        state.fail(PipelineError::GenerationFailure(e));
                    }
                    Step::Next(Some(Ok(fragment))) => {
                        match state.detector.push(&fragment) {
                            StopScan::Text(text) => state.queue.push_back(Ok(GenerationChunk::Text(text))),
                            StopScan::Held | StopScan::Finished => {}
                            StopScan::Stopped(text) => {
                                state.end(StopReason::Marker, Some(text));
                                continue;
                            }
                        }

                        // Each fragment is at least one token, so this never
                        // cuts output the generator would have kept
                        if let Some(budget) = state.budget.as_mut() {
                            *budget = budget.saturating_sub(1);
                            if *budget == 0 {
                                let rest = state.detector.finish();
                                state.end(StopReason::TokenBudget, rest);
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
