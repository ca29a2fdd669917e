/*!
 * Summary pipeline orchestration.
 *
 * `SummaryPipeline::start` runs everything that may still fail with a proper
 * status code: validation, whole-text translation and opening the generation
 * stream. It then hands the rest to a driver task that feeds one bounded
 * channel of `OutputEvent`s:
 *
 * 1. `TranslationPreview`
 * 2. `GenerationChunk`s as clean text arrives, each completed line also
 *    producing a `BulletReady`
 * 3. `BackTranslatedReady` per bullet when requested, sent once available;
 *    these overlap with generation of the following bullets
 * 4. `Done`
 *
 * Dropping the returned `SummaryStream` cancels the request: the driver stops
 * at its next suspension point and in-flight model calls are dropped.
 */

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use log::{error, info, warn};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, ProviderError};
use crate::generation::stage::ChunkStream;
use crate::generation::{BulletAssembler, BulletLine, GenerationChunk, GenerationConfig, GenerationStage, StopReason};
use crate::language_utils::{LanguagePair, LanguageTag};
use crate::pipeline::events::OutputEvent;
use crate::pipeline::lifecycle::{Lifecycle, RequestPhase};
use crate::prompts::SummaryPromptBuilder;
use crate::providers::SamplingParams;
use crate::serializer::RequestSerializer;
use crate::translation::{BackTranslatedBullet, BackTranslationStage, TranslationStage};

/// One summarization job
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    /// Text in the source language
    pub text: String,
    /// Decoding options; unset fields are left to the generator
    pub generation: GenerationConfig,
    /// Also stream each bullet translated back into the source language
    pub back_translate: bool,
    /// Overrides the configured source language for this request
    pub source_language: Option<LanguageTag>,
}

impl SummaryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generation: GenerationConfig::default(),
            back_translate: false,
            source_language: None,
        }
    }

    pub fn with_back_translation(mut self, enabled: bool) -> Self {
        self.back_translate = enabled;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }
}

/// Per-process settings of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Default source language
    pub source: LanguageTag,
    /// Language the summary is generated in
    pub pivot: LanguageTag,
    /// Ceiling on the total duration of one request
    pub request_timeout: Duration,
    /// Capacity of the per-request event channel
    pub event_buffer: usize,
    /// Translator decoding; unset knobs mean greedy
    pub translation_sampling: SamplingParams,
}

/// Entry point of the service: owns the guarded capabilities
#[derive(Debug, Clone)]
pub struct SummaryPipeline {
    serializer: RequestSerializer,
    settings: PipelineSettings,
}

type BackTranslation = BoxFuture<'static, (usize, Result<BackTranslatedBullet, PipelineError>)>;

impl SummaryPipeline {
    pub fn new(serializer: RequestSerializer, settings: PipelineSettings) -> Self {
        Self { serializer, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn translation_stage(&self) -> TranslationStage {
        TranslationStage::new(self.serializer.translator().clone()).with_sampling(self.settings.translation_sampling)
    }

    /// Reachability of the backing models, by name
    pub async fn check_connections(&self) -> Vec<(String, Result<(), ProviderError>)> {
        self.serializer.check_connections().await
    }

    /// Accept a request and start streaming its events.
    ///
    /// Every error returned here happens before the first event exists, so
    /// the transport can still answer with a proper status. Later failures
    /// arrive as `OutputEvent::Error`.
    pub async fn start(&self, request: SummaryRequest) -> Result<SummaryStream, PipelineError> {
        let request_id = new_request_id();
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + self.settings.request_timeout;
        let mut lifecycle = Lifecycle::new(&request_id);

        info!(
            "[{}] Summary request: {} chars, back-translate: {}",
            request_id,
            request.text.chars().count(),
            request.back_translate
        );

        let prepared = tokio::time::timeout_at(deadline, self.prepare(&request, &mut lifecycle, &cancel)).await;
        let (pair, preview, chunks) = match prepared {
            Ok(Ok(ready)) => ready,
            Ok(Err(err)) => {
                lifecycle.fail();
                match err.kind().http_status() {
                    400 => warn!("[{}] Rejected: {}", request_id, err),
                    _ => error!("[{}] Failed before streaming: {}", request_id, err),
                }
                return Err(err);
            }
            Err(_) => {
                cancel.cancel();
                lifecycle.fail();
                let err = PipelineError::Timeout(self.settings.request_timeout.as_secs());
                error!("[{}] {}", request_id, err);
                return Err(err);
            }
        };

        let back = request.back_translate.then(|| {
            BackTranslationStage::new(self.translation_stage(), &pair)
        });

        let (events, receiver) = mpsc::channel(self.settings.event_buffer.max(1));
        let driver = Driver {
            request_id: request_id.clone(),
            events,
            cancel: cancel.clone(),
            deadline,
            timeout_secs: self.settings.request_timeout.as_secs(),
            back,
            lifecycle,
        };
        tokio::spawn(driver.run(preview, chunks));

        Ok(SummaryStream {
            inner: ReceiverStream::new(receiver),
            cancel,
            request_id,
        })
    }

    /// Validate, translate and open the generation stream.
    async fn prepare(
        &self,
        request: &SummaryRequest,
        lifecycle: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<(LanguagePair, String, ChunkStream), PipelineError> {
        if request.text.trim().is_empty() {
            return Err(PipelineError::validation("text must not be empty"));
        }
        request.generation.validate()?;

        let source = request
            .source_language
            .clone()
            .unwrap_or_else(|| self.settings.source.clone());
        let pair = LanguagePair::new(source, self.settings.pivot.clone());

        lifecycle.advance(RequestPhase::Translating);
        let translation = self.translation_stage();
        let translated = translation.translate_whole(&request.text, &pair, cancel).await?;

        lifecycle.advance(RequestPhase::Generating);
        let prompt = SummaryPromptBuilder::new(&pair.target.display_name(), &pair.source.display_name())
            .with_stop_marker(&request.generation.stop_marker)
            .build(&translated.text);
        let chunks = GenerationStage::new(self.serializer.generator().clone())
            .generate(&prompt, &request.generation, cancel)
            .await?;

        Ok((pair, translated.text, chunks))
    }
}

fn new_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Event stream of one request; dropping it cancels the request
#[derive(Debug)]
pub struct SummaryStream {
    inner: ReceiverStream<OutputEvent>,
    cancel: CancellationToken,
    request_id: String,
}

impl SummaryStream {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Stream for SummaryStream {
    type Item = OutputEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for SummaryStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The consumer went away; nothing more can be delivered
struct Disconnected;

/// Background half of one request
struct Driver {
    request_id: String,
    events: mpsc::Sender<OutputEvent>,
    cancel: CancellationToken,
    deadline: Instant,
    timeout_secs: u64,
    back: Option<BackTranslationStage>,
    lifecycle: Lifecycle,
}

impl Driver {
    async fn run(mut self, preview: String, chunks: ChunkStream) {
        match self.drive(preview, chunks).await {
            Ok(()) => {}
            Err(Disconnected) => {
                self.cancel.cancel();
                if !self.lifecycle.phase().is_terminal() {
                    self.lifecycle.fail();
                }
                info!(
                    "[{}] Consumer disconnected after {} ms; work abandoned",
                    self.request_id,
                    self.lifecycle.elapsed().as_millis()
                );
            }
        }
    }

    async fn drive(&mut self, preview: String, chunks: ChunkStream) -> Result<(), Disconnected> {
        self.emit(OutputEvent::TranslationPreview { text: preview }).await?;

        let mut chunks = Some(chunks);
        let mut assembler = BulletAssembler::new();
        let mut pending: FuturesUnordered<BackTranslation> = FuturesUnordered::new();
        let mut stop_reason = None;
        let mut failed = false;

        let timeout = tokio::time::sleep_until(self.deadline);
        tokio::pin!(timeout);

        while chunks.is_some() || !pending.is_empty() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Disconnected),
                _ = &mut timeout => {
                    // Stop all model work before reporting
                    drop(chunks.take());
                    pending.clear();
                    failed = true;
                    let err = PipelineError::Timeout(self.timeout_secs);
                    error!("[{}] {}", self.request_id, err);
                    self.emit(OutputEvent::error(&err, None)).await?;
                }
                Some((index, result)) = pending.next() => match result {
                    Ok(bullet) => {
                        self.emit(OutputEvent::BackTranslatedReady { index, text: bullet.text }).await?;
                    }
                    Err(err) => {
                        warn!("[{}] Bullet {} has no back-translation: {}", self.request_id, index, err);
                        self.emit(OutputEvent::error(&err, Some(index))).await?;
                    }
                },
                item = next_chunk(&mut chunks) => match item {
                    Some(Ok(GenerationChunk::Text(text))) => {
                        let ready = assembler.push(&text);
                        self.emit(OutputEvent::GenerationChunk { text }).await?;
                        for bullet in ready {
                            self.bullet_ready(bullet, &mut pending).await?;
                        }
                    }
                    Some(Ok(GenerationChunk::Finished(reason))) => {
                        chunks = None;
                        if let Some(bullet) = assembler.finish() {
                            self.bullet_ready(bullet, &mut pending).await?;
                        }
                        if reason == StopReason::TokenBudget {
                            warn!(
                                "[{}] Token budget spent before the stop marker; summary may be cut off ({} bullet(s))",
                                self.request_id,
                                assembler.count()
                            );
                        }
                        stop_reason = Some(reason);
                        if !pending.is_empty() {
                            self.lifecycle.advance(RequestPhase::BackTranslating);
                        }
                    }
                    Some(Err(err)) => {
                        chunks = None;
                        failed = true;
                        error!("[{}] {}", self.request_id, err);
                        self.emit(OutputEvent::error(&err, None)).await?;
                    }
                    // A generation stream always ends with an item; treat a bare end as cancellation
                    None => return Err(Disconnected),
                },
            }
        }

        if failed {
            self.lifecycle.fail();
        } else {
            self.lifecycle.advance(RequestPhase::Done);
        }
        self.emit(OutputEvent::Done { stop_reason }).await?;
        info!(
            "[{}] Finished in {} ms: {} bullet(s), {:?}",
            self.request_id,
            self.lifecycle.elapsed().as_millis(),
            assembler.count(),
            self.lifecycle.phase()
        );
        Ok(())
    }

    /// Announce a bullet, then queue its back-translation if requested.
    async fn bullet_ready(
        &mut self,
        bullet: BulletLine,
        pending: &mut FuturesUnordered<BackTranslation>,
    ) -> Result<(), Disconnected> {
        self.emit(OutputEvent::BulletReady {
            index: bullet.index,
            text: bullet.text.clone(),
        })
        .await?;

        if let Some(stage) = &self.back {
            let stage = stage.clone();
            let cancel = self.cancel.clone();
            pending.push(
                async move {
                    let result = stage.back_translate(&bullet, &cancel).await;
                    (bullet.index, result)
                }
                .boxed(),
            );
        }
        Ok(())
    }

    async fn emit(&self, event: OutputEvent) -> Result<(), Disconnected> {
        self.events.send(event).await.map_err(|_| Disconnected)
    }
}

/// Next generation item, or never once the stream is gone
async fn next_chunk(chunks: &mut Option<ChunkStream>) -> Option<Result<GenerationChunk, PipelineError>> {
    match chunks {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
