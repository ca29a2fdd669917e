/*!
 * Mock capabilities for testing.
 *
 * - `MockGenerator` serves a scripted fragment sequence, optionally failing
 *   or never ending, and records how it was driven.
 * - `MockTranslator` translates from a dictionary (or tags the text with the
 *   target language) and can fail always, intermittently or on a needle.
 *
 * Both keep shared statistics behind an `Arc`, so a test can hand the mock to
 * a pipeline and still inspect call counts, concurrency and cancellation.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::generation::GenerationConfig;
use crate::language_utils::LanguagePair;
use crate::prompts::DEFAULT_STOP_MARKER;
use crate::providers::{FragmentStream, Generator, SamplingParams, Translator};

/// Tracks concurrent use; `max` keeps the high-water mark
#[derive(Debug, Default)]
struct Occupancy {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Occupancy {
    fn enter(self: &Arc<Self>) -> OccupancyGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        OccupancyGuard(Arc::clone(self))
    }
}

#[derive(Debug)]
struct OccupancyGuard(Arc<Occupancy>);

impl Drop for OccupancyGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Render bullets the way a well-behaved model would, ending with the marker
pub fn scripted_summary(bullets: &[&str]) -> String {
    let mut text = String::new();
    for bullet in bullets {
        text.push_str("\u{2022} ");
        text.push_str(bullet);
        text.push('\n');
    }
    text.push_str(DEFAULT_STOP_MARKER);
    text.push('\n');
    text
}

/// What the generator does after its scripted fragments run out
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorTail {
    /// End the stream normally
    End,
    /// Fail mid-stream
    Fail,
    /// Keep repeating this fragment forever
    Repeat(String),
}

/// Counters shared between a `MockGenerator` and the test observing it
#[derive(Debug, Default)]
pub struct GeneratorStats {
    calls: AtomicUsize,
    served: AtomicUsize,
    abandoned: AtomicUsize,
    occupancy: Arc<Occupancy>,
    last_prompt: Mutex<Option<String>>,
    last_config: Mutex<Option<GenerationConfig>>,
}

impl GeneratorStats {
    /// Number of `generate` calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fragments handed out across all calls
    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Streams dropped before they were exhausted
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Streams currently alive
    pub fn in_flight(&self) -> usize {
        self.occupancy.current.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.occupancy.max.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }

    pub fn last_config(&self) -> Option<GenerationConfig> {
        self.last_config.lock().clone()
    }
}

/// Scripted generator
#[derive(Debug, Clone)]
pub struct MockGenerator {
    fragments: Vec<String>,
    tail: GeneratorTail,
    fail_immediately: bool,
    fragment_delay: Option<Duration>,
    stats: Arc<GeneratorStats>,
}

impl MockGenerator {
    /// Serve exactly these fragments, then end
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            tail: GeneratorTail::End,
            fail_immediately: false,
            fragment_delay: None,
            stats: Arc::new(GeneratorStats::default()),
        }
    }

    /// Serve `text` cut into pieces of `chunk_chars` characters
    pub fn from_text(text: &str, chunk_chars: usize) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let fragments: Vec<String> = chars
            .chunks(chunk_chars.max(1))
            .map(|chunk| chunk.iter().collect())
            .collect();
        Self::from_fragments(fragments)
    }

    /// Five well-formed bullets followed by the default stop marker
    pub fn with_bullets(bullets: &[&str], chunk_chars: usize) -> Self {
        Self::from_text(&scripted_summary(bullets), chunk_chars)
    }

    /// Refuse to start generating
    pub fn failing() -> Self {
        let mut generator = Self::from_fragments(Vec::<String>::new());
        generator.fail_immediately = true;
        generator
    }

    /// Serve `fragments`, then fail
    pub fn fail_after<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_fragments(fragments).with_tail(GeneratorTail::Fail)
    }

    /// Repeat `fragment` forever; never emits a stop marker
    pub fn endless(fragment: &str) -> Self {
        Self::from_fragments(Vec::<String>::new()).with_tail(GeneratorTail::Repeat(fragment.to_string()))
    }

    pub fn with_tail(mut self, tail: GeneratorTail) -> Self {
        self.tail = tail;
        self
    }

    /// Sleep before every fragment
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    pub fn stats(&self) -> Arc<GeneratorStats> {
        Arc::clone(&self.stats)
    }
}

struct ScriptState {
    pending: VecDeque<String>,
    tail: GeneratorTail,
    delay: Option<Duration>,
    stats: Arc<GeneratorStats>,
    exhausted: bool,
    _occupancy: OccupancyGuard,
}

impl Drop for ScriptState {
    fn drop(&mut self) {
        if !self.exhausted {
            self.stats.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<FragmentStream, ProviderError> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_prompt.lock() = Some(prompt.to_string());
        *self.stats.last_config.lock() = Some(config.clone());

        if self.fail_immediately {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated generator failure".to_string(),
            });
        }

        let state = ScriptState {
            pending: self.fragments.iter().cloned().collect(),
            tail: self.tail.clone(),
            delay: self.fragment_delay,
            stats: Arc::clone(&self.stats),
            exhausted: false,
            _occupancy: self.stats.occupancy.enter(),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            if state.exhausted {
                return None;
            }
            if let Some(delay) = state.delay {
                tokio::time::sleep(delay).await;
            }

            let next = match state.pending.pop_front() {
                Some(fragment) => Ok(fragment),
                None => match &state.tail {
                    GeneratorTail::End => {
                        state.exhausted = true;
                        drop(state);
                        return None;
                    }
                    GeneratorTail::Fail => {
                        state.exhausted = true;
                        Err(ProviderError::ConnectionError("Simulated stream interruption".to_string()))
                    }
                    GeneratorTail::Repeat(fragment) => Ok(fragment.clone()),
                },
            };

            if next.is_ok() {
                state.stats.served.fetch_add(1, Ordering::SeqCst);
            }
            Some((next, state))
        });

        Ok(Box::pin(stream))
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        if self.fail_immediately {
            return Err(ProviderError::ConnectionError("Simulated generator outage".to_string()));
        }
        Ok(())
    }
}

/// Behavior mode for the mock translator
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Always fails with an error
    Failing,
    /// Fails whenever the text contains this needle
    FailOn(String),
}

/// One recorded translation call
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorCall {
    pub text: String,
    pub pair: LanguagePair,
}

/// Counters shared between a `MockTranslator` and the test observing it
#[derive(Debug, Default)]
pub struct TranslatorStats {
    calls: Mutex<Vec<TranslatorCall>>,
    completed: AtomicUsize,
    occupancy: Arc<Occupancy>,
    last_sampling: Mutex<Option<SamplingParams>>,
}

impl TranslatorStats {
    /// Every call in arrival order
    pub fn calls(&self) -> Vec<TranslatorCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls that ran to completion (not dropped mid-flight)
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.occupancy.current.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.occupancy.max.load(Ordering::SeqCst)
    }

    pub fn last_sampling(&self) -> Option<SamplingParams> {
        *self.last_sampling.lock()
    }
}

/// Dictionary-backed translator
#[derive(Debug, Clone)]
pub struct MockTranslator {
    behavior: MockBehavior,
    dictionary: HashMap<String, String>,
    delay: Option<Duration>,
    stats: Arc<TranslatorStats>,
}

impl MockTranslator {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            dictionary: HashMap::new(),
            delay: None,
            stats: Arc::new(TranslatorStats::default()),
        }
    }

    /// Translator that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Translator that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Translator that errors on any text containing `needle`
    pub fn fail_on(needle: &str) -> Self {
        Self::new(MockBehavior::FailOn(needle.to_string()))
    }

    /// Return `translation` verbatim whenever the (trimmed) input is `text`
    pub fn with_entry(mut self, text: &str, translation: &str) -> Self {
        self.dictionary.insert(text.trim().to_string(), translation.to_string());
        self
    }

    /// Sleep inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn stats(&self) -> Arc<TranslatorStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        pair: &LanguagePair,
        sampling: Option<&SamplingParams>,
    ) -> Result<String, ProviderError> {
        let _occupancy = self.stats.occupancy.enter();
        let count = {
            let mut calls = self.stats.calls.lock();
            calls.push(TranslatorCall {
                text: text.to_string(),
                pair: pair.clone(),
            });
            calls.len()
        };
        *self.stats.last_sampling.lock() = sampling.copied();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failed = match &self.behavior {
            MockBehavior::Working => false,
            MockBehavior::Failing => true,
            MockBehavior::FailOn(needle) => text.contains(needle.as_str()),
        };
        if failed {
            return Err(ProviderError::ApiError {
                status_code: 503,
                message: format!("Simulated translator failure (request #{})", count),
            });
        }

        self.stats.completed.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .dictionary
            .get(text.trim())
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", pair.target, text)))
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated translator outage".to_string())),
            _ => Ok(()),
        }
    }
}
