/*!
 * Ollama HTTP client and the capabilities built on top of it.
 *
 * - `OllamaGenerator` streams `/api/generate` (JSON lines) and yields each
 *   `response` piece as a fragment. The stop marker is never forwarded: it is
 *   detected on our side so the marker can be matched across fragments.
 * - `OllamaTranslator` sends one `/api/chat` exchange per text with a
 *   translation system prompt, greedy unless sampling params are given.
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::generation::GenerationConfig;
use crate::language_utils::LanguagePair;
use crate::prompts::PromptTemplate;
use crate::providers::{FragmentStream, Generator, SamplingParams, Translator};

/// Ollama client for interacting with Ollama API
#[derive(Debug, Clone)]
pub struct Ollama {
    /// Base URL of the Ollama API, without trailing slash
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Maximum number of retry attempts for non-streaming calls
    max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    backoff_base_ms: u64,
}

/// Model parameters; only the fields that are set get serialized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl GenerationOptions {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// `None` when nothing is set, so the request carries no `options` key at all
    fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            repeat_penalty: config.repeat_penalty,
            num_predict: config.max_tokens,
        }
    }
}

/// Generate request for the Ollama API
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    stream: bool,
}

impl GenerationRequest {
    /// Create a streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
            stream: true,
        }
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options.non_empty();
        self
    }
}

/// One line of a streamed `/api/generate` response
#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Chat message object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat request for the Ollama API
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    stream: bool,
}

impl ChatRequest {
    /// Create a non-streaming chat request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: None,
            stream: false,
        }
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options.non_empty();
        self
    }
}

/// Chat response from the Ollama API
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

impl Ollama {
    /// Create a client for `endpoint` (e.g. `http://localhost:11434`).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let url = Url::parse(endpoint)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid Ollama endpoint '{}': {}", endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProviderError::RequestFailed(format!(
                "Invalid Ollama endpoint '{}': scheme must be http or https",
                endpoint
            )));
        }

        // Ollama speaks HTTP/1.1; keep a warm pool since every request hits it
        let client = Client::builder()
            .timeout(timeout)
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            client,
            max_retries: 2,
            backoff_base_ms: 500,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a streaming generation.
    ///
    /// Not retried: once the first fragment went out the caller has already
    /// seen partial output.
    pub async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Ollama API error ({}): {}", status, message);
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        Ok(fragments_from_jsonl(response.bytes_stream()))
    }

    /// Chat with the Ollama API, retrying connection and server errors
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut attempt = 0;
        loop {
            let err = match self.client.post(&url).json(request).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.text().await?;
                        return serde_json::from_str::<ChatResponse>(&body).map_err(|e| {
                            error!(
                                "Failed to parse Ollama chat response: {}. Raw response (first 200 chars): {}",
                                e,
                                body.chars().take(200).collect::<String>()
                            );
                            ProviderError::ParseError(e.to_string())
                        });
                    }

                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to get error response text".to_string());
                    let err = ProviderError::ApiError {
                        status_code: status.as_u16(),
                        message,
                    };
                    if !status.is_server_error() {
                        // Client error - don't retry
                        error!("Ollama chat rejected: {}", err);
                        return Err(err);
                    }
                    err
                }
                Err(e) => ProviderError::from(e),
            };

            if attempt >= self.max_retries {
                error!("Ollama chat failed after {} attempts: {}", attempt + 1, err);
                return Err(err);
            }
            attempt += 1;
            let backoff_ms = self.backoff_base_ms * (1u64 << (attempt - 1));
            warn!(
                "Ollama chat attempt {}/{} failed: {} - retrying in {} ms",
                attempt,
                self.max_retries + 1,
                err,
                backoff_ms
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }

    /// Get the Ollama API version
    pub async fn version(&self) -> Result<String, ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response: serde_json::Value = self.client.get(&url).send().await?.json().await?;

        response["version"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ParseError("Invalid version format in response".to_string()))
    }
}

/// Turn a raw `/api/generate` body into a fragment stream.
///
/// Network chunks do not line up with JSON lines, so bytes are buffered until
/// a full line is available. The stream ends after the `done` line.
pub fn fragments_from_jsonl<S, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ProviderError> + Send + 'static,
{
    struct LineReader<S> {
        body: Pin<Box<S>>,
        buffer: Vec<u8>,
        finished: bool,
    }

    let reader = LineReader {
        body: Box::pin(body),
        buffer: Vec::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(reader, |mut reader| async move {
        loop {
            if reader.finished {
                return None;
            }

            if let Some(pos) = reader.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = reader.buffer.drain(..=pos).collect();
                match decode_line(&line) {
                    Ok(None) => continue,
                    Ok(Some((fragment, done))) => {
                        reader.finished = done;
                        if fragment.is_empty() {
                            continue;
                        }
                        return Some((Ok(fragment), reader));
                    }
                    Err(e) => {
                        reader.finished = true;
                        return Some((Err(e), reader));
                    }
                }
            }

            match reader.body.next().await {
                Some(Ok(chunk)) => reader.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    reader.finished = true;
                    return Some((Err(e.into()), reader));
                }
                None => {
                    // Body ended; a last line may lack its newline
                    reader.finished = true;
                    let line = std::mem::take(&mut reader.buffer);
                    return match decode_line(&line) {
                        Ok(Some((fragment, _))) if !fragment.is_empty() => Some((Ok(fragment), reader)),
                        Ok(_) => None,
                        Err(e) => Some((Err(e), reader)),
                    };
                }
            }
        }
    });

    Box::pin(stream)
}

/// Decode one JSON line into `(fragment, done)`; blank lines yield `None`.
fn decode_line(line: &[u8]) -> Result<Option<(String, bool)>, ProviderError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| ProviderError::ParseError(format!("Invalid UTF-8 in stream: {}", e)))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }

    let parsed: GenerateLine = serde_json::from_str(text)
        .map_err(|e| ProviderError::ParseError(format!("Invalid stream line: {}", e)))?;
    if let Some(message) = parsed.error {
        return Err(ProviderError::RequestFailed(message));
    }
    if parsed.done {
        debug!("Ollama generation finished ({})", parsed.done_reason.as_deref().unwrap_or("unknown"));
    }
    Ok(Some((parsed.response, parsed.done)))
}

/// Streaming generator backed by Ollama `/api/generate`
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Ollama,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: Ollama, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// The request sent for `prompt`; only options set in `config` are included
    pub fn request_for(&self, prompt: &str, config: &GenerationConfig) -> GenerationRequest {
        GenerationRequest::new(&self.model, prompt).options(GenerationOptions::from(config))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<FragmentStream, ProviderError> {
        let request = self.request_for(prompt, config);
        debug!("Starting generation with {} ({} prompt chars)", self.model, prompt.chars().count());
        self.client.generate_stream(&request).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let version = self.client.version().await?;
        debug!("Ollama {} reachable at {}", version, self.client.base_url());
        Ok(())
    }
}

/// Translator backed by an instruction-following chat model
#[derive(Debug, Clone)]
pub struct OllamaTranslator {
    client: Ollama,
    model: String,
    system_prompt: PromptTemplate,
}

impl OllamaTranslator {
    pub fn new(client: Ollama, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: PromptTemplate::default(),
        }
    }

    pub fn with_system_prompt(mut self, template: PromptTemplate) -> Self {
        self.system_prompt = template;
        self
    }

    /// The request sent for one translation
    pub fn request_for(&self, text: &str, pair: &LanguagePair, sampling: Option<&SamplingParams>) -> ChatRequest {
        let system = self
            .system_prompt
            .render(&pair.source.display_name(), &pair.target.display_name());

        // Greedy unless the caller asked for sampling; then forward as-is
        let options = match sampling {
            Some(params) if params.is_sampling() => GenerationOptions {
                temperature: params.temperature,
                top_p: params.top_p,
                ..Default::default()
            },
            _ => GenerationOptions {
                temperature: Some(0.0),
                ..Default::default()
            },
        };

        ChatRequest::new(&self.model, vec![ChatMessage::system(system), ChatMessage::user(text)]).options(options)
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(
        &self,
        text: &str,
        pair: &LanguagePair,
        sampling: Option<&SamplingParams>,
    ) -> Result<String, ProviderError> {
        let request = self.request_for(text, pair, sampling);
        let response = self.client.chat(&request).await?;

        if response.message.content.trim().is_empty() {
            return Err(ProviderError::ParseError("Model returned an empty translation".to_string()));
        }
        Ok(response.message.content)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.client.version().await.map(|_| ())
    }
}
