/*!
 * Streaming HTTP transport.
 *
 * `POST /summarize` accepts a JSON body and answers with a chunked body that
 * is written event by event. Anything that fails before the first event
 * gets a proper status and a JSON error; later failures are framed into the
 * stream itself. `GET /health` is a liveness check.
 */

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{StreamExt, future};
use log::{debug, info, warn};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::Config;
use crate::errors::{AppError, PipelineError};
use crate::generation::GenerationConfig;
use crate::language_utils::LanguageTag;
use crate::pipeline::{Framing, SummaryPipeline, SummaryRequest};
use crate::providers::ollama::{Ollama, OllamaGenerator, OllamaTranslator};
use crate::providers::{Generator, Translator};
use crate::serializer::RequestSerializer;

const NDJSON: &str = "application/x-ndjson";

/// Error answered before the response body starts
pub struct ApiError(PipelineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": kind.as_str(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SummaryPipeline>,
    /// Options every request starts from
    pub base_generation: GenerationConfig,
}

impl AppState {
    pub fn new(pipeline: SummaryPipeline, base_generation: GenerationConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            base_generation,
        }
    }

    /// Build the Ollama-backed capabilities and the pipeline around them
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let generator_client = Ollama::new(
            &config.generator.endpoint,
            Duration::from_secs(config.generator.timeout_secs),
        )?;
        let translator_client = Ollama::new(
            &config.translator.endpoint,
            Duration::from_secs(config.translator.timeout_secs),
        )?;

        let generator: Arc<dyn Generator> = Arc::new(OllamaGenerator::new(generator_client, &config.generator.model));
        let translator: Arc<dyn Translator> = Arc::new(
            OllamaTranslator::new(translator_client, &config.translator.model)
                .with_system_prompt(config.translator.prompt_template()),
        );

        let serializer = RequestSerializer::new(generator, translator, config.limits.queue_timeout());
        let settings = config
            .pipeline_settings()
            .map_err(|e| AppError::Config(format!("{:#}", e)))?;

        Ok(Self::new(SummaryPipeline::new(serializer, settings), config.base_generation()))
    }
}

/// Body of `POST /summarize`
#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub repeat_penalty: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub back_translate: bool,
    #[serde(default)]
    pub source_language: Option<String>,
}

impl SummarizeRequest {
    /// Merge onto `base`; only fields the caller sent replace base values.
    pub fn into_summary_request(self, base: &GenerationConfig) -> Result<SummaryRequest, PipelineError> {
        let source_language = match self.source_language.as_deref() {
            Some(tag) => Some(
                LanguageTag::parse(tag)
                    .map_err(|e| PipelineError::validation(format!("source_language: {:#}", e)))?,
            ),
            None => None,
        };

        let generation = GenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
            max_tokens: self.max_tokens.or(base.max_tokens),
            stop_marker: base.stop_marker.clone(),
        };

        let mut request = SummaryRequest::new(self.text)
            .with_generation(generation)
            .with_back_translation(self.back_translate);
        request.source_language = source_language;
        Ok(request)
    }
}

/// Routes of the service
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/summarize", post(summarize))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn summarize(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    let payload: SummarizeRequest = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::validation(format!("malformed body: {}", e)))?;
    let request = payload.into_summary_request(&state.base_generation)?;
    let framing = framing_for(&headers, request.back_translate);

    let events = state.pipeline.start(request).await?;
    debug!("[{}] Streaming with {:?} framing", events.request_id(), framing);

    let mut writer = framing.writer();
    let chunks = events
        .filter_map(move |event| future::ready(writer.write(&event)))
        .map(|text| Ok::<_, Infallible>(Bytes::from(text)));

    let mut response = Response::new(Body::from_stream(chunks));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(framing.content_type()));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

/// NDJSON when the client asks for it, plain text otherwise
pub fn framing_for(headers: &HeaderMap, back_translate: bool) -> Framing {
    let wants_ndjson = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.split(',').any(|item| item.trim().starts_with(NDJSON)));

    if wants_ndjson {
        Framing::Ndjson
    } else {
        Framing::Text { back_translate }
    }
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
