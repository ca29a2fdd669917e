use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::generation::GenerationConfig;
use crate::language_utils::LanguageTag;
use crate::pipeline::PipelineSettings;
use crate::prompts::{DEFAULT_STOP_MARKER, PromptTemplate};
use crate::providers::SamplingParams;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Source and pivot languages
    #[serde(default)]
    pub languages: LanguageConfig,

    /// Summary generator
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Sentence translator
    #[serde(default)]
    pub translator: TranslatorConfig,

    /// Queueing and time limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Language tags in `<iso639-3>_<Script>` form
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LanguageConfig {
    /// Language of incoming texts (and of back-translations)
    #[serde(default = "default_source_language")]
    pub source: String,

    /// Language the summary is written in
    #[serde(default = "default_pivot_language")]
    pub pivot: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            source: default_source_language(),
            pivot: default_pivot_language(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Ollama endpoint URL
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// Model name (e.g., "phi3:mini")
    #[serde(default = "default_generator_model")]
    pub model: String,

    /// Upper bound for one generation call
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,

    /// Used when a request does not set `max_tokens`
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Sentinel the prompt asks for and the stream is cut at
    #[serde(default = "default_stop_marker")]
    pub stop_marker: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_generator_model(),
            timeout_secs: default_generator_timeout_secs(),
            default_max_tokens: default_max_tokens(),
            stop_marker: default_stop_marker(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslatorConfig {
    /// Ollama endpoint URL
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_translator_model")]
    pub model: String,

    /// Upper bound for one translation call
    #[serde(default = "default_translator_timeout_secs")]
    pub timeout_secs: u64,

    /// System prompt with `{source_language}` / `{target_language}` placeholders
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Sampling temperature; unset keeps translation greedy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_translator_model(),
            timeout_secs: default_translator_timeout_secs(),
            system_prompt: default_system_prompt(),
            temperature: None,
            top_p: None,
        }
    }
}

impl TranslatorConfig {
    pub fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate::new(&self.system_prompt)
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LimitsConfig {
    /// How long a request may wait for a busy model
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,

    /// Ceiling on the total duration of one request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Events buffered per request before the pipeline waits for the client
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            queue_timeout_ms: default_queue_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl LimitsConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Log level for the application
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_source_language() -> String {
    "heb_Hebr".to_string()
}

fn default_pivot_language() -> String {
    "eng_Latn".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_generator_model() -> String {
    "phi3:mini".to_string()
}

fn default_translator_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_generator_timeout_secs() -> u64 {
    120
}

fn default_translator_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    200
}

fn default_stop_marker() -> String {
    DEFAULT_STOP_MARKER.to_string()
}

fn default_system_prompt() -> String {
    PromptTemplate::SENTENCE_TRANSLATOR.to_string()
}

fn default_queue_timeout_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_event_buffer() -> usize {
    32
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            languages: LanguageConfig::default(),
            generator: GeneratorConfig::default(),
            translator: TranslatorConfig::default(),
            limits: LimitsConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load the config at `path`, writing the defaults there first if the
    /// file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()));
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        let config_json =
            serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        let source = self.source_language()?;
        let pivot = self.pivot_language()?;
        if source == pivot {
            return Err(anyhow!("Source and pivot languages must differ (both are {})", source));
        }

        for (name, endpoint) in [("generator", &self.generator.endpoint), ("translator", &self.translator.endpoint)] {
            Url::parse(endpoint).with_context(|| format!("Invalid {} endpoint: '{}'", name, endpoint))?;
        }
        if self.generator.model.trim().is_empty() {
            return Err(anyhow!("Generator model must be set"));
        }
        if self.translator.model.trim().is_empty() {
            return Err(anyhow!("Translator model must be set"));
        }

        if self.generator.stop_marker.trim().is_empty() {
            return Err(anyhow!("Stop marker must not be empty"));
        }
        if !GenerationConfig::MAX_TOKENS_RANGE.contains(&self.generator.default_max_tokens) {
            return Err(anyhow!(
                "default_max_tokens must be between {} and {}",
                GenerationConfig::MAX_TOKENS_RANGE.start(),
                GenerationConfig::MAX_TOKENS_RANGE.end()
            ));
        }
        let sampling = GenerationConfig {
            temperature: self.translator.temperature,
            top_p: self.translator.top_p,
            ..GenerationConfig::default()
        };
        sampling
            .validate()
            .map_err(|e| anyhow!("Invalid translator sampling: {}", e))?;

        if !self.translator.system_prompt.contains("{target_language}") {
            return Err(anyhow!("Translator system prompt must mention {{target_language}}"));
        }

        if self.generator.timeout_secs == 0 || self.translator.timeout_secs == 0 {
            return Err(anyhow!("Model timeouts must be positive"));
        }
        if self.limits.queue_timeout_ms == 0 || self.limits.request_timeout_secs == 0 {
            return Err(anyhow!("Queue and request timeouts must be positive"));
        }
        if self.limits.event_buffer == 0 {
            return Err(anyhow!("event_buffer must be at least 1"));
        }
        Ok(())
    }

    pub fn source_language(&self) -> Result<LanguageTag> {
        LanguageTag::parse(&self.languages.source).context("Invalid source language")
    }

    pub fn pivot_language(&self) -> Result<LanguageTag> {
        LanguageTag::parse(&self.languages.pivot).context("Invalid pivot language")
    }

    /// Settings the pipeline is built with
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            source: self.source_language()?,
            pivot: self.pivot_language()?,
            request_timeout: self.limits.request_timeout(),
            event_buffer: self.limits.event_buffer,
            translation_sampling: self.translator.sampling(),
        })
    }

    /// Generation options a request starts from before its own overrides
    pub fn base_generation(&self) -> GenerationConfig {
        GenerationConfig {
            max_tokens: Some(self.generator.default_max_tokens),
            stop_marker: self.generator.stop_marker.clone(),
            ..GenerationConfig::default()
        }
    }
}
