/*!
 * Error types for the bulletwise service.
 *
 * This module contains custom error types for the different layers of the
 * service, using the thiserror crate for ergonomic error definitions:
 * - `ProviderError`: raw failures of an external model capability
 * - `PipelineError`: the request-level taxonomy surfaced to clients
 * - `AppError`: everything the binary can fail with
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to a model capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Stable, client-facing classification of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    TranslationFailure,
    GenerationFailure,
    BackTranslationFailure,
    ResourceExhausted,
    Timeout,
    Cancelled,
}

impl ErrorKind {
    /// Snake-case identifier used in framing and JSON bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::TranslationFailure => "translation_failure",
            Self::GenerationFailure => "generation_failure",
            Self::BackTranslationFailure => "back_translation_failure",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// HTTP status used when the failure happens before streaming starts
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::TranslationFailure | Self::GenerationFailure | Self::BackTranslationFailure => 502,
            Self::ResourceExhausted => 503,
            Self::Timeout => 504,
            Self::Cancelled => 499,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-scoped failures of the summarization pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid or empty request fields; raised before any inference call
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Forward translation of one sentence failed
    #[error("Translation of sentence {sentence} failed: {source}")]
    TranslationFailure {
        /// 1-based index of the failing sentence
        sentence: usize,
        /// Underlying capability error
        source: ProviderError,
    },

    /// The generator failed outright
    #[error("Generation failed: {0}")]
    GenerationFailure(ProviderError),

    /// Back-translation of a single bullet failed
    #[error("Back-translation of bullet {index} failed: {source}")]
    BackTranslationFailure {
        /// 1-based bullet index
        index: usize,
        /// Underlying capability error
        source: ProviderError,
    },

    /// Waited too long for exclusive use of a model
    #[error("{model} is busy: no slot freed within {waited_ms} ms, retry later")]
    ResourceExhausted {
        /// Which capability was contended
        model: String,
        /// How long the request queued
        waited_ms: u64,
    },

    /// The request exceeded its total time budget
    #[error("Request exceeded its {0} second time budget")]
    Timeout(u64),

    /// The consumer went away
    #[error("Request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Classify this error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::TranslationFailure { .. } => ErrorKind::TranslationFailure,
            Self::GenerationFailure(_) => ErrorKind::GenerationFailure,
            Self::BackTranslationFailure { .. } => ErrorKind::BackTranslationFailure,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Shorthand for validation failures
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
