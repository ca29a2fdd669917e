use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::prompts::DEFAULT_STOP_MARKER;

/// Decoding options for one summary.
///
/// Every sampling option is optional: `None` means the caller had no opinion
/// and the generator's own default applies. Only `Some` values are forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature; 0 means greedy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling mass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Restrict sampling to the k most likely tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Penalty applied to repeated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,

    /// Upper bound on generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sentinel that ends the summary
    #[serde(default = "default_stop_marker")]
    pub stop_marker: String,
}

impl GenerationConfig {
    pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
    pub const TOP_P_RANGE: RangeInclusive<f32> = 0.0..=1.0;
    pub const TOP_K_RANGE: RangeInclusive<u32> = 1..=200;
    pub const REPEAT_PENALTY_RANGE: RangeInclusive<f32> = 0.5..=2.0;
    pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 32..=1024;

    /// Check every supplied option against its allowed range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_range("temperature", self.temperature, &Self::TEMPERATURE_RANGE)?;
        check_range("top_p", self.top_p, &Self::TOP_P_RANGE)?;
        check_range("top_k", self.top_k, &Self::TOP_K_RANGE)?;
        check_range("repeat_penalty", self.repeat_penalty, &Self::REPEAT_PENALTY_RANGE)?;
        check_range("max_tokens", self.max_tokens, &Self::MAX_TOKENS_RANGE)?;

        if self.stop_marker.trim().is_empty() {
            return Err(PipelineError::validation("stop_marker must not be empty"));
        }
        Ok(())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: None,
            top_p: None,
            top_k: None,
            repeat_penalty: None,
            max_tokens: None,
            stop_marker: default_stop_marker(),
        }
    }
}

fn default_stop_marker() -> String {
    DEFAULT_STOP_MARKER.to_string()
}

fn check_range<T>(name: &str, value: Option<T>, range: &RangeInclusive<T>) -> Result<(), PipelineError>
where
    T: PartialOrd + std::fmt::Display,
{
    match value {
        Some(v) if !range.contains(&v) => Err(PipelineError::validation(format!(
            "{} must be between {} and {}, got {}",
            name,
            range.start(),
            range.end(),
            v
        ))),
        _ => Ok(()),
    }
}
