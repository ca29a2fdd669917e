use anyhow::{Result, anyhow};
use isolang::Language;
use serde::{Deserialize, Serialize};

/// Language utilities for translation-model language tags
///
/// Translation models in the NLLB family identify languages with tags of the
/// form `<ISO 639-3>_<ISO 15924 script>`, e.g. `heb_Hebr` or `eng_Latn`.
/// This module validates such tags and resolves human-readable names for
/// prompts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag {
    language: String,
    script: String,
}

impl LanguageTag {
    /// Parse and validate a tag such as `heb_Hebr`
    pub fn parse(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        let (language, script) = tag
            .split_once('_')
            .ok_or_else(|| anyhow!("Invalid language tag '{}': expected <iso639-3>_<Script>", tag))?;

        let language = language.to_lowercase();
        if language.len() != 3 || Language::from_639_3(&language).is_none() {
            return Err(anyhow!("Invalid language tag '{}': unknown ISO 639-3 code '{}'", tag, language));
        }

        if script.len() != 4 || !script.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(anyhow!("Invalid language tag '{}': script must be four letters", tag));
        }
        // ISO 15924 casing: Hebr, Latn, Cyrl
        let script = script[..1].to_ascii_uppercase() + &script[1..].to_ascii_lowercase();

        Ok(Self { language, script })
    }

    /// ISO 639-3 part of the tag
    pub fn language(&self) -> &str {
        &self.language
    }

    /// ISO 15924 part of the tag
    pub fn script(&self) -> &str {
        &self.script
    }

    /// English name of the language, e.g. "Hebrew"
    pub fn display_name(&self) -> String {
        get_language_name(&self.language).unwrap_or_else(|_| self.language.clone())
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.language, self.script)
    }
}

impl std::str::FromStr for LanguageTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.to_string()
    }
}

/// Direction of one translation call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguagePair {
    pub source: LanguageTag,
    pub target: LanguageTag,
}

impl LanguagePair {
    pub fn new(source: LanguageTag, target: LanguageTag) -> Self {
        Self { source, target }
    }

    /// The same pair, flipped (pivot back to source)
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}

impl std::fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Get the English language name from an ISO 639-1 or ISO 639-3 code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized_code = code.trim().to_lowercase();

    let language = match normalized_code.len() {
        2 => Language::from_639_1(&normalized_code),
        3 => Language::from_639_3(&normalized_code),
        _ => None,
    };

    language
        .map(|lang| lang.to_name().to_string())
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}
