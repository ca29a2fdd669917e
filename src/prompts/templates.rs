/*!
 * Prompt templates for summarization and translation.
 *
 * The summary prompt is deterministic: the same input text and settings
 * always render the same prompt, and the prompt always names the exact stop
 * marker the generation stage scans for.
 */

/// Sentinel phrase that ends a summary
pub const DEFAULT_STOP_MARKER: &str = "END SUMMARY";

/// Glyph every requested bullet starts with (U+2022)
pub const BULLET_GLYPH: char = '\u{2022}';

/// System prompt template with `{source_language}` / `{target_language}` slots.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// The default system prompt for single-sentence translation.
    pub const SENTENCE_TRANSLATOR: &'static str = "You are a professional translator. Translate the user's text from {source_language} to {target_language}. \
Preserve the meaning and tone. Reply with the translation only, without quotes, notes or explanations.";

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Create the default sentence translator template.
    pub fn sentence_translator() -> Self {
        Self::new(Self::SENTENCE_TRANSLATOR)
    }

    /// Render the template with the given variables.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::sentence_translator()
    }
}

/// Builds the instruction prompt handed to the generator.
#[derive(Debug, Clone)]
pub struct SummaryPromptBuilder {
    stop_marker: String,
    bullet_count: usize,
    pivot_language: String,
    source_language: String,
}

impl SummaryPromptBuilder {
    /// Create a builder for summaries written in `pivot_language` that will be
    /// translated back into `source_language`.
    pub fn new(pivot_language: &str, source_language: &str) -> Self {
        Self {
            stop_marker: DEFAULT_STOP_MARKER.to_string(),
            bullet_count: 5,
            pivot_language: pivot_language.to_string(),
            source_language: source_language.to_string(),
        }
    }

    /// Use a different stop marker; the generation stage must scan for the same one.
    pub fn with_stop_marker(mut self, marker: &str) -> Self {
        self.stop_marker = marker.to_string();
        self
    }

    /// Render the full prompt for the already-translated text.
    pub fn build(&self, translated_text: &str) -> String {
        let count = self.bullet_count;
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are a professional {} writer who summarizes texts.\n",
            self.pivot_language
        ));
        prompt.push_str(&format!(
            "Summarize the text below into exactly {} short, natural bullet points.\n",
            count
        ));
        prompt.push_str("- Capture the meaning and intent, not the literal wording.\n");
        prompt.push_str(&format!(
            "- Write each bullet as one complete, simple sentence that translates cleanly into {}. Do not use idioms or figures of speech.\n",
            self.source_language
        ));
        prompt.push_str("- Every bullet must make sense on its own.\n");
        prompt.push_str(&format!(
            "- Use plain, fluent {} and vary the sentence structure.\n",
            self.pivot_language
        ));
        prompt.push_str(&format!(
            "- Begin each bullet with '{}' and put each bullet on its own line.\n",
            BULLET_GLYPH
        ));
        prompt.push_str("- Do not repeat information.\n");
        prompt.push_str(&format!(
            "- Output ONLY the {} bullets, then write '{}' on a line by itself.\n",
            count, self.stop_marker
        ));
        prompt.push_str(&format!("\nText:\n{}\n\nOutput:\n", translated_text.trim()));

        prompt
    }
}
