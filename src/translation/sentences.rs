/*!
 * Sentence segmentation for translation input.
 *
 * Text is cut after sentence-final punctuation that is followed by
 * whitespace. Capitalization is never consulted, so scripts without case
 * (Hebrew, Arabic, Devanagari, CJK) segment the same way Latin text does.
 * CJK full-width terminators end a sentence even without a following space.
 * A bare line break is not a boundary; it is folded into the surrounding
 * sentence as a single space.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Terminal punctuation (plus any closing quotes or brackets) and the
/// whitespace that follows it
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"[.!?\x{2026}\x{05C3}\x{061F}\x{06D4}\x{0964}\x{0965}]+["'\x{201D}\x{2019}\x{00BB})\]]*\s+"#,
        r#"|[\x{3002}\x{FF01}\x{FF1F}]+["'\x{201D}\x{2019}\x{300D}\x{300F})\]]*\s*"#,
    ))
    .expect("sentence boundary pattern is valid")
});

/// One sentence of the input, 1-indexed in reading order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceSpan {
    /// Position in the source text, starting at 1
    pub index: usize,
    /// Trimmed sentence text with internal whitespace collapsed
    pub text: String,
}

/// Split text into ordered, non-empty sentence spans.
///
/// Empty or whitespace-only input yields an empty vector; callers treat that
/// as a validation failure.
pub fn split_sentences(text: &str) -> Vec<SentenceSpan> {
    let mut spans = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        push_span(&mut spans, &text[start..boundary.end()]);
        start = boundary.end();
    }
    push_span(&mut spans, &text[start..]);

    spans
}

/// Re-join spans the way the translation stage joins its output
pub fn join_sentences(spans: &[SentenceSpan]) -> String {
    spans
        .iter()
        .map(|span| span.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_span(spans: &mut Vec<SentenceSpan>, raw: &str) {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.is_empty() {
        spans.push(SentenceSpan {
            index: spans.len() + 1,
            text: normalized,
        });
    }
}
