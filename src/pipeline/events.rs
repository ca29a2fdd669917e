/*!
 * Output events and their wire framings.
 *
 * The orchestrator produces a strictly ordered sequence of `OutputEvent`s.
 * The transport serializes them through an `EventWriter`, either as the
 * human-readable text framing or as one JSON object per line. JSON lines go
 * out as soon as they arrive; the text framing with back-translation holds
 * each bullet until its source-language line is known.
 */

use serde::Serialize;
use std::collections::VecDeque;

use crate::errors::{ErrorKind, PipelineError};
use crate::generation::StopReason;

/// One unit of a summary response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// The whole text in the pivot language
    TranslationPreview { text: String },
    /// Clean generated text, as soon as it is known not to be part of the marker
    GenerationChunk { text: String },
    /// A completed summary line
    BulletReady { index: usize, text: String },
    /// The source-language version of bullet `index`
    BackTranslatedReady { index: usize, text: String },
    /// A failure; `index` is set when it concerns a single bullet
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Last event of every stream the consumer is still reading
    Done { stop_reason: Option<StopReason> },
}

impl OutputEvent {
    pub fn error(err: &PipelineError, index: Option<usize>) -> Self {
        let index = match err {
            PipelineError::BackTranslationFailure { index, .. } => Some(*index),
            _ => index,
        };
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
            index,
        }
    }

    /// Snake-case event name, as used in the `type` field
    pub fn name(&self) -> &'static str {
        match self {
            Self::TranslationPreview { .. } => "translation_preview",
            Self::GenerationChunk { .. } => "generation_chunk",
            Self::BulletReady { .. } => "bullet_ready",
            Self::BackTranslatedReady { .. } => "back_translated_ready",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }
}

/// Line separating the translation preview from the generated summary
pub fn generation_divider() -> String {
    format!("\n{} GENERATION {}\n", "-".repeat(50), "-".repeat(50))
}

/// How events are written to the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Plain text for humans and `curl`
    Text { back_translate: bool },
    /// One JSON object per line
    Ndjson,
}

impl Framing {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text/plain; charset=utf-8",
            Self::Ndjson => "application/x-ndjson",
        }
    }

    /// A writer for one response body
    pub fn writer(self) -> EventWriter {
        EventWriter {
            framing: self,
            held: VecDeque::new(),
        }
    }
}

/// Text waiting to be written, in output order
#[derive(Debug)]
enum Held {
    Ready(String),
    Bullet {
        index: usize,
        line: String,
        follow: Option<String>,
    },
}

/// Stateful renderer for one response stream.
///
/// Back-translations finish in any order and may trail later bullets, so in
/// the paired text layout a bullet and everything after it are held until the
/// bullet's back-translation (or its error) arrives.
#[derive(Debug)]
pub struct EventWriter {
    framing: Framing,
    held: VecDeque<Held>,
}

impl EventWriter {
    /// Bytes to write after `event`, or `None` if nothing can be written yet.
    pub fn write(&mut self, event: &OutputEvent) -> Option<String> {
        match self.framing {
            Framing::Ndjson => Some(render_ndjson(event)),
            Framing::Text { back_translate: false } => render_text(event),
            Framing::Text { back_translate: true } => {
                self.hold(event);
                self.flush(matches!(event, OutputEvent::Done { .. }))
            }
        }
    }

    fn hold(&mut self, event: &OutputEvent) {
        match event {
            OutputEvent::GenerationChunk { .. } | OutputEvent::Done { .. } => {}
            OutputEvent::BulletReady { index, text } => self.held.push_back(Held::Bullet {
                index: *index,
                line: format!("{}\n", text),
                follow: None,
            }),
            OutputEvent::BackTranslatedReady { index, text } => self.settle(*index, format!("{}\n", text)),
            OutputEvent::Error {
                index: Some(index),
                kind,
                message,
            } => self.settle(*index, error_line(*kind, message)),
            other => {
                if let Some(text) = render_text(other) {
                    self.held.push_back(Held::Ready(text));
                }
            }
        }
    }

    fn settle(&mut self, index: usize, text: String) {
        let slot = self.held.iter_mut().find_map(|held| match held {
            Held::Bullet {
                index: i, follow, ..
            } if *i == index && follow.is_none() => Some(follow),
            _ => None,
        });
        match slot {
            Some(follow) => *follow = Some(text),
            // Its bullet was already written
            None => self.held.push_back(Held::Ready(text)),
        }
    }

    /// Write out the settled prefix; `all` also writes bullets still waiting.
    fn flush(&mut self, all: bool) -> Option<String> {
        let mut out = String::new();
        while let Some(front) = self.held.front() {
            if !all && matches!(front, Held::Bullet { follow: None, .. }) {
                break;
            }
            match self.held.pop_front() {
                Some(Held::Ready(text)) => out.push_str(&text),
                Some(Held::Bullet { line, follow, .. }) => {
                    out.push_str(&line);
                    if let Some(follow) = follow {
                        out.push_str(&follow);
                    }
                }
                None => break,
            }
        }
        (!out.is_empty()).then_some(out)
    }
}

fn error_line(kind: ErrorKind, message: &str) -> String {
    format!("\n[ERROR {}] {}\n", kind, message)
}

/// Text framing without back-translation: preview, divider, then the live
/// summary text.
fn render_text(event: &OutputEvent) -> Option<String> {
    match event {
        OutputEvent::TranslationPreview { text } => Some(format!("TRANSLATION: {}\n{}", text, generation_divider())),
        OutputEvent::GenerationChunk { text } => Some(text.clone()),
        OutputEvent::BulletReady { .. } | OutputEvent::BackTranslatedReady { .. } => None,
        OutputEvent::Error { kind, message, .. } => Some(error_line(*kind, message)),
        OutputEvent::Done { .. } => None,
    }
}

fn render_ndjson(event: &OutputEvent) -> String {
    match serde_json::to_string(event) {
        Ok(mut line) => {
            line.push('\n');
            line
        }
        // Only string and integer fields; kept so a bad event cannot kill the stream
        Err(e) => format!("{{\"type\":\"error\",\"kind\":\"generation_failure\",\"message\":\"{}\"}}\n", e),
    }
}
