use serde::Serialize;

use crate::prompts::BULLET_GLYPH;

/// Glyphs accepted at the start of a bullet; models do not always use `•`
const BULLET_MARKERS: [char; 4] = [BULLET_GLYPH, '-', '*', '\u{2013}'];

/// Number of bullets a summary is made of
pub const SUMMARY_BULLETS: usize = 5;

/// One completed summary line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulletLine {
    /// 1-based position within the summary
    pub index: usize,
    /// Trimmed line, glyph included
    pub text: String,
}

/// Whether a trimmed line starts with a bullet glyph
pub fn is_bullet_line(line: &str) -> bool {
    line.trim_start().starts_with(BULLET_MARKERS)
}

/// Collects clean generated text and hands out bullets once their line is complete.
///
/// A line is complete when its newline arrives or the stream ends. Preamble
/// lines without a glyph are dropped, and anything past the fifth bullet is
/// ignored.
#[derive(Debug, Clone)]
pub struct BulletAssembler {
    pending: String,
    promoted: usize,
    max_bullets: usize,
}

impl Default for BulletAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl BulletAssembler {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            promoted: 0,
            max_bullets: SUMMARY_BULLETS,
        }
    }

    /// Feed clean text; returns the bullets completed by it, in order.
    pub fn push(&mut self, text: &str) -> Vec<BulletLine> {
        self.pending.push_str(text);

        let mut ready = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            if let Some(bullet) = self.promote(&line) {
                ready.push(bullet);
            }
        }
        ready
    }

    /// The stream ended: the unterminated last line counts as complete.
    pub fn finish(&mut self) -> Option<BulletLine> {
        let line = std::mem::take(&mut self.pending);
        self.promote(&line)
    }

    /// Bullets handed out so far
    pub fn count(&self) -> usize {
        self.promoted
    }

    pub fn is_full(&self) -> bool {
        self.promoted >= self.max_bullets
    }

    fn promote(&mut self, line: &str) -> Option<BulletLine> {
        let line = line.trim();
        if line.is_empty() || self.is_full() || !is_bullet_line(line) {
            return None;
        }
        self.promoted += 1;
        Some(BulletLine {
            index: self.promoted,
            text: line.to_string(),
        })
    }
}
