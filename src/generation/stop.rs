/*!
 * Stop-marker detection over a fragmented text stream.
 *
 * Generators emit text in fragments whose boundaries are arbitrary, so the
 * stop marker can arrive split over two or more fragments. The detector keeps
 * a small retained buffer: the longest suffix of the text seen so far that is
 * still a proper prefix of the marker. Everything before that suffix is safe
 * to emit immediately. The buffer never grows past `marker.len() - 1` bytes.
 */

/// Result of feeding one fragment to the detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopScan {
    /// Clean text that can be emitted now
    Text(String),
    /// Nothing to emit yet; the tail may be the start of the marker
    Held,
    /// The marker was found; carries the clean text that preceded it (may be empty)
    Stopped(String),
    /// The marker was already found earlier; the fragment was ignored
    Finished,
}

/// Incremental scanner for a single stop marker
#[derive(Debug, Clone)]
pub struct StopSequenceDetector {
    marker: String,
    retained: String,
    stopped: bool,
}

impl StopSequenceDetector {
    /// Create a detector for `marker`, which must not be empty.
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        debug_assert!(!marker.is_empty(), "stop marker must not be empty");
        Self {
            marker,
            retained: String::new(),
            stopped: false,
        }
    }

    /// Feed the next fragment.
    pub fn push(&mut self, fragment: &str) -> StopScan {
        if self.stopped {
            return StopScan::Finished;
        }

        self.retained.push_str(fragment);

        if let Some(pos) = self.retained.find(&self.marker) {
            self.stopped = true;
            let mut clean = std::mem::take(&mut self.retained);
            clean.truncate(pos);
            return StopScan::Stopped(clean);
        }

        // Keep the partial match, hand back the rest
        let split = self.partial_match_start();
        let held = self.retained.split_off(split);
        let clean = std::mem::replace(&mut self.retained, held);

        if clean.is_empty() {
            StopScan::Held
        } else {
            StopScan::Text(clean)
        }
    }

    /// The stream ended without the marker: release whatever is retained.
    pub fn finish(&mut self) -> Option<String> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        let rest = std::mem::take(&mut self.retained);
        (!rest.is_empty()).then_some(rest)
    }

    /// Byte offset where the longest marker-prefix suffix of the buffer
    /// starts, or the buffer length when there is none.
    fn partial_match_start(&self) -> usize {
        let len = self.retained.len();
        let max_suffix = len.min(self.marker.len().saturating_sub(1));

        for suffix_len in (1..=max_suffix).rev() {
            let start = len - suffix_len;
            if !self.retained.is_char_boundary(start) {
                continue;
            }
            if self.marker.starts_with(&self.retained[start..]) {
                return start;
            }
        }
        len
    }
}
