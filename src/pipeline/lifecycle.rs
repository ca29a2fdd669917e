use log::{debug, error};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Phases of one summary request.
///
/// `Generating` covers back-translations that run while generation is still
/// streaming; `BackTranslating` is entered only when generation has ended and
/// back-translations are still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    Pending,
    Translating,
    Generating,
    BackTranslating,
    Done,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow this phase
    pub fn can_advance_to(&self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Translating)
            | (Translating, Generating)
            | (Generating, BackTranslating)
            | (Generating, Done)
            | (BackTranslating, Done) => true,
            _ => false,
        }
    }
}

/// Tracks the phase of one request and logs every transition
#[derive(Debug)]
pub struct Lifecycle {
    request_id: String,
    phase: RequestPhase,
    started: Instant,
    phase_started: Instant,
}

impl Lifecycle {
    pub fn new(request_id: &str) -> Self {
        let now = Instant::now();
        Self {
            request_id: request_id.to_string(),
            phase: RequestPhase::Pending,
            started: now,
            phase_started: now,
        }
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Time since the request was accepted
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`; illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: RequestPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            error!(
                "[{}] Ignoring illegal phase transition {:?} -> {:?}",
                self.request_id, self.phase, next
            );
            return false;
        }

        debug!(
            "[{}] {:?} -> {:?} after {} ms",
            self.request_id,
            self.phase,
            next,
            self.phase_started.elapsed().as_millis()
        );
        self.phase = next;
        self.phase_started = Instant::now();
        true
    }

    /// Shorthand for moving to `Failed`
    pub fn fail(&mut self) -> bool {
        self.advance(RequestPhase::Failed)
    }
}
