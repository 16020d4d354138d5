//! Experimental procedures.
//!
//! The break-junction controller lives here, together with the session
//! outcome types and the cooperative abort flag shared with whatever front
//! end is driving the session.

pub mod break_junction;

pub use break_junction::{BreakJunctionController, SessionReport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a session ended. All of these are expected terminations, reported as
/// values rather than errors; only hardware or storage failures surface as
/// `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Estimated resistance reached the configured target.
    TargetReached,
    /// A fit produced a negative slope; the measurement is invalid.
    NegativeSlope,
    /// A break was detected on a prior ramp and confirmed by the re-probe.
    CurrentDropped,
    /// The external abort flag was raised.
    Aborted,
}

impl SessionOutcome {
    /// Human-readable termination message.
    pub fn message(self) -> &'static str {
        match self {
            SessionOutcome::TargetReached => "resistance reached desired resistance",
            SessionOutcome::NegativeSlope => "slope was negative",
            SessionOutcome::CurrentDropped => "current dropped",
            SessionOutcome::Aborted => "Aborted",
        }
    }

    /// Short label for artifact file names.
    pub fn label(self) -> &'static str {
        match self {
            SessionOutcome::TargetReached => "target_reached",
            SessionOutcome::NegativeSlope => "negative_slope",
            SessionOutcome::CurrentDropped => "current_dropped",
            SessionOutcome::Aborted => "aborted",
        }
    }
}

/// A shared flag for cooperatively cancelling a running session.
///
/// The controller checks it at the start of each probe and at every ramp
/// step; in-flight hardware calls are never interrupted.
#[derive(Clone)]
pub struct AbortFlag {
    flag: Arc<AtomicBool>,
    reason: Arc<std::sync::RwLock<Option<String>>>,
}

impl Default for AbortFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortFlag {
    /// Create a new, untriggered flag.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    /// Request cancellation.
    pub fn trigger(&self, reason: impl Into<String>) {
        self.flag.store(true, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.write() {
            *r = Some(reason.into());
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The reason passed to [`AbortFlag::trigger`], if any.
    pub fn reason(&self) -> Option<String> {
        self.reason.read().ok().and_then(|r| r.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_flag_roundtrip() {
        let flag = AbortFlag::new();
        assert!(!flag.is_triggered());
        assert_eq!(flag.reason(), None);

        let clone = flag.clone();
        clone.trigger("operator stop");
        assert!(flag.is_triggered());
        assert_eq!(flag.reason().as_deref(), Some("operator stop"));
    }

    #[test]
    fn outcome_messages_are_stable() {
        assert_eq!(
            SessionOutcome::TargetReached.message(),
            "resistance reached desired resistance"
        );
        assert_eq!(SessionOutcome::NegativeSlope.message(), "slope was negative");
        assert_eq!(SessionOutcome::CurrentDropped.message(), "current dropped");
        assert_eq!(SessionOutcome::Aborted.message(), "Aborted");
    }
}
