//! Per-attach-cycle playback phase.
//!
//! One [`AttachPhase`] lives in each stream controller. Transitions are an
//! explicit table over ([`AttachPhase`], [`PhaseTrigger`]); pairs not listed
//! leave the phase unchanged.

use serde::{Deserialize, Serialize};

/// Lifecycle of one attach cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachPhase {
    /// Not attached to the element.
    Idle,
    /// Source set, waiting for a ready signal.
    Loading,
    /// Ready signal received.
    Playing,
    /// A recovery attempt is scheduled.
    Recovering,
    /// Retry budget spent or unrecoverable error. Terminal for this cycle.
    Failed,
}

/// Inputs to the phase table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTrigger {
    /// Controller attached to the element.
    Attach,
    /// Ready signal: `canplay`, manifest parsed, fragment or buffer appended.
    Ready,
    /// Load-level fault; `retry_allowed` is the load handler's verdict.
    Fault { retry_allowed: bool },
    /// A scheduled recovery ran and loading restarted.
    RetryFired,
    /// Error class with no recovery path.
    Unrecoverable,
    /// Controller detached.
    Detach,
}

impl AttachPhase {
    /// Applies `trigger` and returns the resulting phase.
    #[must_use]
    pub fn next(self, trigger: PhaseTrigger) -> Self {
        use {AttachPhase::*, PhaseTrigger::*};

        match (self, trigger) {
            (_, Detach) => Idle,
            (Failed, _) => Failed,
            (Idle, Attach) => Loading,
            (Loading | Playing | Recovering, Ready) => Playing,
            (Loading | Playing, Fault { retry_allowed: true }) => Recovering,
            (Loading | Playing | Recovering, Fault { retry_allowed: false }) => Failed,
            (Recovering | Playing, RetryFired) => Loading,
            (_, Unrecoverable) => Failed,
            (phase, _) => phase,
        }
    }

    /// Whether this cycle has ended in failure.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == AttachPhase::Failed
    }
}

#[cfg(test)]
mod tests {
    use crate::playback::phase::{AttachPhase, PhaseTrigger};

    #[test]
    fn test_happy_path() {
        let phase = AttachPhase::Idle
            .next(PhaseTrigger::Attach)
            .next(PhaseTrigger::Ready);
        assert_eq!(phase, AttachPhase::Playing);
    }

    #[test]
    fn test_recovery_cycles_back_to_loading() {
        let phase = AttachPhase::Loading.next(PhaseTrigger::Fault {
            retry_allowed: true,
        });
        assert_eq!(phase, AttachPhase::Recovering);
        assert_eq!(phase.next(PhaseTrigger::RetryFired), AttachPhase::Loading);
        assert_eq!(phase.next(PhaseTrigger::Ready), AttachPhase::Playing);
    }

    #[test]
    fn test_exhausted_fault_is_terminal() {
        let phase = AttachPhase::Loading.next(PhaseTrigger::Fault {
            retry_allowed: false,
        });
        assert!(phase.is_terminal());
        assert_eq!(phase.next(PhaseTrigger::Ready), AttachPhase::Failed);
        assert_eq!(phase.next(PhaseTrigger::Attach), AttachPhase::Failed);
        assert_eq!(phase.next(PhaseTrigger::Detach), AttachPhase::Idle);
    }

    #[test]
    fn test_unlisted_pairs_are_ignored() {
        assert_eq!(
            AttachPhase::Idle.next(PhaseTrigger::Ready),
            AttachPhase::Idle
        );
        assert_eq!(
            AttachPhase::Recovering.next(PhaseTrigger::Fault {
                retry_allowed: true
            }),
            AttachPhase::Recovering
        );
        assert_eq!(
            AttachPhase::Idle.next(PhaseTrigger::Unrecoverable),
            AttachPhase::Failed
        );
    }
}
