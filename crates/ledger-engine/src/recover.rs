//! Recovery configuration and outcome reporting.

use std::time::Duration;

/// Default staleness window (spec §4.3): "The staleness threshold (default 30
/// seconds) prevents recovery from racing a live committer."
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(30);

/// Configuration for [`crate::Ledger::recover`].
///
/// The staleness window is not a correctness requirement (spec §5): setting it
/// to zero must not violate any invariant, it only controls how eager recovery
/// is about picking up work a live committer might still be driving.
#[derive(Debug, Clone, Copy)]
pub struct RecoverConfig {
    /// Minimum age of a non-terminal transaction's `updated_at` before Recover
    /// will touch it.
    pub staleness: Duration,
}

impl Default for RecoverConfig {
    fn default() -> Self {
        RecoverConfig {
            staleness: DEFAULT_STALENESS,
        }
    }
}

impl RecoverConfig {
    /// A recover config with no staleness window at all: every non-Initial,
    /// non-Done transaction is immediately eligible. Useful for tests and for
    /// recovery sweeps that run only after the committer population is known
    /// to be quiescent.
    pub fn immediate() -> Self {
        RecoverConfig {
            staleness: Duration::ZERO,
        }
    }
}

/// How many stuck transactions a single [`crate::Ledger::recover`] call
/// actually advanced. Spec §4.3: "each invocation advances at most one stuck
/// transaction per phase", so this is 0, 1 (one phase acted) or 2 (both did).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverOutcome {
    /// Whether a stale `Pending` transaction was found and driven to `Done`.
    pub pending_recovered: bool,
    /// Whether a stale `Applied` transaction was found and driven to `Done`.
    pub applied_recovered: bool,
}

impl RecoverOutcome {
    /// Total number of transactions this call advanced.
    pub fn advanced_count(&self) -> usize {
        usize::from(self.pending_recovered) + usize::from(self.applied_recovered)
    }

    /// Whether this call found nothing to do at all.
    pub fn is_dry(&self) -> bool {
        self.advanced_count() == 0
    }
}
