//! Freeze lifecycle for runtime values
//!
//! Freezing is irreversible: once a value reaches [`FreezeState::Frozen`],
//! every mutator rejects it permanently. The transition is driven by an
//! external orchestrator (it walks the value graph); this module only owns
//! the per-value status word and the atomic check-then-act contract that
//! mutators rely on.

use crate::error::{ValueError, ValueResult};
use parking_lot::{Mutex, MutexGuard};

/// Freeze lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeState {
    /// Mutable; the initial state
    Unfrozen,
    /// A freeze walk is underway; mutation is already rejected
    FreezeInProgress,
    /// Terminal: permanently immutable
    Frozen,
}

/// Shared freeze status word.
///
/// A mutex rather than an atomic because mutators must hold the status
/// stable for the duration of their write: [`FreezeStatus::guard_update`]
/// returns the held guard, so a freeze transition on another thread cannot
/// land between the check and the mutation it authorizes.
#[derive(Debug)]
pub struct FreezeStatus {
    state: Mutex<FreezeState>,
}

impl FreezeStatus {
    /// Create a new status in the `Unfrozen` state
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FreezeState::Unfrozen),
        }
    }

    /// Current state
    pub fn state(&self) -> FreezeState {
        *self.state.lock()
    }

    /// Whether the value is fully frozen
    pub fn is_frozen(&self) -> bool {
        self.state() == FreezeState::Frozen
    }

    /// Check that mutation is allowed and keep it allowed.
    ///
    /// On success the caller receives the held guard; keeping it alive for
    /// the duration of the write makes check-then-mutate a single critical
    /// section. Fails with [`ValueError::FrozenUpdate`] when the value is
    /// frozen or a freeze is in progress.
    pub fn guard_update(&self) -> ValueResult<MutexGuard<'_, FreezeState>> {
        let guard = self.state.lock();
        match *guard {
            FreezeState::Unfrozen => Ok(guard),
            FreezeState::FreezeInProgress | FreezeState::Frozen => Err(ValueError::FrozenUpdate),
        }
    }

    /// Mark a freeze walk as started.
    ///
    /// Returns whether the transition happened; an already frozen or
    /// in-progress value is left untouched.
    pub fn begin_freeze(&self) -> bool {
        let mut guard = self.state.lock();
        if *guard == FreezeState::Unfrozen {
            *guard = FreezeState::FreezeInProgress;
            true
        } else {
            false
        }
    }

    /// Complete an in-progress freeze (or freeze directly from `Unfrozen`)
    pub fn commit_freeze(&self) {
        *self.state.lock() = FreezeState::Frozen;
    }

    /// Roll back an in-progress freeze after a failed freeze walk.
    ///
    /// A fully frozen value stays frozen; freezing is irreversible.
    pub fn abort_freeze(&self) {
        let mut guard = self.state.lock();
        if *guard == FreezeState::FreezeInProgress {
            *guard = FreezeState::Unfrozen;
        }
    }
}

impl Default for FreezeStatus {
    fn default() -> Self {
        Self::new()
    }
}
