//! Autosave state machine and apply guard
//!
//! ```text
//! idle/saved/error --edit--> dirty --edit--> dirty (timer restarted)
//! dirty --timer--> saving --same fingerprint--> saved (no write)
//!                  saving --written----------> saved (baseline updated)
//!                  saving --write failed-----> error (baseline kept)
//! ```
//!
//! Edits are ignored while the [`ApplyGuard`] is raised.

use std::cell::Cell;
use std::rc::Rc;

use crate::persistence::Fingerprint;
use crate::platform::StorageError;

/// Shared flag raised while a snapshot is being written into the form.
///
/// Cloned into host event listeners so they can bail out without borrowing
/// the engine while it is mid-apply.
#[derive(Debug, Clone, Default)]
pub struct ApplyGuard(Rc<Cell<bool>>);

impl ApplyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.set(true);
    }

    pub fn lower(&self) {
        self.0.set(false);
    }

    pub fn is_raised(&self) -> bool {
        self.0.get()
    }
}

/// Autosave state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Dirty,
    Saving,
    Saved,
    Error,
}

/// Status line shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    None,
    UnsavedChanges,
    Saved,
    SaveFailed,
    Loaded,
}

impl Indicator {
    pub fn label(&self) -> &'static str {
        match self {
            Indicator::None => "",
            Indicator::UnsavedChanges => "unsaved changes",
            Indicator::Saved => "saved",
            Indicator::SaveFailed => "save failed",
            Indicator::Loaded => "loaded",
        }
    }
}

/// Debounced save scheduling with a single timer slot
#[derive(Debug)]
pub struct Scheduler {
    state: SaveState,
    indicator: Indicator,
    /// Deadline of the pending save (ms); a new edit replaces it
    pending: Option<f64>,
    /// Fingerprint of the last committed snapshot
    baseline: Option<Fingerprint>,
    last_error: Option<StorageError>,
    guard: ApplyGuard,
}

impl Scheduler {
    pub fn new(guard: ApplyGuard) -> Self {
        Self {
            state: SaveState::Idle,
            indicator: Indicator::None,
            pending: None,
            baseline: None,
            last_error: None,
            guard,
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    pub fn baseline(&self) -> Option<Fingerprint> {
        self.baseline
    }

    pub fn last_error(&self) -> Option<&StorageError> {
        self.last_error.as_ref()
    }

    pub fn pending_deadline(&self) -> Option<f64> {
        self.pending
    }

    /// Record an edit; the save fires `delay_ms` after the last one.
    /// Returns `false` when suppressed by the apply guard.
    pub fn note_edit(&mut self, now_ms: f64, delay_ms: f64) -> bool {
        if self.guard.is_raised() {
            log::debug!("Edit ignored while applying snapshot");
            return false;
        }
        self.pending = Some(now_ms + delay_ms.max(0.0));
        self.state = SaveState::Dirty;
        self.indicator = Indicator::UnsavedChanges;
        true
    }

    /// Drop any pending save without touching the state
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Claim the pending save if its deadline has passed
    pub fn begin_save(&mut self, now_ms: f64) -> bool {
        match self.pending {
            Some(deadline) if deadline <= now_ms => {
                self.pending = None;
                self.state = SaveState::Saving;
                true
            }
            _ => false,
        }
    }

    /// Whether a captured snapshot differs from what is stored
    pub fn is_changed(&self, fingerprint: Fingerprint) -> bool {
        self.baseline != Some(fingerprint)
    }

    pub fn finish_unchanged(&mut self) {
        self.state = SaveState::Saved;
        self.indicator = Indicator::Saved;
    }

    pub fn finish_written(&mut self, fingerprint: Fingerprint) {
        self.baseline = Some(fingerprint);
        self.last_error = None;
        self.state = SaveState::Saved;
        self.indicator = Indicator::Saved;
    }

    /// Baseline stays put so the next edit retries the write
    pub fn finish_failed(&mut self, err: StorageError) {
        self.last_error = Some(err);
        self.state = SaveState::Error;
        self.indicator = Indicator::SaveFailed;
    }

    /// A snapshot was committed/restored outside the edit path (load, import)
    pub fn mark_loaded(&mut self, fingerprint: Fingerprint) {
        self.baseline = Some(fingerprint);
        self.pending = None;
        self.last_error = None;
        self.state = SaveState::Idle;
        self.indicator = Indicator::Loaded;
    }

    /// Stored snapshot removed
    pub fn reset(&mut self) {
        self.baseline = None;
        self.pending = None;
        self.last_error = None;
        self.state = SaveState::Idle;
        self.indicator = Indicator::None;
    }

    /// Unsaved work would be lost by leaving the page
    pub fn has_unsaved_changes(&self) -> bool {
        matches!(self.state, SaveState::Dirty | SaveState::Error)
    }
}
