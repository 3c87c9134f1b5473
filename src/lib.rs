//! Flight plan store - local persistence engine for the flight planning form
//!
//! Core modules:
//! - `persistence`: Record envelope, fingerprint, migration chain, validation
//! - `form`: Form surface contract, capture and apply
//! - `autosave`: Debounced save state machine and apply guard
//! - `transfer`: Export naming and auto-export bookkeeping
//! - `engine`: The engine instance tying it together
//! - `platform`: Browser/native platform abstraction

pub mod autosave;
pub mod engine;
pub mod error;
pub mod form;
pub mod persistence;
pub mod platform;
pub mod settings;
pub mod transfer;

pub use autosave::{ApplyGuard, Indicator, SaveState};
pub use engine::{Engine, ImportOutcome, LoadOutcome, SaveOutcome, StructuralAction};
pub use error::EngineError;
pub use persistence::{Fingerprint, MigrationChain, PlanningState};
pub use settings::EngineSettings;

/// Storage keys and schema constants
pub mod consts {
    /// Current schema version of the stored record
    pub const SCHEMA_VERSION: u32 = 2;

    /// Key of the persisted planning state
    pub const STATE_KEY: &str = "flightplan.state.v2";
    /// Older keys, read in order when `STATE_KEY` is empty. Never written.
    pub const LEGACY_STATE_KEYS: [&str; 2] = ["flightplan.state.v1", "flightplan.state"];

    /// Export sequence counter
    pub const EXPORT_COUNTER_KEY: &str = "flightplan.export.counter";
    /// Base name of the last automatic export
    pub const LAST_AUTO_EXPORT_KEY: &str = "flightplan.export.last_auto";
}
