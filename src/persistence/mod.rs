//! Storage-shaped planning data
//!
//! Features:
//! - Versioned JSON envelope (`v`, `t`, `route`, `fuel`)
//! - Order-independent content fingerprint for change detection
//! - Migration chain from any older schema to the current one
//! - Shape validation and invariant repair on load/import

pub mod envelope;
pub mod fingerprint;
pub mod migration;
pub mod validation;

pub use envelope::{FuelPanel, LegActivation, LegRecord, PlanningState, Route, RouteHead};
pub use fingerprint::{Fingerprint, fingerprint, fingerprint_value};
pub use migration::{Migrated, MigrationChain, MigrationError};
pub use validation::{decode_record, normalize, parse_record};
