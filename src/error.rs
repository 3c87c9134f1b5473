//! Error taxonomy for the persistence engine
//!
//! - Malformed input (bad JSON, wrong top-level shape): recoverable, store untouched
//! - Migration gaps: fatal for the load/import that hit them
//! - Storage failures: surfaced once, retried by the next edit

use crate::persistence::migration::MigrationError;
use crate::platform::storage::StorageError;

/// Errors returned by engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("top level is not a JSON object")]
    NotAnObject,
    #[error("planning data has an unexpected shape: {0}")]
    Shape(#[source] serde_json::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("nothing has been saved yet")]
    NothingToExport,
}

impl EngineError {
    /// Migration gaps abort the operation; everything else is reported and recovered from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Migration(_))
    }

    /// Short message for the status line / alert box
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Json(_) | EngineError::NotAnObject | EngineError::Shape(_) => {
                format!("Could not read planning file: {}", self)
            }
            EngineError::Migration(e) => format!("Unsupported planning data: {}", e),
            EngineError::Storage(e) => format!("Browser storage failed: {}", e),
            EngineError::NothingToExport => "Nothing to export yet".to_string(),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
