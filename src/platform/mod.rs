//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Time (wall clock in milliseconds)
//! - Storage (LocalStorage on web, in-memory elsewhere)
//! - The DOM-backed form surface (web only)

#[cfg(target_arch = "wasm32")]
pub mod dom;
pub mod storage;
pub mod time;

pub use storage::{MemoryStorage, Storage, StorageError};
#[cfg(target_arch = "wasm32")]
pub use storage::LocalStorage;
