//! Engine settings
//!
//! Persisted separately from the planning state in LocalStorage.

use serde::{Deserialize, Serialize};

use crate::form::FormLayout;
use crate::transfer::ExportNaming;

/// Timing, layout and export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // === Timing (ms) ===
    /// Quiet period after the last edit before saving
    pub debounce_ms: f64,
    /// Delay for structural actions (leg toggles, clearing the form)
    pub structural_delay_ms: f64,
    /// Delay of the second apply pass after load/import
    pub reapply_delay_ms: f64,

    // === Form ===
    pub layout: FormLayout,

    // === Export ===
    pub export: ExportNaming,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300.0,
            structural_delay_ms: 0.0,
            reapply_delay_ms: 250.0,
            layout: FormLayout::default(),
            export: ExportNaming::default(),
        }
    }
}

impl EngineSettings {
    /// LocalStorage key
    #[cfg(target_arch = "wasm32")]
    const STORAGE_KEY: &'static str = "flightplan.settings";

    /// Parse stored settings; unknown fields are ignored, missing ones default
    pub fn from_json(json: &str) -> Option<Self> {
        match serde_json::from_str(json) {
            Ok(settings) => Some(settings),
            Err(e) => {
                log::warn!("Ignoring stored settings: {}", e);
                None
            }
        }
    }

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Some(settings) = Self::from_json(&json) {
                    log::info!("Loaded settings from LocalStorage");
                    return settings;
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Native build: defaults
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }
}
