//! Export file naming and auto-export bookkeeping
//!
//! Export names are `<date>_<callsign>.json` for the first export and
//! `<date>_<callsign> (<n>).json` afterwards, with `n` taken from a counter
//! kept in storage so repeated exports never collide.

use serde::{Deserialize, Serialize};

use crate::consts::{EXPORT_COUNTER_KEY, LAST_AUTO_EXPORT_KEY};
use crate::error::Result;
use crate::persistence::PlanningState;
use crate::platform::Storage;

/// Limits for export file names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportNaming {
    pub date_token_len: usize,
    pub callsign_token_len: usize,
    /// Used when both tokens sanitize to nothing
    pub fallback_base: String,
}

impl Default for ExportNaming {
    fn default() -> Self {
        Self {
            date_token_len: 10,
            callsign_token_len: 12,
            fallback_base: "flightplan".to_string(),
        }
    }
}

/// A file ready to hand to the browser download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub contents: String,
}

/// Keep `[A-Za-z0-9_-]`, turn separators into `-`, cap at `max_len` chars
pub fn sanitize_token(raw: &str, max_len: usize) -> String {
    let mapped: String = raw
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            ' ' | '.' | '/' | ':' | '\\' => Some('-'),
            _ => None,
        })
        .collect();
    mapped
        .trim_matches('-')
        .chars()
        .take(max_len)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Base file name (no extension) for a planning state
pub fn base_name(state: &PlanningState, naming: &ExportNaming) -> String {
    let date = sanitize_token(&state.route.head.date, naming.date_token_len);
    let callsign = sanitize_token(&state.route.head.primary_aircraft, naming.callsign_token_len);
    let parts: Vec<&str> = [date.as_str(), callsign.as_str()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        naming.fallback_base.clone()
    } else {
        parts.join("_")
    }
}

/// `base.json` for sequence 0, `base (n).json` after that
pub fn file_name(base: &str, sequence: u32) -> String {
    if sequence == 0 {
        format!("{}.json", base)
    } else {
        format!("{} ({}).json", base, sequence)
    }
}

fn read_counter<S: Storage + ?Sized>(storage: &S) -> Result<u32> {
    Ok(storage
        .get(EXPORT_COUNTER_KEY)?
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0))
}

/// Reserve the next export name and advance the stored counter
pub fn next_file_name<S: Storage + ?Sized>(storage: &mut S, base: &str) -> Result<String> {
    let sequence = read_counter(storage)?;
    storage.set(EXPORT_COUNTER_KEY, &sequence.saturating_add(1).to_string())?;
    Ok(file_name(base, sequence))
}

/// Whether `base` was the last automatically exported name
pub fn is_last_auto_export<S: Storage + ?Sized>(storage: &S, base: &str) -> Result<bool> {
    Ok(storage.get(LAST_AUTO_EXPORT_KEY)?.as_deref() == Some(base))
}

pub fn remember_auto_export<S: Storage + ?Sized>(storage: &mut S, base: &str) -> Result<()> {
    storage.set(LAST_AUTO_EXPORT_KEY, base)?;
    Ok(())
}
