//! Shape checks and invariant repair for decoded records

use serde_json::Value;

use super::envelope::{LegRecord, PlanningState};
use super::migration::{Migrated, MigrationChain};
use crate::error::{EngineError, Result};

/// Parse text into a JSON object, rejecting anything else at the top level
pub fn parse_record(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).map_err(EngineError::Json)?;
    if !value.is_object() {
        return Err(EngineError::NotAnObject);
    }
    Ok(value)
}

/// Repair positional invariants after decoding
///
/// - at least one leg
/// - `leg_number` follows position
/// - toggles only for legs 2..=count (leg 1 is always active)
pub fn normalize(state: &mut PlanningState) {
    if state.route.legs.is_empty() {
        state.route.legs.push(LegRecord::new(1));
    }
    for (i, leg) in state.route.legs.iter_mut().enumerate() {
        leg.leg_number = i + 1;
    }
    let count = state.route.legs.len();
    state.route.toggles.retain(|&leg, _| (2..=count).contains(&leg));
}

/// Parse, migrate, decode and normalize raw stored/imported text
pub fn decode_record(chain: &MigrationChain, text: &str) -> Result<(PlanningState, u32)> {
    let raw = parse_record(text)?;
    let Migrated {
        from_version,
        value,
    } = chain.migrate(raw)?;
    let mut state = PlanningState::from_value(value)?;
    normalize(&mut state);
    Ok((state, from_version))
}
