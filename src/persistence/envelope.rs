//! Persisted planning record
//!
//! Stored as JSON `{ "v": <schema>, "t": <ms>, "route": {...}, "fuel": {...} }`
//! under [`crate::consts::STATE_KEY`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consts::SCHEMA_VERSION;
use crate::error::{EngineError, Result};

/// Activation state of a leg (legs 2..N can be switched off)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegActivation {
    Active,
    Inactive,
}

impl LegActivation {
    pub fn from_active(active: bool) -> Self {
        if active {
            LegActivation::Active
        } else {
            LegActivation::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == LegActivation::Active
    }
}

/// Route header: date and aircraft selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteHead {
    #[serde(deserialize_with = "text::string")]
    pub date: String,
    #[serde(
        rename = "primaryAircraftRef",
        alias = "primaryAircraft",
        deserialize_with = "text::string"
    )]
    pub primary_aircraft: String,
    #[serde(
        rename = "secondaryAircraftRef",
        alias = "secondaryAircraft",
        deserialize_with = "text::string"
    )]
    pub secondary_aircraft: String,
}

/// One leg of the route, positional (`leg_number` = index + 1)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LegRecord {
    #[serde(deserialize_with = "text::index")]
    pub leg_number: usize,
    #[serde(deserialize_with = "text::string")]
    pub departure_time: String,
    #[serde(deserialize_with = "text::string")]
    pub arrival_time: String,
    #[serde(deserialize_with = "text::string")]
    pub origin_code: String,
    #[serde(deserialize_with = "text::string")]
    pub destination_code: String,
    #[serde(deserialize_with = "text::string")]
    pub alternate1: String,
    #[serde(deserialize_with = "text::string")]
    pub alternate2: String,
}

impl LegRecord {
    pub fn new(leg_number: usize) -> Self {
        Self {
            leg_number,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub head: RouteHead,
    pub legs: Vec<LegRecord>,
    /// Keyed by leg number; never contains leg 1
    pub toggles: BTreeMap<usize, LegActivation>,
}

impl Route {
    pub fn is_leg_active(&self, leg_number: usize) -> bool {
        leg_number == 1
            || self
                .toggles
                .get(&leg_number)
                .is_none_or(|t| t.is_active())
    }
}

/// Fuel panel: named text/numeric fields plus boolean toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelPanel {
    #[serde(deserialize_with = "text::string_map")]
    pub fields: BTreeMap<String, String>,
    pub toggles: BTreeMap<String, bool>,
}

/// The persisted unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningState {
    #[serde(rename = "v")]
    pub schema_version: u32,
    /// Capture time, Unix ms
    #[serde(rename = "t", default, deserialize_with = "text::millis")]
    pub timestamp: f64,
    #[serde(default)]
    pub route: Route,
    #[serde(default)]
    pub fuel: FuelPanel,
}

impl PlanningState {
    /// Empty state at the current schema version
    pub fn empty(timestamp: f64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            timestamp,
            route: Route {
                legs: vec![LegRecord::new(1)],
                ..Route::default()
            },
            fuel: FuelPanel::default(),
        }
    }

    /// Decode from an already-migrated JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(EngineError::Shape)
    }

    pub fn to_value(&self) -> Value {
        // Every field is a string, bool, integer or finite float, so this cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Encode for storage / export
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(EngineError::Json)
    }

    /// JSON value minus the capture time; this is what the fingerprint covers
    pub fn content_value(&self) -> Value {
        let mut value = self.to_value();
        if let Value::Object(map) = &mut value {
            map.remove("t");
        }
        value
    }
}

/// Lenient leaf decoding: stored/imported files may carry `null` or numbers
/// where the form holds free text.
mod text {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn leaf_to_string(value: Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
        Value::deserialize(de).map(leaf_to_string)
    }

    pub fn index<'de, D: Deserializer<'de>>(de: D) -> Result<usize, D::Error> {
        let value = Value::deserialize(de)?;
        Ok(match value {
            Value::Number(n) => n.as_u64().unwrap_or(0) as usize,
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        })
    }

    /// Capture time; only metadata, so an unreadable value becomes 0
    pub fn millis<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(de)?;
        Ok(match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        })
    }

    pub fn string_map<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<BTreeMap<String, String>, D::Error> {
        let map = BTreeMap::<String, Value>::deserialize(de)?;
        Ok(map
            .into_iter()
            .map(|(k, v)| (k, leaf_to_string(v)))
            .collect())
    }
}
