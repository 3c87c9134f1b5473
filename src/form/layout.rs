//! Which fields the planning page carries, in capture order

use serde::{Deserialize, Serialize};

use super::{FieldId, LegSlot};

/// Maximum number of route legs on the page
pub const DEFAULT_MAX_LEGS: usize = 4;

/// Form layout: leg count plus fuel panel field names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormLayout {
    pub max_legs: usize,
    /// Numeric/categorical fuel inputs
    pub fuel_fields: Vec<String>,
    /// Fuel checkboxes
    pub fuel_toggles: Vec<String>,
}

impl Default for FormLayout {
    fn default() -> Self {
        Self {
            max_legs: DEFAULT_MAX_LEGS,
            fuel_fields: [
                "taxi",
                "trip",
                "contingency",
                "alternate",
                "finalReserve",
                "additional",
                "extra",
                "unit",
                "policy",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            fuel_toggles: ["contingencyFivePercent", "extraAuto", "tankering"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl FormLayout {
    pub fn leg_fields(leg: usize) -> impl Iterator<Item = FieldId> {
        LegSlot::ALL
            .into_iter()
            .map(move |slot| FieldId::Leg { leg, slot })
    }

    /// Every field, in positional order: header, legs, leg toggles, fuel
    pub fn fields(&self) -> Vec<FieldId> {
        let mut out = vec![
            FieldId::Date,
            FieldId::PrimaryAircraft,
            FieldId::SecondaryAircraft,
        ];
        for leg in 1..=self.max_legs {
            out.extend(Self::leg_fields(leg));
        }
        out.extend((2..=self.max_legs).map(FieldId::LegToggle));
        out.extend(self.fuel_fields.iter().cloned().map(FieldId::Fuel));
        out.extend(self.fuel_toggles.iter().cloned().map(FieldId::FuelToggle));
        out
    }
}
