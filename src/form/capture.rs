//! Read the live form into a planning state
//!
//! Never touches storage. Missing elements read as empty values.

use super::{FieldId, FieldReader, FormLayout, LegSlot};
use crate::consts::SCHEMA_VERSION;
use crate::persistence::{FuelPanel, LegActivation, LegRecord, PlanningState, Route, RouteHead};

fn read_text<R: FieldReader + ?Sized>(surface: &R, field: &FieldId) -> String {
    surface
        .read(field)
        .map(|v| v.into_text())
        .unwrap_or_default()
}

/// Read one leg row; `None` when none of its elements exist
fn read_leg<R: FieldReader + ?Sized>(surface: &R, leg_number: usize) -> Option<LegRecord> {
    let mut record = LegRecord::new(leg_number);
    let mut present = false;
    for slot in LegSlot::ALL {
        if let Some(value) = surface.read(&FieldId::Leg {
            leg: leg_number,
            slot,
        }) {
            *slot.get_mut(&mut record) = value.into_text();
            present = true;
        }
    }
    present.then_some(record)
}

/// Snapshot the form at `now_ms`
pub fn capture<R: FieldReader + ?Sized>(
    surface: &R,
    layout: &FormLayout,
    now_ms: f64,
) -> PlanningState {
    let head = RouteHead {
        date: read_text(surface, &FieldId::Date),
        primary_aircraft: read_text(surface, &FieldId::PrimaryAircraft),
        secondary_aircraft: read_text(surface, &FieldId::SecondaryAircraft),
    };

    // Legs follow document order and stop at the first row not on the page.
    // Leg 1 is always recorded.
    let mut legs = Vec::with_capacity(layout.max_legs);
    for leg_number in 1..=layout.max_legs.max(1) {
        match read_leg(surface, leg_number) {
            Some(record) => legs.push(record),
            None if leg_number == 1 => legs.push(LegRecord::new(1)),
            None => break,
        }
    }

    let toggles = (2..=legs.len())
        .filter_map(|leg| {
            surface
                .read(&FieldId::LegToggle(leg))
                .map(|v| (leg, LegActivation::from_active(v.as_flag())))
        })
        .collect();

    let fields = layout
        .fuel_fields
        .iter()
        .map(|name| (name.clone(), read_text(surface, &FieldId::Fuel(name.clone()))))
        .collect();
    let fuel_toggles = layout
        .fuel_toggles
        .iter()
        .map(|name| {
            let on = surface
                .read(&FieldId::FuelToggle(name.clone()))
                .is_some_and(|v| v.as_flag());
            (name.clone(), on)
        })
        .collect();

    PlanningState {
        schema_version: SCHEMA_VERSION,
        timestamp: now_ms,
        route: Route {
            head,
            legs,
            toggles,
        },
        fuel: FuelPanel {
            fields,
            toggles: fuel_toggles,
        },
    }
}
