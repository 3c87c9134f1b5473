//! Write a planning state back into the form
//!
//! Writes go in the same positional order capture reads them. The caller is
//! responsible for raising the apply guard first: every write fires change
//! notifications so dependent widgets refresh.

use super::{FieldId, FieldValue, FieldWriter, FormLayout, LegSlot};
use crate::persistence::{LegRecord, PlanningState};

/// Counts of element writes that landed vs. found no element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: usize,
    pub missing: usize,
}

impl ApplyReport {
    fn record(&mut self, landed: bool) {
        if landed {
            self.written += 1;
        } else {
            self.missing += 1;
        }
    }
}

fn write_text<W: FieldWriter + ?Sized>(
    surface: &mut W,
    report: &mut ApplyReport,
    field: &FieldId,
    text: &str,
) {
    let landed = surface.write(field, &FieldValue::text(text), true);
    report.record(landed);
}

/// Push `state` into the form
pub fn apply<W: FieldWriter + ?Sized>(
    surface: &mut W,
    layout: &FormLayout,
    state: &PlanningState,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    let route = &state.route;

    write_text(surface, &mut report, &FieldId::Date, &route.head.date);
    write_text(
        surface,
        &mut report,
        &FieldId::PrimaryAircraft,
        &route.head.primary_aircraft,
    );
    write_text(
        surface,
        &mut report,
        &FieldId::SecondaryAircraft,
        &route.head.secondary_aircraft,
    );

    // Rows past the end of the stored legs are cleared so stale values don't survive
    let blank = LegRecord::default();
    let leg_count = layout.max_legs.max(route.legs.len());
    for leg in 1..=leg_count {
        let record = route.legs.get(leg - 1).unwrap_or(&blank);
        for slot in LegSlot::ALL {
            write_text(
                surface,
                &mut report,
                &FieldId::Leg { leg, slot },
                slot.get(record),
            );
        }
    }

    for leg in 2..=leg_count {
        let active = route.is_leg_active(leg);
        let toggle = FieldId::LegToggle(leg);
        let landed = surface.write(&toggle, &FieldValue::Flag(active), true);
        report.record(landed);
        if landed {
            for field in FormLayout::leg_fields(leg) {
                surface.set_disabled(&field, !active);
            }
        }
    }

    let extra_fields = state
        .fuel
        .fields
        .keys()
        .filter(|name| !layout.fuel_fields.contains(name));
    for name in layout.fuel_fields.iter().chain(extra_fields) {
        let text = state.fuel.fields.get(name).map(String::as_str).unwrap_or("");
        write_text(surface, &mut report, &FieldId::Fuel(name.clone()), text);
    }

    let extra_toggles = state
        .fuel
        .toggles
        .keys()
        .filter(|name| !layout.fuel_toggles.contains(name));
    for name in layout.fuel_toggles.iter().chain(extra_toggles) {
        let on = state.fuel.toggles.get(name).copied().unwrap_or(false);
        let landed = surface.write(&FieldId::FuelToggle(name.clone()), &FieldValue::Flag(on), true);
        report.record(landed);
    }

    report
}
