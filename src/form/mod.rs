//! Form surface contract
//!
//! The engine reads and writes the planning form through [`FieldReader`] and
//! [`FieldWriter`], addressing fields by [`FieldId`]. The DOM implementation
//! lives in `platform::dom`; [`MemorySurface`] backs the native build and tests.

pub mod apply;
pub mod capture;
pub mod layout;
pub mod memory;

pub use apply::{ApplyReport, apply};
pub use capture::capture;
pub use layout::FormLayout;
pub use memory::MemorySurface;

use crate::persistence::LegRecord;

/// Text slots of a leg row, in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LegSlot {
    DepartureTime,
    ArrivalTime,
    Origin,
    Destination,
    Alternate1,
    Alternate2,
}

impl LegSlot {
    pub const ALL: [LegSlot; 6] = [
        LegSlot::DepartureTime,
        LegSlot::ArrivalTime,
        LegSlot::Origin,
        LegSlot::Destination,
        LegSlot::Alternate1,
        LegSlot::Alternate2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LegSlot::DepartureTime => "dep",
            LegSlot::ArrivalTime => "arr",
            LegSlot::Origin => "from",
            LegSlot::Destination => "to",
            LegSlot::Alternate1 => "alt1",
            LegSlot::Alternate2 => "alt2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        LegSlot::ALL.into_iter().find(|slot| slot.as_str() == s)
    }

    pub fn get<'a>(&self, leg: &'a LegRecord) -> &'a str {
        match self {
            LegSlot::DepartureTime => &leg.departure_time,
            LegSlot::ArrivalTime => &leg.arrival_time,
            LegSlot::Origin => &leg.origin_code,
            LegSlot::Destination => &leg.destination_code,
            LegSlot::Alternate1 => &leg.alternate1,
            LegSlot::Alternate2 => &leg.alternate2,
        }
    }

    pub fn get_mut<'a>(&self, leg: &'a mut LegRecord) -> &'a mut String {
        match self {
            LegSlot::DepartureTime => &mut leg.departure_time,
            LegSlot::ArrivalTime => &mut leg.arrival_time,
            LegSlot::Origin => &mut leg.origin_code,
            LegSlot::Destination => &mut leg.destination_code,
            LegSlot::Alternate1 => &mut leg.alternate1,
            LegSlot::Alternate2 => &mut leg.alternate2,
        }
    }
}

/// Logical form field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldId {
    Date,
    PrimaryAircraft,
    SecondaryAircraft,
    /// Text slot of leg `leg` (1-based)
    Leg { leg: usize, slot: LegSlot },
    /// Activation button of leg `leg` (2..N)
    LegToggle(usize),
    Fuel(String),
    FuelToggle(String),
}

impl FieldId {
    /// Element id in the planning page
    pub fn dom_id(&self) -> String {
        match self {
            FieldId::Date => "flight-date".to_string(),
            FieldId::PrimaryAircraft => "aircraft-primary".to_string(),
            FieldId::SecondaryAircraft => "aircraft-secondary".to_string(),
            FieldId::Leg { leg, slot } => format!("leg{}-{}", leg, slot.as_str()),
            FieldId::LegToggle(leg) => format!("leg{}-toggle", leg),
            FieldId::Fuel(name) => format!("fuel-{}", name),
            FieldId::FuelToggle(name) => format!("fuel-toggle-{}", name),
        }
    }

    /// Inverse of [`dom_id`](Self::dom_id); `None` for ids outside the planning form
    pub fn from_dom_id(id: &str) -> Option<Self> {
        match id {
            "flight-date" => return Some(FieldId::Date),
            "aircraft-primary" => return Some(FieldId::PrimaryAircraft),
            "aircraft-secondary" => return Some(FieldId::SecondaryAircraft),
            _ => {}
        }
        if let Some(name) = id.strip_prefix("fuel-toggle-") {
            return (!name.is_empty()).then(|| FieldId::FuelToggle(name.to_string()));
        }
        if let Some(name) = id.strip_prefix("fuel-") {
            return (!name.is_empty()).then(|| FieldId::Fuel(name.to_string()));
        }

        // leg<digits>-<slot> or leg<digits>-toggle
        let (number, rest) = id.strip_prefix("leg")?.split_once('-')?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let leg: usize = number.parse().ok()?;
        if leg == 0 {
            return None;
        }
        match rest {
            "toggle" => Some(FieldId::LegToggle(leg)),
            slot => LegSlot::parse(slot).map(|slot| FieldId::Leg { leg, slot }),
        }
    }

    /// Toggle-style fields carry [`FieldValue::Flag`]
    pub fn is_toggle(&self) -> bool {
        matches!(self, FieldId::LegToggle(_) | FieldId::FuelToggle(_))
    }
}

/// Value read from / written to a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn into_text(self) -> String {
        match self {
            FieldValue::Text(s) => s,
            FieldValue::Flag(b) => b.to_string(),
        }
    }

    pub fn as_flag(&self) -> bool {
        match self {
            FieldValue::Flag(b) => *b,
            FieldValue::Text(s) => matches!(s.as_str(), "true" | "on" | "1" | "active"),
        }
    }
}

/// Read side of the form
pub trait FieldReader {
    /// Current value, or `None` when the element is not on the page
    fn read(&self, field: &FieldId) -> Option<FieldValue>;
}

/// Write side of the form
pub trait FieldWriter {
    /// Set a value; `notify` fires the element's change notifications.
    /// Returns `false` when the element is not on the page.
    fn write(&mut self, field: &FieldId, value: &FieldValue, notify: bool) -> bool;

    /// Enable/disable an element (inactive legs disable their inputs)
    fn set_disabled(&mut self, field: &FieldId, disabled: bool);
}
