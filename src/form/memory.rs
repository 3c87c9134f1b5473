//! In-memory form surface
//!
//! Stands in for the DOM on native builds and in tests. Fields can be removed
//! to mimic a partially rendered page, and "option-pending" fields drop writes
//! the way a select does before its options have been loaded.

use std::collections::{BTreeMap, BTreeSet};

use super::{FieldId, FieldReader, FieldValue, FieldWriter, FormLayout};

#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    values: BTreeMap<FieldId, FieldValue>,
    disabled: BTreeSet<FieldId>,
    pending_options: BTreeSet<FieldId>,
    notified: Vec<FieldId>,
}

impl MemorySurface {
    /// Surface with no elements at all
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface with every field of `layout` present and blank
    pub fn with_layout(layout: &FormLayout) -> Self {
        let mut surface = Self::new();
        for field in layout.fields() {
            let initial = match field {
                FieldId::LegToggle(_) => FieldValue::Flag(true),
                FieldId::FuelToggle(_) => FieldValue::Flag(false),
                _ => FieldValue::text(""),
            };
            surface.values.insert(field, initial);
        }
        surface
    }

    /// Simulate the user typing into a field (no notifications recorded)
    pub fn set(&mut self, field: &FieldId, value: FieldValue) {
        self.values.insert(field.clone(), value);
    }

    /// Take an element off the page
    pub fn remove(&mut self, field: &FieldId) {
        self.values.remove(field);
        self.disabled.remove(field);
    }

    pub fn is_disabled(&self, field: &FieldId) -> bool {
        self.disabled.contains(field)
    }

    /// Writes to `field` are silently dropped until [`populate_options`](Self::populate_options)
    pub fn defer_options(&mut self, field: &FieldId) {
        self.pending_options.insert(field.clone());
    }

    pub fn populate_options(&mut self, field: &FieldId) {
        self.pending_options.remove(field);
    }

    /// Fields whose writes fired change notifications, in order
    pub fn notifications(&self) -> &[FieldId] {
        &self.notified
    }
}

impl FieldReader for MemorySurface {
    fn read(&self, field: &FieldId) -> Option<FieldValue> {
        self.values.get(field).cloned()
    }
}

impl FieldWriter for MemorySurface {
    fn write(&mut self, field: &FieldId, value: &FieldValue, notify: bool) -> bool {
        let Some(slot) = self.values.get_mut(field) else {
            return false;
        };
        // A select without options keeps its old value
        if !self.pending_options.contains(field) {
            *slot = value.clone();
        }
        if notify {
            self.notified.push(field.clone());
        }
        true
    }

    fn set_disabled(&mut self, field: &FieldId, disabled: bool) {
        if !self.values.contains_key(field) {
            return;
        }
        if disabled {
            self.disabled.insert(field.clone());
        } else {
            self.disabled.remove(field);
        }
    }
}
