//! DOM-backed form surface
//!
//! Fields are looked up by element id (see [`FieldId::dom_id`]). Text fields
//! may be inputs, selects or textareas; toggles are checkboxes or buttons
//! carrying an `active` class.

use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, EventInit, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

use crate::form::{FieldId, FieldReader, FieldValue, FieldWriter};

pub struct DomSurface {
    document: Document,
}

impl DomSurface {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn element(&self, field: &FieldId) -> Option<Element> {
        self.document.get_element_by_id(&field.dom_id())
    }
}

fn read_text(el: &Element) -> String {
    if let Some(input) = el.dyn_ref::<HtmlInputElement>() {
        input.value()
    } else if let Some(select) = el.dyn_ref::<HtmlSelectElement>() {
        select.value()
    } else if let Some(area) = el.dyn_ref::<HtmlTextAreaElement>() {
        area.value()
    } else {
        el.text_content().unwrap_or_default()
    }
}

fn write_text(el: &Element, text: &str) {
    if let Some(input) = el.dyn_ref::<HtmlInputElement>() {
        input.set_value(text);
    } else if let Some(select) = el.dyn_ref::<HtmlSelectElement>() {
        // Silently keeps the old value if the option isn't there yet
        select.set_value(text);
    } else if let Some(area) = el.dyn_ref::<HtmlTextAreaElement>() {
        area.set_value(text);
    } else {
        el.set_text_content(Some(text));
    }
}

fn read_flag(el: &Element) -> bool {
    match el.dyn_ref::<HtmlInputElement>() {
        Some(input) if input.type_() == "checkbox" => input.checked(),
        _ => el.class_list().contains("active"),
    }
}

fn write_flag(el: &Element, on: bool) {
    match el.dyn_ref::<HtmlInputElement>() {
        Some(input) if input.type_() == "checkbox" => input.set_checked(on),
        _ => {
            let _ = el.class_list().toggle_with_force("active", on);
            let _ = el.set_attribute("aria-pressed", if on { "true" } else { "false" });
        }
    }
}

fn dispatch(el: &Element, kind: &str) {
    let init = EventInit::new();
    init.set_bubbles(true);
    if let Ok(event) = Event::new_with_event_init_dict(kind, &init) {
        let _ = el.dispatch_event(&event);
    }
}

impl FieldReader for DomSurface {
    fn read(&self, field: &FieldId) -> Option<FieldValue> {
        let el = self.element(field)?;
        Some(if field.is_toggle() {
            FieldValue::Flag(read_flag(&el))
        } else {
            FieldValue::Text(read_text(&el))
        })
    }
}

impl FieldWriter for DomSurface {
    fn write(&mut self, field: &FieldId, value: &FieldValue, notify: bool) -> bool {
        let Some(el) = self.element(field) else {
            return false;
        };
        match value {
            FieldValue::Flag(on) if field.is_toggle() => write_flag(&el, *on),
            other => write_text(&el, &other.clone().into_text()),
        }
        if notify {
            // Listeners fire synchronously here; the engine's apply guard is already raised
            dispatch(&el, "input");
            dispatch(&el, "change");
        }
        true
    }

    fn set_disabled(&mut self, field: &FieldId, disabled: bool) {
        let Some(el) = self.element(field) else {
            return;
        };
        if let Some(input) = el.dyn_ref::<HtmlInputElement>() {
            input.set_disabled(disabled);
        } else if let Some(select) = el.dyn_ref::<HtmlSelectElement>() {
            select.set_disabled(disabled);
        } else if let Some(area) = el.dyn_ref::<HtmlTextAreaElement>() {
            area.set_disabled(disabled);
        } else if disabled {
            let _ = el.set_attribute("disabled", "");
        } else {
            let _ = el.remove_attribute("disabled");
        }
    }
}
