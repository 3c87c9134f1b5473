//! Flight plan store entry point
//!
//! On the web this wires the persistence engine into the planning page:
//! edit listeners, timers, the status line, export/import/reset buttons and
//! unload protection. Natively it runs a short self-check.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_app {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use web_sys::{Blob, BlobPropertyBag, Document, Element, HtmlAnchorElement, HtmlInputElement, Url};

    use flightplan_store::form::FieldId;
    use flightplan_store::platform::LocalStorage;
    use flightplan_store::platform::dom::DomSurface;
    use flightplan_store::platform::time::now_ms;
    use flightplan_store::transfer::ExportFile;
    use flightplan_store::{ApplyGuard, Engine, EngineSettings, LoadOutcome, StructuralAction};

    type PlanEngine = Engine<DomSurface, LocalStorage>;

    /// Engine plus the host-side timer bookkeeping
    pub struct Host {
        engine: RefCell<PlanEngine>,
        guard: ApplyGuard,
        timer: Cell<Option<i32>>,
    }

    thread_local! {
        static HOST: RefCell<Option<Rc<Host>>> = const { RefCell::new(None) };
    }

    fn host() -> Option<Rc<Host>> {
        HOST.with(|h| h.borrow().clone())
    }

    fn document() -> Option<Document> {
        web_sys::window()?.document()
    }

    impl Host {
        /// Update the status line from the engine indicator
        fn refresh_status(&self) {
            let Ok(engine) = self.engine.try_borrow() else {
                return;
            };
            if let Some(el) = document().and_then(|d| d.get_element_by_id("save-status")) {
                el.set_text_content(Some(engine.indicator().label()));
                let _ = match engine.last_save_error() {
                    Some(e) => el.set_attribute("title", &e.to_string()),
                    None => el.remove_attribute("title"),
                };
            }
        }

        /// Arm the single host timer for the engine's next deadline
        fn schedule(self: &Rc<Self>) {
            let Some(window) = web_sys::window() else {
                return;
            };
            if let Some(id) = self.timer.take() {
                window.clear_timeout_with_handle(id);
            }
            let delay = match self.engine.try_borrow() {
                Ok(engine) => engine.next_wakeup(now_ms()),
                Err(_) => return,
            };
            let Some(delay) = delay else {
                return;
            };

            let host = self.clone();
            if delay <= 0.0 {
                // Microtask: runs after the current event dispatch has drained
                wasm_bindgen_futures::spawn_local(async move {
                    host.run_tick();
                });
            } else {
                let closure = Closure::once(move || {
                    host.timer.set(None);
                    host.run_tick();
                });
                if let Ok(id) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                    closure.as_ref().unchecked_ref(),
                    delay.ceil() as i32,
                ) {
                    self.timer.set(Some(id));
                }
                closure.forget();
            }
        }

        fn run_tick(self: &Rc<Self>) {
            if let Ok(mut engine) = self.engine.try_borrow_mut() {
                engine.tick(now_ms());
            }
            self.refresh_status();
            self.schedule();
        }

        fn field_changed(self: &Rc<Self>) {
            if self.guard.is_raised() {
                return;
            }
            if let Ok(mut engine) = self.engine.try_borrow_mut() {
                engine.on_field_changed(now_ms());
            }
            self.refresh_status();
            self.schedule();
        }

        fn structural(self: &Rc<Self>, action: StructuralAction) {
            if self.guard.is_raised() {
                return;
            }
            if let Ok(mut engine) = self.engine.try_borrow_mut() {
                engine.on_structural_action(action, now_ms());
            }
            self.refresh_status();
            self.schedule();
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("Flight plan store starting...");

        let Some(document) = document() else {
            log::error!("No document, nothing to persist");
            return;
        };

        let storage = match LocalStorage::open() {
            Ok(storage) => storage,
            Err(e) => {
                log::error!("Planning data will not be saved: {}", e);
                if let Some(el) = document.get_element_by_id("save-status") {
                    el.set_text_content(Some("save failed"));
                }
                return;
            }
        };

        let settings = EngineSettings::load();
        let mut engine = match Engine::new(DomSurface::new(document.clone()), storage, settings) {
            Ok(engine) => engine,
            Err(e) => {
                log::error!("Persistence engine disabled: {}", e);
                return;
            }
        };

        match engine.start(now_ms()) {
            Ok(LoadOutcome::Restored { key, from_version }) => {
                log::info!("Planning data loaded from {} (v{})", key, from_version);
            }
            Ok(LoadOutcome::Fresh) => {}
            Ok(LoadOutcome::Discarded { reason }) => alert(&format!(
                "Saved planning data could not be read and was ignored: {}",
                reason
            )),
            // Autosaving now would overwrite the record we could not read
            Err(e) => {
                alert(&e.user_message());
                return;
            }
        }

        let host = Rc::new(Host {
            guard: engine.guard(),
            engine: RefCell::new(engine),
            timer: Cell::new(None),
        });
        HOST.with(|h| *h.borrow_mut() = Some(host.clone()));

        setup_edit_listeners(&document, host.clone());
        setup_structural_listeners(&document, host.clone());
        setup_export_button(&document, host.clone());
        setup_import_input(&document, host.clone());
        setup_reset_button(&document, host.clone());
        setup_unload_guard(host.clone());
        setup_visibility_flush(&document, host.clone());

        host.refresh_status();
        host.schedule();

        log::info!("Flight plan store running!");
    }

    fn alert(message: &str) {
        if let Some(window) = web_sys::window() {
            let _ = window.alert_with_message(message);
        }
    }

    fn confirm(message: &str) -> bool {
        web_sys::window()
            .and_then(|w| w.confirm_with_message(message).ok())
            .unwrap_or(false)
    }

    /// Form fields whose edits are saved with the debounce
    fn is_plan_field(id: &str) -> bool {
        FieldId::from_dom_id(id).is_some_and(|field| !matches!(field, FieldId::LegToggle(_)))
    }

    fn event_target_id(event: &web_sys::Event) -> Option<String> {
        let target: Element = event.target()?.dyn_into().ok()?;
        Some(target.id())
    }

    fn setup_edit_listeners(document: &Document, host: Rc<Host>) {
        for kind in ["input", "change"] {
            let host = host.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: web_sys::Event| {
                // Writes made by the engine itself dispatch events synchronously
                if host.guard.is_raised() {
                    return;
                }
                if event_target_id(&event).is_some_and(|id| is_plan_field(&id)) {
                    host.field_changed();
                }
            });
            let _ = document.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_structural_listeners(document: &Document, host: Rc<Host>) {
        let closure = Closure::<dyn FnMut(_)>::new(move |event: web_sys::MouseEvent| {
            let Some(id) = event_target_id(&event) else {
                return;
            };
            if id == "clear-form-btn" {
                host.structural(StructuralAction::FormCleared);
                return;
            }
            match FieldId::from_dom_id(&id) {
                Some(FieldId::LegToggle(leg)) => host.structural(StructuralAction::LegToggled(leg)),
                // Button-style toggles fire no change event
                Some(FieldId::FuelToggle(_)) => host.field_changed(),
                _ => {}
            }
        });
        let _ = document.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    /// Hand a file to the browser as a download
    fn download(file: &ExportFile) -> Result<(), JsValue> {
        let document = document().ok_or_else(|| JsValue::from_str("no document"))?;
        let parts = js_sys::Array::of1(&JsValue::from_str(&file.contents));
        let options = BlobPropertyBag::new();
        options.set_type("application/json");
        let blob = Blob::new_with_str_sequence_and_options(&parts, &options)?;
        let url = Url::create_object_url_with_blob(&blob)?;

        let anchor: HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
        anchor.set_href(&url);
        anchor.set_download(&file.filename);
        anchor.click();
        Url::revoke_object_url(&url)?;
        Ok(())
    }

    fn setup_export_button(document: &Document, host: Rc<Host>) {
        if let Some(btn) = document.get_element_by_id("export-btn") {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
                // Save pending edits first so the file matches the form
                if let Ok(mut engine) = host.engine.try_borrow_mut() {
                    engine.flush(now_ms());
                    match engine.export() {
                        Ok(file) => {
                            if let Err(e) = download(&file) {
                                log::error!("Download failed: {:?}", e);
                            }
                        }
                        Err(e) => alert(&e.user_message()),
                    }
                }
                host.refresh_status();
                host.schedule();
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_import_input(document: &Document, host: Rc<Host>) {
        let Some(input) = document
            .get_element_by_id("import-file")
            .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
        else {
            return;
        };

        let input_clone = input.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            let Some(file) = input_clone.files().and_then(|files| files.get(0)) else {
                return;
            };
            // Allow picking the same file again later
            input_clone.set_value("");
            let host = host.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let text = match wasm_bindgen_futures::JsFuture::from(file.text()).await {
                    Ok(value) => value.as_string().unwrap_or_default(),
                    Err(e) => {
                        log::error!("Could not read {}: {:?}", file.name(), e);
                        alert("Could not read the selected file");
                        return;
                    }
                };
                if !confirm("Replace the current flight plan with the imported file?") {
                    return;
                }
                let result = match host.engine.try_borrow_mut() {
                    Ok(mut engine) => engine.import(&text, now_ms()),
                    Err(_) => return,
                };
                if let Err(e) = result {
                    log::warn!("Import of {} rejected: {}", file.name(), e);
                    alert(&e.user_message());
                }
                host.refresh_status();
                host.schedule();
            });
        });
        let _ = input.add_event_listener_with_callback("change", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn setup_reset_button(document: &Document, host: Rc<Host>) {
        if let Some(btn) = document.get_element_by_id("reset-btn") {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
                if !confirm("Delete the saved flight plan and start over?") {
                    return;
                }
                let result = match host.engine.try_borrow_mut() {
                    Ok(mut engine) => engine.reset(),
                    Err(_) => return,
                };
                match result {
                    // Reload to show the empty form
                    Ok(()) => {
                        if let Some(window) = web_sys::window() {
                            let _ = window.location().reload();
                        }
                    }
                    Err(e) => alert(&e.user_message()),
                }
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_unload_guard(host: Rc<Host>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::<dyn FnMut(_)>::new(move |event: web_sys::BeforeUnloadEvent| {
            let unsaved = host
                .engine
                .try_borrow()
                .map(|engine| engine.needs_unload_confirmation())
                .unwrap_or(false);
            if unsaved {
                event.prevent_default();
                event.set_return_value("You have unsaved changes");
            }
        });
        let _ = window.add_event_listener_with_callback("beforeunload", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn setup_visibility_flush(document: &Document, host: Rc<Host>) {
        let document_clone = document.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            if document_clone.visibility_state() == web_sys::VisibilityState::Hidden {
                if let Ok(mut engine) = host.engine.try_borrow_mut() {
                    engine.flush(now_ms());
                    log::info!("Flushed pending save (tab hidden)");
                }
                host.refresh_status();
            }
        });
        let _ = document.add_event_listener_with_callback("visibilitychange", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    /// For page scripts that change fields without firing DOM events
    #[wasm_bindgen]
    pub fn notify_field_changed() {
        if let Some(host) = host() {
            host.field_changed();
        }
    }

    /// Download the stored plan unless this date/callsign was already auto-exported
    #[wasm_bindgen]
    pub fn auto_export_plan() {
        let Some(host) = host() else {
            return;
        };
        let result = match host.engine.try_borrow_mut() {
            Ok(mut engine) => {
                engine.flush(now_ms());
                engine.auto_export()
            }
            Err(_) => return,
        };
        match result {
            Ok(Some(file)) => {
                if let Err(e) = download(&file) {
                    log::error!("Download failed: {:?}", e);
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Auto-export skipped: {}", e),
        }
        host.refresh_status();
        host.schedule();
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_app::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Flight plan store (native) starting...");
    log::info!("Native mode has no planning page - run with `trunk serve` for the web version");

    println!("\nRunning persistence self-check...");
    if let Err(e) = self_check() {
        log::error!("Self-check failed: {}", e);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

/// Edit -> save -> reload round trip against the in-memory backends
#[cfg(not(target_arch = "wasm32"))]
fn self_check() -> flightplan_store::error::Result<()> {
    use flightplan_store::form::{FieldId, FieldValue, LegSlot, MemorySurface};
    use flightplan_store::persistence::fingerprint;
    use flightplan_store::platform::{MemoryStorage, time::now_ms};
    use flightplan_store::{Engine, EngineSettings, LoadOutcome, SaveOutcome};

    let settings = EngineSettings::load();
    let surface = MemorySurface::with_layout(&settings.layout);
    let mut engine = Engine::new(surface, MemoryStorage::new(), settings.clone())?;
    let t0 = now_ms();
    assert_eq!(engine.start(t0)?, LoadOutcome::Fresh);

    let destination = FieldId::Leg {
        leg: 1,
        slot: LegSlot::Destination,
    };
    engine
        .surface_mut()
        .set(&destination, FieldValue::text("EDDM"));
    engine.on_field_changed(t0);
    let saved = engine.tick(t0 + settings.debounce_ms);
    assert!(matches!(saved, Some(SaveOutcome::Written(_))), "edit should be saved");
    let expected = fingerprint(engine.current());

    // Reload into a blank page
    let storage = engine.storage().clone();
    let mut reloaded = Engine::new(MemorySurface::with_layout(&settings.layout), storage, settings)?;
    reloaded.start(t0 + 1000.0)?;
    assert_eq!(reloaded.baseline(), Some(expected), "baseline should be restored");
    println!("✓ Persistence self-check passed (fingerprint {})", expected);
    Ok(())
}
