//! Persistence engine
//!
//! Owns the form surface, the store, the migration chain and the autosave
//! scheduler. Hosts feed it edit notifications and call [`Engine::tick`] when
//! [`Engine::next_wakeup`] says something is due; the engine never reads a
//! clock itself.
//!
//! Flows:
//! - edit -> debounce -> capture -> fingerprint -> write if changed
//! - start -> stored record (current key, then legacy keys) -> migrate -> apply
//! - import -> migrate -> write -> apply now and again after a short delay

use crate::autosave::{ApplyGuard, Indicator, SaveState, Scheduler};
use crate::consts::{LEGACY_STATE_KEYS, STATE_KEY};
use crate::error::{EngineError, Result};
use crate::form::{self, FieldReader, FieldWriter};
use crate::persistence::{Fingerprint, MigrationChain, PlanningState, decode_record, fingerprint};
use crate::platform::{Storage, StorageError};
use crate::settings::EngineSettings;
use crate::transfer::{self, ExportFile};

/// What `start` found in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A stored snapshot was migrated and applied
    Restored { key: &'static str, from_version: u32 },
    /// Nothing stored; the form's current contents are the state
    Fresh,
    /// A stored record could not be read and was left in place
    Discarded { reason: String },
}

/// Result of a successful import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub from_version: u32,
    pub legs: usize,
}

/// What a completed save did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written(Fingerprint),
    Unchanged,
    Failed(StorageError),
}

/// Non-text user actions that should save without waiting for the debounce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralAction {
    LegToggled(usize),
    FormCleared,
}

/// Second apply pass waiting for async widgets to catch up
#[derive(Debug)]
struct Reapply {
    deadline: f64,
    state: PlanningState,
}

pub struct Engine<S, B>
where
    S: FieldReader + FieldWriter,
    B: Storage,
{
    surface: S,
    storage: B,
    settings: EngineSettings,
    chain: MigrationChain,
    scheduler: Scheduler,
    guard: ApplyGuard,
    /// Guard is lowered on the next tick, after synchronous notifications drained
    release_pending: bool,
    reapply: Option<Reapply>,
    /// Last captured or applied snapshot
    current: PlanningState,
}

impl<S, B> Engine<S, B>
where
    S: FieldReader + FieldWriter,
    B: Storage,
{
    /// Engine with the built-in migration chain
    pub fn new(surface: S, storage: B, settings: EngineSettings) -> Result<Self> {
        Self::with_chain(surface, storage, settings, MigrationChain::builtin())
    }

    /// Engine with a custom chain; fails if the chain has a version gap
    pub fn with_chain(
        surface: S,
        storage: B,
        settings: EngineSettings,
        chain: MigrationChain,
    ) -> Result<Self> {
        chain.validate()?;
        let guard = ApplyGuard::new();
        Ok(Self {
            surface,
            storage,
            settings,
            chain,
            scheduler: Scheduler::new(guard.clone()),
            guard,
            release_pending: false,
            reapply: None,
            current: PlanningState::empty(0.0),
        })
    }

    // === Accessors ===

    /// Handle for host listeners that must check the guard without borrowing the engine
    pub fn guard(&self) -> ApplyGuard {
        self.guard.clone()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn storage(&self) -> &B {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut B {
        &mut self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn save_state(&self) -> SaveState {
        self.scheduler.state()
    }

    pub fn indicator(&self) -> Indicator {
        self.scheduler.indicator()
    }

    pub fn baseline(&self) -> Option<Fingerprint> {
        self.scheduler.baseline()
    }

    pub fn current(&self) -> &PlanningState {
        &self.current
    }

    /// Why the last save failed, while in the `error` state
    pub fn last_save_error(&self) -> Option<&StorageError> {
        self.scheduler.last_error()
    }

    /// Leaving the page now would lose edits
    pub fn needs_unload_confirmation(&self) -> bool {
        self.scheduler.has_unsaved_changes()
    }

    // === Load ===

    /// Raw stored record: current key first, then legacy keys in order
    pub fn stored_record(&self) -> Result<Option<(&'static str, String)>> {
        for key in std::iter::once(STATE_KEY).chain(LEGACY_STATE_KEYS) {
            if let Some(raw) = self.storage.get(key)? {
                if !raw.trim().is_empty() {
                    return Ok(Some((key, raw)));
                }
            }
        }
        Ok(None)
    }

    /// Restore the stored snapshot into the form, or adopt the form as-is.
    ///
    /// Malformed records are reported and left untouched; a migration gap
    /// aborts with an error.
    pub fn start(&mut self, now_ms: f64) -> Result<LoadOutcome> {
        let found = match self.stored_record() {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Could not read stored planning data: {}", e);
                self.adopt_form(now_ms);
                return Ok(LoadOutcome::Discarded {
                    reason: e.to_string(),
                });
            }
        };

        let Some((key, raw)) = found else {
            log::info!("No stored planning data, starting from the form");
            self.adopt_form(now_ms);
            return Ok(LoadOutcome::Fresh);
        };

        match decode_record(&self.chain, &raw) {
            Ok((state, from_version)) => {
                log::info!(
                    "Restored planning data from {} (v{}, {} legs)",
                    key,
                    from_version,
                    state.route.legs.len()
                );
                self.apply(&state);
                self.schedule_reapply(state, now_ms);
                Ok(LoadOutcome::Restored { key, from_version })
            }
            Err(e) if e.is_fatal() => {
                log::error!("Stored planning data in {} cannot be loaded: {}", key, e);
                Err(e)
            }
            Err(e) => {
                log::warn!("Ignoring unreadable planning data in {}: {}", key, e);
                self.adopt_form(now_ms);
                Ok(LoadOutcome::Discarded {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn adopt_form(&mut self, now_ms: f64) {
        self.current = form::capture(&self.surface, &self.settings.layout, now_ms);
        self.scheduler.reset();
    }

    // === Apply ===

    /// Write a committed snapshot into the form under the apply guard.
    ///
    /// Afterwards the baseline equals `fingerprint(state)` and edit
    /// notifications are ignored until the next [`tick`](Self::tick).
    pub fn apply(&mut self, state: &PlanningState) {
        self.apply_guarded(state);
        self.scheduler.mark_loaded(fingerprint(state));
    }

    fn apply_guarded(&mut self, state: &PlanningState) {
        self.guard.raise();
        self.scheduler.cancel_pending();
        let report = form::apply(&mut self.surface, &self.settings.layout, state);
        if report.missing > 0 {
            log::debug!("Apply skipped {} fields not on the page", report.missing);
        }
        self.current = state.clone();
        self.release_pending = true;
    }

    fn schedule_reapply(&mut self, state: PlanningState, now_ms: f64) {
        self.reapply = Some(Reapply {
            deadline: now_ms + self.settings.reapply_delay_ms,
            state,
        });
    }

    // === Edits ===

    /// The user changed a field. Returns `false` when suppressed by the apply guard.
    pub fn on_field_changed(&mut self, now_ms: f64) -> bool {
        let accepted = self.scheduler.note_edit(now_ms, self.settings.debounce_ms);
        if accepted {
            self.drop_reapply();
        }
        accepted
    }

    /// Leg toggle or form clear: save on the next tick
    pub fn on_structural_action(&mut self, action: StructuralAction, now_ms: f64) -> bool {
        let accepted = self
            .scheduler
            .note_edit(now_ms, self.settings.structural_delay_ms);
        if accepted {
            log::debug!("Structural action {:?}, saving immediately", action);
            self.drop_reapply();
        }
        accepted
    }

    /// User edits win over a pending second apply pass
    fn drop_reapply(&mut self) {
        if self.reapply.take().is_some() {
            log::debug!("Second apply pass cancelled by user edit");
        }
    }

    // === Timers ===

    /// Run whatever is due: guard release, second apply pass, pending save
    pub fn tick(&mut self, now_ms: f64) -> Option<SaveOutcome> {
        if self.release_pending {
            self.release_pending = false;
            self.guard.lower();
        }

        if self.reapply.as_ref().is_some_and(|r| r.deadline <= now_ms) {
            if let Some(Reapply { state, .. }) = self.reapply.take() {
                log::debug!("Second apply pass");
                self.apply_guarded(&state);
            }
        }

        if self.scheduler.begin_save(now_ms) {
            Some(self.run_save(now_ms))
        } else {
            None
        }
    }

    /// Delay until the next `tick` has work, if any
    pub fn next_wakeup(&self, now_ms: f64) -> Option<f64> {
        if self.release_pending {
            return Some(0.0);
        }
        [
            self.reapply.as_ref().map(|r| r.deadline),
            self.scheduler.pending_deadline(),
        ]
        .into_iter()
        .flatten()
        .map(|deadline| (deadline - now_ms).max(0.0))
        .reduce(f64::min)
    }

    /// Save a pending edit right away (page hidden, explicit save)
    pub fn flush(&mut self, now_ms: f64) -> Option<SaveOutcome> {
        if self.scheduler.pending_deadline().is_some() {
            self.scheduler.cancel_pending();
            self.scheduler.note_edit(now_ms, 0.0);
        }
        self.tick(now_ms)
    }

    fn run_save(&mut self, now_ms: f64) -> SaveOutcome {
        let state = form::capture(&self.surface, &self.settings.layout, now_ms);
        let fp = fingerprint(&state);
        self.current = state;

        if !self.scheduler.is_changed(fp) {
            log::debug!("Planning data unchanged ({}), skipping write", fp);
            self.scheduler.finish_unchanged();
            return SaveOutcome::Unchanged;
        }

        let written = self
            .current
            .to_json()
            .map_err(|e| StorageError::Backend(e.to_string()))
            .and_then(|json| self.storage.set(STATE_KEY, &json));
        match written {
            Ok(()) => {
                log::info!("Planning data saved ({})", fp);
                self.scheduler.finish_written(fp);
                SaveOutcome::Written(fp)
            }
            Err(e) => {
                log::warn!("Saving planning data failed: {}", e);
                self.scheduler.finish_failed(e.clone());
                SaveOutcome::Failed(e)
            }
        }
    }

    // === Import / export ===

    /// Replace the stored snapshot with an external file.
    ///
    /// Any parse, shape or migration error leaves storage and form untouched.
    pub fn import(&mut self, text: &str, now_ms: f64) -> Result<ImportOutcome> {
        let (state, from_version) = decode_record(&self.chain, text)?;
        let json = state.to_json()?;
        self.storage.set(STATE_KEY, &json)?;

        let outcome = ImportOutcome {
            from_version,
            legs: state.route.legs.len(),
        };
        log::info!(
            "Imported planning data (v{}, {} legs)",
            from_version,
            outcome.legs
        );
        self.apply(&state);
        self.schedule_reapply(state, now_ms);
        Ok(outcome)
    }

    fn export_base(&self, raw: &str) -> String {
        match decode_record(&self.chain, raw) {
            Ok((state, _)) => transfer::base_name(&state, &self.settings.export),
            Err(_) => self.settings.export.fallback_base.clone(),
        }
    }

    fn export_as(&mut self, base: &str, contents: String) -> Result<ExportFile> {
        let filename = transfer::next_file_name(&mut self.storage, base)?;
        log::info!("Exporting planning data as {}", filename);
        Ok(ExportFile { filename, contents })
    }

    /// Stored record as a download, under a name that never repeats
    pub fn export(&mut self) -> Result<ExportFile> {
        let (_, raw) = self.stored_record()?.ok_or(EngineError::NothingToExport)?;
        let base = self.export_base(&raw);
        self.export_as(&base, raw)
    }

    /// Like [`export`](Self::export), but `None` when this base name was the last one auto-exported
    pub fn auto_export(&mut self) -> Result<Option<ExportFile>> {
        let (_, raw) = self.stored_record()?.ok_or(EngineError::NothingToExport)?;
        let base = self.export_base(&raw);
        if transfer::is_last_auto_export(&self.storage, &base)? {
            log::debug!("Auto-export skipped, {} already exported", base);
            return Ok(None);
        }
        let file = self.export_as(&base, raw)?;
        transfer::remember_auto_export(&mut self.storage, &base)?;
        Ok(Some(file))
    }

    // === Reset ===

    /// Delete the stored snapshot and forget the baseline
    pub fn reset(&mut self) -> Result<()> {
        self.storage.remove(STATE_KEY)?;
        for key in LEGACY_STATE_KEYS {
            self.storage.remove(key)?;
        }
        self.reapply = None;
        self.scheduler.reset();
        log::info!("Stored planning data cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SCHEMA_VERSION;
    use crate::form::{FieldId, FieldValue, FormLayout, LegSlot, MemorySurface};
    use crate::persistence::{LegActivation, MigrationError};
    use crate::platform::MemoryStorage;
    use proptest::prelude::*;
    use serde_json::{Value, json};

    type TestEngine = Engine<MemorySurface, MemoryStorage>;

    fn settings() -> EngineSettings {
        EngineSettings {
            layout: FormLayout {
                max_legs: 3,
                fuel_fields: vec!["trip".into(), "taxi".into()],
                fuel_toggles: vec!["extraAuto".into()],
            },
            ..EngineSettings::default()
        }
    }

    fn engine_with(storage: MemoryStorage) -> TestEngine {
        let settings = settings();
        let surface = MemorySurface::with_layout(&settings.layout);
        Engine::new(surface, storage, settings).unwrap()
    }

    fn dest(leg: usize) -> FieldId {
        FieldId::Leg {
            leg,
            slot: LegSlot::Destination,
        }
    }

    /// Stored record shaped exactly like a capture of a filled-in form
    fn stored_plan() -> String {
        let settings = settings();
        let mut surface = MemorySurface::with_layout(&settings.layout);
        surface.set(&FieldId::Date, FieldValue::text("2024-05-01"));
        surface.set(&FieldId::PrimaryAircraft, FieldValue::text("D-EABC"));
        surface.set(
            &FieldId::Leg {
                leg: 1,
                slot: LegSlot::Origin,
            },
            FieldValue::text("EDDF"),
        );
        surface.set(&dest(1), FieldValue::text("EDDM"));
        surface.set(&FieldId::LegToggle(3), FieldValue::Flag(false));
        surface.set(&FieldId::Fuel("trip".into()), FieldValue::text("1450"));
        form::capture(&surface, &settings.layout, 1_000.0)
            .to_json()
            .unwrap()
    }

    fn stored_value(engine: &TestEngine) -> Value {
        serde_json::from_str(engine.storage().raw(STATE_KEY).unwrap()).unwrap()
    }

    fn without_time(mut value: Value) -> Value {
        value.as_object_mut().unwrap().remove("t");
        value
    }

    #[test]
    fn test_chain_gap_rejected_at_construction() {
        let settings = settings();
        let mut chain = MigrationChain::new(2);
        chain.register(1, |r| r);
        let result = Engine::with_chain(
            MemorySurface::new(),
            MemoryStorage::new(),
            settings,
            chain,
        );
        assert!(matches!(
            result,
            Err(EngineError::Migration(MigrationError::ChainGap { version: 0, .. }))
        ));
    }

    #[test]
    fn test_fresh_start_adopts_form() {
        let mut engine = engine_with(MemoryStorage::new());
        assert_eq!(engine.start(0.0).unwrap(), LoadOutcome::Fresh);
        assert_eq!(engine.baseline(), None);
        assert_eq!(engine.save_state(), SaveState::Idle);
        assert_eq!(engine.current().route.legs.len(), 3);

        // First real save always writes
        engine.on_field_changed(10.0);
        assert!(matches!(engine.tick(310.0), Some(SaveOutcome::Written(_))));
    }

    #[test]
    fn test_edit_one_leg_saves_only_that_field() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, &stored_plan()).unwrap();
        let before = without_time(serde_json::from_str(&stored_plan()).unwrap());

        let mut engine = engine_with(storage);
        let outcome = engine.start(0.0).unwrap();
        assert_eq!(
            outcome,
            LoadOutcome::Restored {
                key: STATE_KEY,
                from_version: SCHEMA_VERSION
            }
        );
        assert_eq!(engine.indicator(), Indicator::Loaded);
        engine.tick(1.0);
        let writes = engine.storage().write_count();

        engine.surface_mut().set(&dest(1), FieldValue::text("LOWW"));
        assert!(engine.on_field_changed(100.0));
        assert_eq!(engine.save_state(), SaveState::Dirty);
        assert!(engine.needs_unload_confirmation());
        assert_eq!(engine.tick(350.0), None);
        assert!(matches!(engine.tick(400.0), Some(SaveOutcome::Written(_))));

        assert_eq!(engine.storage().write_count(), writes + 1);
        let mut expected = before;
        expected["route"]["legs"][0]["destinationCode"] = json!("LOWW");
        assert_eq!(without_time(stored_value(&engine)), expected);
        assert_eq!(engine.baseline(), Some(fingerprint(engine.current())));
        assert_eq!(engine.indicator().label(), "saved");
        assert!(!engine.needs_unload_confirmation());
    }

    #[test]
    fn test_apply_is_guarded() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();

        let mut state = PlanningState::empty(5.0);
        state.route.head.date = "2024-06-01".into();
        engine.apply(&state);

        // Notifications fired by the writes themselves
        assert!(!engine.on_field_changed(5.0));
        assert_ne!(engine.save_state(), SaveState::Dirty);
        assert_eq!(engine.baseline(), Some(fingerprint(&state)));
        assert_eq!(engine.next_wakeup(5.0), Some(0.0));

        engine.tick(5.0);
        assert!(!engine.guard().is_raised());
        assert!(engine.on_field_changed(6.0));
    }

    #[test]
    fn test_apply_capture_idempotent() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, &stored_plan()).unwrap();
        let mut engine = engine_with(storage);
        engine.start(0.0).unwrap();
        engine.tick(0.0);

        let layout = engine.settings().layout.clone();
        let captured = form::capture(engine.surface(), &layout, 50.0);
        let before = fingerprint(&captured);
        engine.apply(&captured);
        let again = form::capture(engine.surface(), &layout, 60.0);
        assert_eq!(fingerprint(&again), before);
    }

    #[test]
    fn test_unchanged_capture_skips_write() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();
        engine.surface_mut().set(&dest(1), FieldValue::text("EDDM"));
        engine.on_field_changed(0.0);
        engine.tick(300.0);
        assert_eq!(engine.storage().write_count(), 1);

        // Focus/blur style notification with no real change
        engine.on_field_changed(1_000.0);
        assert_eq!(engine.tick(1_300.0), Some(SaveOutcome::Unchanged));
        assert_eq!(engine.storage().write_count(), 1);
        assert_eq!(engine.save_state(), SaveState::Saved);
    }

    #[test]
    fn test_structural_action_saves_on_next_tick() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();
        engine
            .surface_mut()
            .set(&FieldId::LegToggle(2), FieldValue::Flag(false));
        assert!(engine.on_structural_action(StructuralAction::LegToggled(2), 50.0));
        assert_eq!(engine.next_wakeup(50.0), Some(0.0));
        assert!(matches!(engine.tick(50.0), Some(SaveOutcome::Written(_))));
        assert_eq!(stored_value(&engine)["route"]["toggles"]["2"], "inactive");
    }

    #[test]
    fn test_write_failure_retries_on_next_edit() {
        let mut engine = engine_with(MemoryStorage::with_quota(16));
        engine.start(0.0).unwrap();
        engine.surface_mut().set(&dest(1), FieldValue::text("EDDM"));
        engine.on_field_changed(0.0);
        assert!(matches!(engine.tick(300.0), Some(SaveOutcome::Failed(_))));
        assert_eq!(engine.save_state(), SaveState::Error);
        assert_eq!(engine.indicator(), Indicator::SaveFailed);
        assert_eq!(engine.baseline(), None);
        assert!(engine.needs_unload_confirmation());
        assert!(matches!(
            engine.last_save_error(),
            Some(StorageError::QuotaExceeded { .. })
        ));
        // In-memory data survives
        assert_eq!(engine.current().route.legs[0].destination_code, "EDDM");

        engine.storage_mut().set_quota(None);
        engine.on_field_changed(400.0);
        assert!(matches!(engine.tick(700.0), Some(SaveOutcome::Written(_))));
        assert_eq!(stored_value(&engine)["route"]["legs"][0]["destinationCode"], "EDDM");
        assert_eq!(engine.last_save_error(), None);
    }

    #[test]
    fn test_legacy_key_read_but_never_written() {
        let legacy = LEGACY_STATE_KEYS[0];
        let raw = r#"{"v":1,"route":{"head":{"date":"2023-01-02"},"legs":[{"originCode":"EDDH"}]},"fuel":{"trip":"900","extraAuto":true}}"#;
        let mut storage = MemoryStorage::new();
        storage.set(legacy, raw).unwrap();

        let mut engine = engine_with(storage);
        assert_eq!(
            engine.start(0.0).unwrap(),
            LoadOutcome::Restored {
                key: legacy,
                from_version: 1
            }
        );
        engine.tick(0.0);
        assert_eq!(
            engine.surface().read(&FieldId::Fuel("trip".into())),
            Some(FieldValue::text("900"))
        );
        assert_eq!(
            engine.surface().read(&FieldId::FuelToggle("extraAuto".into())),
            Some(FieldValue::Flag(true))
        );

        engine.surface_mut().set(&dest(1), FieldValue::text("EDDW"));
        engine.on_field_changed(10.0);
        engine.tick(310.0);
        assert_eq!(engine.storage().raw(legacy), Some(raw));
        assert_eq!(stored_value(&engine)["v"], json!(SCHEMA_VERSION));
        assert_eq!(stored_value(&engine)["route"]["legs"][0]["originCode"], "EDDH");
    }

    #[test]
    fn test_malformed_store_left_untouched() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, "{not json").unwrap();
        let mut engine = engine_with(storage);
        assert!(matches!(
            engine.start(0.0).unwrap(),
            LoadOutcome::Discarded { .. }
        ));
        assert_eq!(engine.storage().raw(STATE_KEY), Some("{not json"));
    }

    #[test]
    fn test_future_version_in_store_is_fatal() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, r#"{"v":99,"route":{},"fuel":{}}"#).unwrap();
        let mut engine = engine_with(storage);
        let err = engine.start(0.0).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_import_legacy_file() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();
        let file = r#"{"v":0,"route":{"legs":[{"originCode":"EDDF","destinationCode":"EDDM","departureTime":"0800"},{"originCode":"EDDM","destinationCode":"LOWW"}]},"fuel":{}}"#;

        let outcome = engine.import(file, 100.0).unwrap();
        assert_eq!(
            outcome,
            ImportOutcome {
                from_version: 0,
                legs: 2
            }
        );

        let stored = stored_value(&engine);
        assert_eq!(stored["v"], json!(SCHEMA_VERSION));
        assert_eq!(stored["route"]["head"]["date"], "");
        assert_eq!(stored["route"]["legs"][0]["departureTime"], "0800");
        assert_eq!(stored["route"]["legs"][1]["destinationCode"], "LOWW");
        assert_eq!(engine.indicator(), Indicator::Loaded);
        assert_eq!(
            engine.surface().read(&dest(2)),
            Some(FieldValue::text("LOWW"))
        );
    }

    #[test]
    fn test_import_keeps_aircraft_refs_and_odd_timestamps() {
        for t in [r#""2024-05-01T10:00:00Z""#, "null"] {
            let mut engine = engine_with(MemoryStorage::new());
            engine.start(0.0).unwrap();
            let file = format!(
                r#"{{"v":2,"t":{t},"route":{{"head":{{"date":"2024-05-01","primaryAircraftRef":"D-EABC","secondaryAircraftRef":"D-EXYZ"}},"legs":[{{}}]}},"fuel":{{}}}}"#
            );

            engine.import(&file, 100.0).unwrap();
            assert_eq!(
                engine.surface().read(&FieldId::PrimaryAircraft),
                Some(FieldValue::text("D-EABC"))
            );
            assert_eq!(
                engine.surface().read(&FieldId::SecondaryAircraft),
                Some(FieldValue::text("D-EXYZ"))
            );
            let head = &stored_value(&engine)["route"]["head"];
            assert_eq!(head["primaryAircraftRef"], "D-EABC");
            assert_eq!(head["secondaryAircraftRef"], "D-EXYZ");
        }
    }

    #[test]
    fn test_import_unknown_version_changes_nothing() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, &stored_plan()).unwrap();
        let mut engine = engine_with(storage);
        engine.start(0.0).unwrap();
        engine.tick(0.0);
        let before = engine.storage().raw(STATE_KEY).map(String::from);
        let writes = engine.storage().write_count();

        let err = engine
            .import(r#"{"v":99,"route":{"legs":[]},"fuel":{}}"#, 10.0)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Migration(MigrationError::Gap { version: 99, .. })
        ));
        assert_eq!(engine.storage().raw(STATE_KEY).map(String::from), before);
        assert_eq!(engine.storage().write_count(), writes);
        assert_eq!(engine.surface().read(&dest(1)), Some(FieldValue::text("EDDM")));
    }

    #[test]
    fn test_import_rejects_malformed_input() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();
        for bad in ["", "nope", "[]", "42", r#"{"v":2,"route":{"legs":"x"}}"#] {
            let err = engine.import(bad, 0.0).unwrap_err();
            assert!(!err.is_fatal(), "{bad}: {err}");
        }
        assert_eq!(engine.storage().write_count(), 0);
    }

    #[test]
    fn test_second_apply_pass_fills_late_options() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();
        engine.surface_mut().defer_options(&FieldId::PrimaryAircraft);

        let file = r#"{"v":2,"route":{"head":{"primaryAircraft":"D-EXYZ"},"legs":[{}]},"fuel":{}}"#;
        engine.import(file, 1_000.0).unwrap();
        assert_eq!(
            engine.surface().read(&FieldId::PrimaryAircraft),
            Some(FieldValue::text(""))
        );

        // Options arrive before the second pass
        engine.surface_mut().populate_options(&FieldId::PrimaryAircraft);
        engine.tick(1_001.0);
        assert_eq!(engine.next_wakeup(1_001.0), Some(249.0));
        engine.tick(1_250.0);
        assert_eq!(
            engine.surface().read(&FieldId::PrimaryAircraft),
            Some(FieldValue::text("D-EXYZ"))
        );
        // The second pass is guarded too
        assert!(!engine.on_field_changed(1_250.0));
        engine.tick(1_251.0);
        assert_eq!(engine.next_wakeup(1_251.0), None);
    }

    #[test]
    fn test_user_edit_drops_second_apply_pass() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();
        let file = r#"{"v":2,"route":{"head":{"date":"2024-05-01"},"legs":[{}]},"fuel":{}}"#;
        engine.import(file, 1_000.0).unwrap();
        engine.tick(1_001.0);

        engine.surface_mut().set(&FieldId::Date, FieldValue::text("2024-06-01"));
        assert!(engine.on_field_changed(1_010.0));
        assert_eq!(engine.next_wakeup(1_250.0), Some(60.0));

        engine.tick(1_250.0);
        assert_eq!(
            engine.surface().read(&FieldId::Date),
            Some(FieldValue::text("2024-06-01"))
        );
        assert!(matches!(engine.tick(1_310.0), Some(SaveOutcome::Written(_))));
        assert_eq!(stored_value(&engine)["route"]["head"]["date"], "2024-06-01");
    }

    #[test]
    fn test_export_names_and_contents() {
        let mut engine = engine_with(MemoryStorage::new());
        assert!(matches!(engine.export(), Err(EngineError::NothingToExport)));

        engine.storage_mut().set(STATE_KEY, &stored_plan()).unwrap();
        engine.start(0.0).unwrap();

        let first = engine.export().unwrap();
        assert_eq!(first.filename, "2024-05-01_D-EABC.json");
        assert_eq!(first.contents, stored_plan());
        let second = engine.export().unwrap();
        assert_eq!(second.filename, "2024-05-01_D-EABC (1).json");
    }

    #[test]
    fn test_auto_export_dedups_by_base_name() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, &stored_plan()).unwrap();
        let mut engine = engine_with(storage);
        engine.start(0.0).unwrap();
        engine.tick(0.0);

        assert!(engine.auto_export().unwrap().is_some());
        assert!(engine.auto_export().unwrap().is_none());

        engine.surface_mut().set(&FieldId::Date, FieldValue::text("2024-05-02"));
        engine.on_field_changed(10.0);
        engine.tick(310.0);
        let file = engine.auto_export().unwrap().unwrap();
        assert_eq!(file.filename, "2024-05-02_D-EABC (1).json");
    }

    #[test]
    fn test_reset_clears_store_and_baseline() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, &stored_plan()).unwrap();
        storage.set(LEGACY_STATE_KEYS[1], "{}").unwrap();
        let mut engine = engine_with(storage);
        engine.start(0.0).unwrap();
        engine.on_field_changed(0.0);

        engine.reset().unwrap();
        assert_eq!(engine.storage().raw(STATE_KEY), None);
        assert_eq!(engine.storage().raw(LEGACY_STATE_KEYS[1]), None);
        assert_eq!(engine.baseline(), None);
        assert_eq!(engine.save_state(), SaveState::Idle);
        assert_eq!(engine.next_wakeup(0.0), Some(0.0));
        engine.tick(0.0);
        assert_eq!(engine.next_wakeup(0.0), None);
    }

    #[test]
    fn test_flush_saves_immediately() {
        let mut engine = engine_with(MemoryStorage::new());
        engine.start(0.0).unwrap();
        engine.surface_mut().set(&dest(1), FieldValue::text("EDDM"));
        engine.on_field_changed(0.0);
        assert!(matches!(engine.flush(10.0), Some(SaveOutcome::Written(_))));
        assert_eq!(engine.flush(20.0), None);
    }

    #[test]
    fn test_toggle_restore_disables_leg_fields() {
        let mut storage = MemoryStorage::new();
        storage.set(STATE_KEY, &stored_plan()).unwrap();
        let mut engine = engine_with(storage);
        engine.start(0.0).unwrap();
        assert_eq!(
            engine.current().route.toggles.get(&3),
            Some(&LegActivation::Inactive)
        );
        assert!(engine.surface().is_disabled(&dest(3)));
        assert!(!engine.surface().is_disabled(&dest(2)));
    }

    proptest! {
        #[test]
        fn prop_burst_of_edits_writes_once(gaps in proptest::collection::vec(0.0f64..299.0, 1..20)) {
            let mut engine = engine_with(MemoryStorage::new());
            engine.start(0.0).unwrap();

            let mut now = 0.0;
            for (i, gap) in gaps.iter().enumerate() {
                now += gap;
                engine.surface_mut().set(&dest(1), FieldValue::Text(format!("E{i:03}")));
                engine.on_field_changed(now);
                // Nothing fires mid-burst
                prop_assert_eq!(engine.tick(now), None);
            }
            prop_assert_eq!(engine.storage().write_count(), 0);

            let last = format!("E{:03}", gaps.len() - 1);
            let outcome = engine.tick(now + 300.0);
            prop_assert!(matches!(outcome, Some(SaveOutcome::Written(_))));
            prop_assert_eq!(engine.storage().write_count(), 1);
            let stored = stored_value(&engine);
            prop_assert_eq!(&stored["route"]["legs"][0]["destinationCode"], &json!(last));
        }
    }
}
