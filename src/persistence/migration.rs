//! Schema migration chain
//!
//! Each step upgrades a raw JSON record from version `N` to `N + 1`. Steps are
//! additive: they introduce defaults or restructure, never drop values stored
//! under known keys. The chain is validated at engine construction so a gap is
//! reported before any record is touched.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::consts::SCHEMA_VERSION;
use crate::error::{EngineError, Result};

/// Migration failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("no migration registered for schema version {version} (current is {target})")]
    Gap { version: u32, target: u32 },
    #[error("migration chain is incomplete: version {version} has no step towards {target}")]
    ChainGap { version: u32, target: u32 },
}

/// Upgrades a raw record by exactly one version. The chain rewrites `v` itself.
pub type MigrationStep = fn(Map<String, Value>) -> Map<String, Value>;

/// Result of running the chain
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub from_version: u32,
    pub value: Value,
}

/// Ordered table of migration steps keyed by source version
pub struct MigrationChain {
    steps: BTreeMap<u32, MigrationStep>,
    target: u32,
}

impl MigrationChain {
    /// Empty chain towards `target`
    pub fn new(target: u32) -> Self {
        Self {
            steps: BTreeMap::new(),
            target,
        }
    }

    /// The chain shipped with this build
    pub fn builtin() -> Self {
        let mut chain = Self::new(SCHEMA_VERSION);
        chain.register(0, v0_to_v1);
        chain.register(1, v1_to_v2);
        chain
    }

    /// Register the step from `from_version` to `from_version + 1`
    pub fn register(&mut self, from_version: u32, step: MigrationStep) {
        self.steps.insert(from_version, step);
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Every version in `0..target` must have a step
    pub fn validate(&self) -> Result<(), MigrationError> {
        match (0..self.target).find(|v| !self.steps.contains_key(v)) {
            Some(version) => Err(MigrationError::ChainGap {
                version,
                target: self.target,
            }),
            None => Ok(()),
        }
    }

    /// Version tag of a raw record. Missing or non-integer tags count as 0.
    pub fn source_version(record: &Map<String, Value>) -> u32 {
        match record.get("v") {
            None => 0,
            Some(tag) => match tag.as_u64().and_then(|v| u32::try_from(v).ok()) {
                Some(v) => v,
                None => {
                    log::warn!("Unrecognized schema tag {}, treating as version 0", tag);
                    0
                }
            },
        }
    }

    /// Bring a decoded record up to the current schema.
    ///
    /// Nothing is returned unless every step succeeds, so callers never see a
    /// partially migrated record.
    pub fn migrate(&self, raw: Value) -> Result<Migrated> {
        let Value::Object(mut record) = raw else {
            return Err(EngineError::NotAnObject);
        };

        let from_version = Self::source_version(&record);
        let mut version = from_version;
        while version != self.target {
            let step = self
                .steps
                .get(&version)
                .filter(|_| version < self.target)
                .ok_or(MigrationError::Gap {
                    version,
                    target: self.target,
                })?;
            record = step(record);
            version += 1;
            record.insert("v".to_string(), json!(version));
        }
        record.insert("v".to_string(), json!(version));

        // Wrong-typed containers are left for the shape check to reject
        object_mut(&mut record, "route");
        object_mut(&mut record, "fuel");

        if from_version != self.target {
            log::info!("Migrated planning data v{} -> v{}", from_version, self.target);
        }
        Ok(Migrated {
            from_version,
            value: Value::Object(record),
        })
    }
}

impl Default for MigrationChain {
    fn default() -> Self {
        Self::builtin()
    }
}

/// v0 -> v1: the route header was introduced
fn v0_to_v1(mut record: Map<String, Value>) -> Map<String, Value> {
    if let Some(route) = object_mut(&mut record, "route") {
        object_mut(route, "head");
        route
            .entry("legs".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
    }
    record
}

/// v1 -> v2: fuel split into `fields`/`toggles`, leg toggles became named states
fn v1_to_v2(mut record: Map<String, Value>) -> Map<String, Value> {
    if let Some(fuel) = object_mut(&mut record, "fuel") {
        let already_split = fuel.get("fields").is_some_and(Value::is_object)
            || fuel.get("toggles").is_some_and(Value::is_object);
        if !already_split {
            let mut fields = Map::new();
            let mut toggles = Map::new();
            for (name, value) in std::mem::take(fuel) {
                match value {
                    Value::Bool(_) => toggles.insert(name, value),
                    other => fields.insert(name, other),
                };
            }
            fuel.insert("fields".to_string(), Value::Object(fields));
            fuel.insert("toggles".to_string(), Value::Object(toggles));
        }
    }

    if let Some(route) = object_mut(&mut record, "route") {
        if let Some(toggles) = object_mut(route, "toggles") {
            for state in toggles.values_mut() {
                if let Value::Bool(active) = *state {
                    *state = json!(if active { "active" } else { "inactive" });
                }
            }
        }
    }
    record
}

/// Object under `key`, created when absent/null; `None` when it holds another type
fn object_mut<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    let slot = map.entry(key.to_string()).or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}
