//! Canonical fingerprint of a planning state
//!
//! Keys are emitted in sorted order, then the canonical string is folded through
//! 32-bit FNV-1a over UTF-16 code units. Used only for change detection, never
//! for integrity.
//!
//! `serde_json::Value` is an owned tree, so cyclic input cannot be constructed
//! and the normalization needs no visited set.

use std::fmt;

use serde_json::Value;

use super::envelope::PlanningState;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit order-independent content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u32);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint an arbitrary JSON value
pub fn fingerprint_value(value: &Value) -> Fingerprint {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    Fingerprint(fnv1a_utf16(&canonical))
}

/// Fingerprint a planning state, ignoring its capture time
pub fn fingerprint(state: &PlanningState) -> Fingerprint {
    fingerprint_value(&state.content_value())
}

/// Serialize with object keys in lexicographic order
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

fn fnv1a_utf16(s: &str) -> u32 {
    s.encode_utf16().fold(FNV_OFFSET, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, json};

    #[test]
    fn test_known_vectors() {
        // FNV-1a reference values
        assert_eq!(fnv1a_utf16(""), 0x811c_9dc5);
        assert_eq!(fnv1a_utf16("a"), 0xe40c_292c);
    }

    #[test]
    fn test_renders_unsigned_decimal() {
        assert_eq!(Fingerprint(0xe40c_292c).to_string(), "3826002220");
    }

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let value = json!({ "b": 1, "a": { "z": [ { "y": 1, "x": 2 } ], "c": null } });
        assert_eq!(
            canonical_string(&value),
            r#"{"a":{"c":null,"z":[{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            fingerprint_value(&json!([1, 2])),
            fingerprint_value(&json!([2, 1]))
        );
    }

    #[test]
    fn test_state_fingerprint_ignores_timestamp() {
        let a = PlanningState::empty(10.0);
        let b = PlanningState::empty(99_999.0);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_distinct_instances_match() {
        let mut a = PlanningState::empty(0.0);
        a.route.head.date = "2024-05-01".into();
        let b = a.clone();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        let mut c = a.clone();
        c.route.legs[0].destination_code = "EDDM".into();
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    proptest! {
        #[test]
        fn prop_key_insertion_order_irrelevant(
            entries in proptest::collection::btree_map("[a-z]{1,6}", "[A-Z0-9]{0,5}", 0..12),
            seed in any::<u64>(),
        ) {
            let forward: Map<String, Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();

            // Rebuild with a shuffled insertion order
            let mut pairs: Vec<_> = entries.into_iter().collect();
            let len = pairs.len().max(1) as u64;
            pairs.rotate_left((seed % len) as usize);
            pairs.reverse();
            let mut shuffled = Map::new();
            for (k, v) in pairs {
                shuffled.insert(k, Value::String(v));
            }

            let a = json!({ "fuel": { "fields": Value::Object(forward) } });
            let b = json!({ "fuel": { "fields": Value::Object(shuffled) } });
            prop_assert_eq!(fingerprint_value(&a), fingerprint_value(&b));
        }
    }
}
