//! Attribute Merger (§4.B).
//!
//! Combines the attribute dictionaries attached to each worker's write task
//! into one group-level attribute set, applying per-key-prefix merge rules
//! grounded in `combine_xr_attributes` from the original processing pipeline.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::error::WriteError;

/// Merge a sequence of attribute dictionaries (one per write task, applied in
/// order) into a single combined attribute set.
///
/// Merge rules by key prefix:
/// - `install*`: value must be a JSON object. `raw_file_name` and
///   `survey_identifier` are extracted into top-level `multibeam_files` and
///   `survey_number` lists; the remaining object is kept only if it differs
///   from the most recently buffered `install*` object.
/// - `runtime*`: value must be a JSON object. `Counter`, `MinDepth`, and
///   `MaxDepth` are stripped before comparing against the most recently
///   buffered `runtime*` object (so run after run of otherwise-identical
///   settings collapses to the distinct ones), then `Counter` is restored.
/// - `system_serial_number` / `secondary_system_serial_number`: every
///   distinct value observed is retained, in first-seen order.
/// - `profile*`: kept only once per distinct value, in lexicographic key
///   order (so the earliest-timestamped cast record wins ties).
/// - `min*` / `max*`: numeric reduction across all observations.
/// - `xyzrph`: a two-level `field -> timestamp -> value` mapping of
///   lever-arm/offset records. A timestamp whose full across-field value
///   vector already matches an earlier-kept timestamp's vector is dropped;
///   the attribute is omitted entirely if nothing survives dedup.
/// - anything else: last-writer-wins among same-type values; a value whose
///   JSON type differs from the type already recorded for that key is an
///   error rather than a silent overwrite.
///
/// # Errors
/// Returns [`WriteError::AttributeConflict`] if an `install*` or `runtime*`
/// key's value is not a JSON object, if `xyzrph` (or one of its per-field
/// entries) is not a JSON object, or if an uncategorized key's value changes
/// JSON type across datasets.
pub fn combine_attributes(datasets: &[Map<String, Value>]) -> Result<Map<String, Value>, WriteError> {
    let mut finaldict: Map<String, Value> = Map::new();
    let mut buffered_install: Option<Value> = None;
    let mut buffered_runtime: Option<Value> = None;
    let mut fnames: Vec<String> = Vec::new();
    let mut survey_nums: Vec<String> = Vec::new();
    let mut cast_dump: BTreeMap<String, Value> = BTreeMap::new();
    let mut serials: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut xyzrph: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();

    for attrs in datasets {
        for (k, v) in attrs {
            if k.starts_with("install") {
                let mut obj = require_object(k, v)?;
                if let Some(Value::String(fname)) = obj.remove("raw_file_name") {
                    if !fnames.contains(&fname) {
                        fnames.push(fname);
                    }
                }
                if let Some(Value::String(sname)) = obj.remove("survey_identifier") {
                    if !survey_nums.contains(&sname) {
                        survey_nums.push(sname);
                    }
                }
                let remainder = Value::Object(obj);
                if buffered_install.as_ref() == Some(&remainder) {
                    // duplicate of the most recent distinct install block, drop it
                } else {
                    buffered_install = Some(remainder.clone());
                    finaldict.insert(k.clone(), remainder);
                }
            } else if k.starts_with("runtime") {
                let mut obj = require_object(k, v)?;
                let counter = obj.remove("Counter");
                obj.remove("MinDepth");
                obj.remove("MaxDepth");
                let remainder = Value::Object(obj);
                if buffered_runtime.as_ref() == Some(&remainder) {
                    // duplicate of the most recent distinct runtime block, drop it
                } else {
                    buffered_runtime = Some(remainder);
                    let mut full = require_object(k, v)?;
                    if let Some(c) = counter {
                        full.insert("Counter".to_string(), c);
                    }
                    finaldict.insert(k.clone(), Value::Object(full));
                }
            } else if k == "system_serial_number" || k == "secondary_system_serial_number" {
                let list = serials.entry(k.clone()).or_default();
                // a previously merged round already stored this as an array; re-ingest
                // its elements instead of nesting the whole array as one entry
                match v {
                    Value::Array(items) => {
                        for item in items {
                            if !list.contains(item) {
                                list.push(item.clone());
                            }
                        }
                    }
                    other => {
                        if !list.contains(other) {
                            list.push(other.clone());
                        }
                    }
                }
            } else if k == "multibeam_files" {
                if let Value::Array(items) = v {
                    for item in items {
                        if let Value::String(s) = item {
                            if !fnames.contains(s) {
                                fnames.push(s.clone());
                            }
                        }
                    }
                }
            } else if k == "survey_number" {
                if let Value::Array(items) = v {
                    for item in items {
                        if let Value::String(s) = item {
                            if !survey_nums.contains(s) {
                                survey_nums.push(s.clone());
                            }
                        }
                    }
                }
            } else if k.starts_with("profile") {
                cast_dump.insert(k.clone(), v.clone());
            } else if k == "xyzrph" {
                let obj = require_object(k, v)?;
                for (field, tsmap_val) in obj {
                    let tsmap = require_object(k, &tsmap_val)?;
                    let field_entry = xyzrph.entry(field).or_default();
                    for (ts, val) in tsmap {
                        field_entry.insert(ts, val);
                    }
                }
            } else if let Some(rest) = k.strip_prefix("min") {
                let _ = rest;
                reduce_numeric(&mut finaldict, k, v, f64::min);
            } else if let Some(rest) = k.strip_prefix("max") {
                let _ = rest;
                reduce_numeric(&mut finaldict, k, v, f64::max);
            } else {
                match finaldict.get(k) {
                    Some(existing) => {
                        let previous_type = value_type_name(existing);
                        let new_type = value_type_name(v);
                        if previous_type != new_type {
                            return Err(WriteError::AttributeConflict { key: k.clone(), previous_type, new_type });
                        }
                        finaldict.insert(k.clone(), v.clone());
                    }
                    None => {
                        finaldict.insert(k.clone(), v.clone());
                    }
                }
            }
        }
    }

    if !fnames.is_empty() {
        fnames.sort();
        finaldict.insert("multibeam_files".to_string(), Value::Array(fnames.into_iter().map(Value::String).collect()));
    }
    if !survey_nums.is_empty() {
        survey_nums.sort();
        finaldict.insert("survey_number".to_string(), Value::Array(survey_nums.into_iter().map(Value::String).collect()));
    }
    for (k, list) in serials {
        finaldict.insert(k, Value::Array(list));
    }
    if !cast_dump.is_empty() {
        let mut unique_casts: Vec<Value> = Vec::new();
        for (k, v) in cast_dump {
            if !unique_casts.contains(&v) {
                unique_casts.push(v.clone());
                finaldict.insert(k, v);
            }
        }
    }
    if let Some(rebuilt) = dedup_xyzrph(&xyzrph) {
        finaldict.insert("xyzrph".to_string(), Value::Object(rebuilt));
    }

    Ok(finaldict)
}

/// Drop any timestamp whose full across-field value vector duplicates an
/// earlier-kept timestamp's vector. Returns `None` if nothing survives.
fn dedup_xyzrph(xyzrph: &BTreeMap<String, BTreeMap<String, Value>>) -> Option<Map<String, Value>> {
    if xyzrph.is_empty() {
        return None;
    }
    let fields: Vec<&String> = xyzrph.keys().collect();
    let mut all_timestamps: BTreeSet<&String> = BTreeSet::new();
    for tsmap in xyzrph.values() {
        all_timestamps.extend(tsmap.keys());
    }

    let mut seen_vectors: Vec<Vec<Option<Value>>> = Vec::new();
    let mut kept_timestamps: Vec<&String> = Vec::new();
    for ts in all_timestamps {
        let vector: Vec<Option<Value>> = fields.iter().map(|f| xyzrph[*f].get(ts).cloned()).collect();
        if seen_vectors.contains(&vector) {
            continue;
        }
        seen_vectors.push(vector);
        kept_timestamps.push(ts);
    }

    let mut rebuilt = Map::new();
    for field in fields {
        let mut tsmap = Map::new();
        for &ts in &kept_timestamps {
            if let Some(val) = xyzrph[field].get(ts) {
                tsmap.insert(ts.clone(), val.clone());
            }
        }
        if !tsmap.is_empty() {
            rebuilt.insert(field.clone(), Value::Object(tsmap));
        }
    }
    if rebuilt.is_empty() {
        None
    } else {
        Some(rebuilt)
    }
}

/// Accept either a native JSON object or, matching `combine_xr_attributes`'s
/// `json.loads(v)`, a string holding a serialized JSON object.
fn require_object(key: &str, v: &Value) -> Result<Map<String, Value>, WriteError> {
    match v {
        Value::Object(m) => Ok(m.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(m)) => Ok(m),
            Ok(parsed) => Err(WriteError::AttributeConflict {
                key: key.to_string(),
                previous_type: "object",
                new_type: value_type_name(&parsed),
            }),
            Err(_) => Err(WriteError::AttributeConflict {
                key: key.to_string(),
                previous_type: "object",
                new_type: "string (not valid JSON)",
            }),
        },
        other => Err(WriteError::AttributeConflict {
            key: key.to_string(),
            previous_type: "object",
            new_type: value_type_name(other),
        }),
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn reduce_numeric(finaldict: &mut Map<String, Value>, key: &str, v: &Value, reduce: impl Fn(f64, f64) -> f64) {
    let Some(incoming) = v.as_f64() else {
        finaldict.entry(key.to_string()).or_insert_with(|| v.clone());
        return;
    };
    match finaldict.get(key).and_then(Value::as_f64) {
        Some(existing) => {
            finaldict.insert(key.to_string(), serde_json::json!(reduce(existing, incoming)));
        }
        None => {
            finaldict.insert(key.to_string(), v.clone());
        }
    }
}
