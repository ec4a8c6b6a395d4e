//! Combinator normalization: `allOf` deep merge and unsupported-keyword
//! detection.
//!
//! Merge semantics:
//! - `properties` merge key by key; a key present on both sides is merged
//!   recursively when both values are schema objects, otherwise the later
//!   value wins.
//! - `required` arrays are unioned (set semantics, first-seen order kept).
//! - every other keyword is last-wins in declaration order.
//!
//! All functions take their inputs by value and never touch the caller's
//! schema document; callers clone out of the immutable root.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Keywords that the form engine cannot turn into inputs. Their presence
/// produces an "unsupported" marker instead of a silently dropped field.
const UNSUPPORTED_KEYWORDS: &[&str] = &["anyOf", "$recursiveRef", "$dynamicRef"];

/// Fold N schema objects into one via pairwise merge, left to right.
pub fn merge_all_of<I>(schemas: I) -> Map<String, Value>
where
    I: IntoIterator<Item = Map<String, Value>>,
{
    let mut iter = schemas.into_iter();
    let mut acc = iter.next().unwrap_or_default();
    for overlay in iter {
        acc = merge_two(acc, overlay);
    }
    acc
}

/// Merge two schema objects. `overlay` wins on scalar-keyword conflicts.
pub fn merge_two(base: Map<String, Value>, overlay: Map<String, Value>) -> Map<String, Value> {
    let mut result = base;
    for (key, value) in overlay {
        match key.as_str() {
            "properties" => merge_properties(&mut result, value),
            "required" => merge_required(&mut result, value),
            _ => {
                result.insert(key, value);
            }
        }
    }
    result
}

/// Merge `properties`: shared keys merge recursively, new keys are appended.
fn merge_properties(result: &mut Map<String, Value>, overlay_val: Value) {
    let Value::Object(overlay_props) = overlay_val else {
        result.insert("properties".to_string(), overlay_val);
        return;
    };
    let base_props = result
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(base_map) = base_props.as_object_mut() else {
        *base_props = Value::Object(overlay_props);
        return;
    };
    for (name, overlay_schema) in overlay_props {
        // Merge in place so a shared key keeps its first-declared position.
        if let Some(existing) = base_map.get_mut(&name) {
            *existing = match (std::mem::take(existing), overlay_schema) {
                (Value::Object(a), Value::Object(b)) => Value::Object(merge_two(a, b)),
                (_, other) => other,
            };
        } else {
            base_map.insert(name, overlay_schema);
        }
    }
}

/// Union `required` arrays (deduplicated, non-strings ignored).
fn merge_required(result: &mut Map<String, Value>, overlay_val: Value) {
    let Value::Array(overlay_arr) = overlay_val else {
        return;
    };
    let base_req = result
        .entry("required")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !base_req.is_array() {
        *base_req = Value::Array(Vec::new());
    }
    let Some(base_arr) = base_req.as_array_mut() else {
        return;
    };
    let mut seen: HashSet<String> = base_arr
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    for item in overlay_arr {
        if let Some(s) = item.as_str() {
            if seen.insert(s.to_string()) {
                base_arr.push(item);
            }
        }
    }
}

/// The first keyword on this node the form engine cannot render, if any.
pub fn unsupported_keyword(obj: &Map<String, Value>) -> Option<&'static str> {
    UNSUPPORTED_KEYWORDS
        .iter()
        .copied()
        .find(|kw| obj.contains_key(*kw))
}

/// Split a `oneOf` node into its shared sibling keywords and its variants.
///
/// Returns `None` when `oneOf` is absent or not an array. The siblings are
/// merged into whichever variant is active, so `{properties: {id}, oneOf:
/// [...]}` keeps `id` in every alternative.
pub fn split_one_of(obj: &Map<String, Value>) -> Option<(Map<String, Value>, Vec<Value>)> {
    let variants = obj.get("oneOf")?.as_array()?.clone();
    let mut base = obj.clone();
    base.remove("oneOf");
    Some((base, variants))
}

// ===========================================================================
// Tests
// ===========================================================================
