//! Shared schema utilities for pointer handling and child traversal.
//!
//! Provides three concerns used across the resolver, pre-resolution and
//! validation modules:
//! 1. **JSON Pointer escaping** (RFC 6901) and pointer lookup
//! 2. **Keyword lists** naming every schema-bearing keyword
//! 3. **`$anchor` scanning** for plain-name fragment refs

use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// JSON Pointer escaping (RFC 6901)
// ---------------------------------------------------------------------------

/// Escape a single path segment per RFC 6901.
///
/// - `~` → `~0`
/// - `/` → `~1`
///
/// Returns `Cow::Borrowed` when no escaping is needed (the common case).
pub fn escape_pointer_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains('~') || segment.contains('/') {
        Cow::Owned(segment.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Unescape a single path segment per RFC 6901.
///
/// - `~1` → `/`
/// - `~0` → `~`
///
/// Order matters: unescape `~1` first to avoid double-unescaping.
pub fn unescape_pointer_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains("~0") || segment.contains("~1") {
        Cow::Owned(segment.replace("~1", "/").replace("~0", "~"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Split a JSON Pointer path into decoded segments.
///
/// Strips the leading `#` fragment identifier (if present), splits on `/`,
/// and unescapes each segment per RFC 6901.
///
/// # Example
/// ```
/// use jsonschema_form_core::schema_utils::split_path;
/// assert_eq!(split_path("#/properties/a~1b/items"), vec!["properties", "a/b", "items"]);
/// assert_eq!(split_path("#"), Vec::<String>::new());
/// ```
pub fn split_path(path: &str) -> Vec<String> {
    let stripped = path.strip_prefix('#').unwrap_or(path);

    if stripped.is_empty() {
        return Vec::new();
    }

    let mut segments_iter = stripped.split('/');

    // A leading "/" produces an initial empty segment that represents the
    // root. Later empty segments are significant ("#/" is the "" key).
    if stripped.starts_with('/') {
        segments_iter.next();
    }

    segments_iter
        .map(|s| unescape_pointer_segment(s).into_owned())
        .collect()
}

/// Walk `root` along a JSON Pointer fragment (`#`, `#/a/b`, or `/a/b`).
///
/// Returns `None` when any segment is missing, an array index is not a
/// number, or the walk steps into a scalar.
pub fn resolve_pointer<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let stripped = pointer.strip_prefix('#').unwrap_or(pointer);
    if !stripped.is_empty() && !stripped.starts_with('/') {
        return None;
    }

    let mut current = root;
    for key in split_path(stripped) {
        current = match current {
            Value::Object(obj) => obj.get(&key)?,
            Value::Array(arr) => arr.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ---------------------------------------------------------------------------
// Keyword lists — single source of truth
// ---------------------------------------------------------------------------

/// Keywords whose values are maps of schemas (each map entry is a sub-schema).
pub(crate) const MAP_KEYWORDS: &[&str] = &[
    "properties",
    "patternProperties",
    "$defs",
    "definitions",
    "dependentSchemas",
];

/// Keywords whose values are single sub-schemas (when the value is an object).
pub(crate) const SINGLE_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "unevaluatedProperties",
    "propertyNames",
    "unevaluatedItems",
    "contains",
    "not",
    "if",
    "then",
    "else",
    "additionalItems",
];

/// Keywords whose values are arrays of sub-schemas.
pub(crate) const ARRAY_KEYWORDS: &[&str] = &["anyOf", "oneOf", "allOf", "prefixItems"];

/// Visit every direct sub-schema of a schema object, mutably.
///
/// Covers [`MAP_KEYWORDS`], [`SINGLE_KEYWORDS`], [`ARRAY_KEYWORDS`] and
/// `items` in both object and tuple form. Values under a keyword that do
/// not have the expected shape are left untouched.
pub(crate) fn for_each_subschema_mut<F>(obj: &mut Map<String, Value>, mut visit: F)
where
    F: FnMut(&mut Value),
{
    for keyword in MAP_KEYWORDS {
        if let Some(Value::Object(map)) = obj.get_mut(*keyword) {
            map.values_mut().for_each(&mut visit);
        }
    }
    for keyword in SINGLE_KEYWORDS {
        if let Some(child) = obj.get_mut(*keyword) {
            if child.is_object() {
                visit(child);
            }
        }
    }
    for keyword in ARRAY_KEYWORDS {
        if let Some(Value::Array(arr)) = obj.get_mut(*keyword) {
            arr.iter_mut().for_each(&mut visit);
        }
    }
    match obj.get_mut("items") {
        Some(child @ Value::Object(_)) => visit(child),
        Some(Value::Array(arr)) => arr.iter_mut().for_each(&mut visit),
        _ => {}
    }
}

/// Read-only counterpart of [`for_each_subschema_mut`].
pub(crate) fn for_each_subschema<'a, F>(obj: &'a Map<String, Value>, mut visit: F)
where
    F: FnMut(&'a Value),
{
    for keyword in MAP_KEYWORDS {
        if let Some(Value::Object(map)) = obj.get(*keyword) {
            map.values().for_each(&mut visit);
        }
    }
    for keyword in SINGLE_KEYWORDS {
        if let Some(child) = obj.get(*keyword) {
            if child.is_object() {
                visit(child);
            }
        }
    }
    for keyword in ARRAY_KEYWORDS {
        if let Some(Value::Array(arr)) = obj.get(*keyword) {
            arr.iter().for_each(&mut visit);
        }
    }
    match obj.get("items") {
        Some(child @ Value::Object(_)) => visit(child),
        Some(Value::Array(arr)) => arr.iter().for_each(&mut visit),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// $anchor scanning
// ---------------------------------------------------------------------------

/// Build a map of `$anchor` name → JSON Pointer for one document.
///
/// First-wins: when the same anchor is declared twice, the first occurrence
/// in document order is kept.
pub(crate) fn build_anchor_map(document: &Value) -> HashMap<String, String> {
    let mut map = HashMap::new();
    scan_anchors(document, "#", &mut map);
    map
}

fn scan_anchors(node: &Value, pointer: &str, map: &mut HashMap<String, String>) {
    let obj = match node {
        Value::Object(obj) => obj,
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                scan_anchors(item, &format!("{}/{}", pointer, i), map);
            }
            return;
        }
        _ => return,
    };

    if let Some(anchor) = obj.get("$anchor").and_then(Value::as_str) {
        map.entry(anchor.to_string())
            .or_insert_with(|| pointer.to_string());
    }

    for (key, val) in obj {
        // Literal data can look like schemas; only walk schema positions.
        if matches!(key.as_str(), "enum" | "const" | "default" | "examples") {
            continue;
        }
        let child_pointer = format!("{}/{}", pointer, escape_pointer_segment(key));
        scan_anchors(val, &child_pointer, map);
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Return the JSON type name for a value.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a literal for use in a human-readable message: strings bare,
/// everything else as compact JSON.
pub(crate) fn display_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
