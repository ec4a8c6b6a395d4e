//! Data collection: from the sparse [`LiveValueStore`] back to one JSON
//! document.
//!
//! [`collect`] walks the resolved schema and the store in parallel. It never
//! mutates either, so two calls with the same inputs give the same document.
//!
//! Pruning: below the root, a value contributes only when it is
//! *meaningful*, i.e. not an empty array and not an empty object. An empty
//! string typed into a string field is kept. The root object/array is always
//! returned, even when empty.
//!
//! Leaf coercion never fails loudly: text that does not parse as the field's
//! kind yields no value. Validation is what reports it.
//!
//! | Kind | Accepted input |
//! |------|----------------|
//! | `string` | any text, as-is |
//! | `integer` | trimmed decimal text with an integral, finite value |
//! | `number` | trimmed decimal text with a finite value |
//! | `boolean` | `"true"` / `"false"`, or a stored boolean |
//! | `null` | `"null"` |

use serde_json::{Map, Number, Value};

use crate::config::SessionOptions;
use crate::path::FieldPath;
use crate::resolver::{PrimitiveKind, PrimitiveShape, Resolved, ResolvedNode, Resolver};
use crate::schema_utils::display_literal;
use crate::store::{LeafValue, LiveValueStore};

/// Re-derive the document from the store. `None` when the root is a leaf
/// with no usable value, or an error node.
pub fn collect(
    resolver: &Resolver<'_>,
    store: &LiveValueStore,
    options: &SessionOptions,
) -> Option<Value> {
    let collector = Collector {
        resolver,
        store,
        options,
    };
    collector.node(resolver.resolve_root(), &FieldPath::root(), 0)
}

/// Whether a collected value is worth keeping under its parent.
pub fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

struct Collector<'r, 'a> {
    resolver: &'r Resolver<'a>,
    store: &'r LiveValueStore,
    options: &'r SessionOptions,
}

impl Collector<'_, '_> {
    fn node(&self, resolved: Resolved, path: &FieldPath, depth: usize) -> Option<Value> {
        if depth > self.options.max_depth {
            return None;
        }
        let resolved = self.resolver.active(resolved, path, self.store);

        match &resolved.node {
            ResolvedNode::Object(shape) => {
                let mut out = Map::new();
                for (name, schema) in &shape.properties {
                    let child = self.resolver.resolve(schema, &resolved.trail);
                    if let Some(value) = self.child(child, &path.child(name.clone()), depth) {
                        out.insert(name.clone(), value);
                    }
                }

                if !shape.pattern_properties.is_empty() {
                    for i in 0..self.store.count(path).unwrap_or(0) {
                        let entry = path.item(i);
                        let Some(key) = self.store.key(&entry) else {
                            continue;
                        };
                        if shape.is_declared(key) || out.contains_key(key) {
                            continue;
                        }
                        let Some((_, schema)) = shape.matching_pattern(key) else {
                            tracing::debug!(%key, "dropping entry that matches no pattern");
                            continue;
                        };
                        let child = self.resolver.resolve(schema, &resolved.trail);
                        if let Some(value) = self.child(child, &entry, depth) {
                            out.insert(key.to_string(), value);
                        }
                    }
                }

                Some(Value::Object(out))
            }

            ResolvedNode::Array(shape) => {
                let count = self
                    .store
                    .count(path)
                    .unwrap_or_else(|| self.options.initial_slots(shape.min_items));
                let mut items = Vec::new();
                for i in 0..count {
                    let slot = path.item(i);
                    let item = self.resolver.resolve(&shape.items, &resolved.trail);
                    let item = self.resolver.active(item, &slot, self.store);
                    let value = match &item.node {
                        ResolvedNode::Primitive(p) => {
                            self.leaf(p, &slot).filter(|v| v.as_str() != Some(""))
                        }
                        _ => self.child(item, &slot, depth),
                    };
                    items.extend(value);
                }
                Some(Value::Array(items))
            }

            ResolvedNode::Primitive(shape) => self.leaf(shape, path),

            // `active` never returns a OneOf; error nodes collect nothing.
            _ => None,
        }
    }

    /// Collect a non-root child, applying the meaningful-value rule.
    fn child(&self, resolved: Resolved, path: &FieldPath, depth: usize) -> Option<Value> {
        self.node(resolved, path, depth + 1)
            .filter(is_meaningful)
    }

    fn leaf(&self, shape: &PrimitiveShape, path: &FieldPath) -> Option<Value> {
        if let Some(constant) = &shape.const_value {
            return Some(constant.clone());
        }
        let stored = self.store.value(path)?;
        if let Some(members) = &shape.enum_values {
            if let Some(member) = match_enum(stored, members) {
                return Some(member);
            }
        }
        coerce(stored, shape.kind)
    }
}

/// The enum member a stored value denotes, compared by display text.
fn match_enum(stored: &LeafValue, members: &[Value]) -> Option<Value> {
    members
        .iter()
        .find(|member| match (stored, member) {
            (LeafValue::Bool(b), Value::Bool(m)) => b == m,
            (LeafValue::Text(text), member) => display_literal(member) == *text,
            _ => false,
        })
        .cloned()
}

/// Coerce a stored leaf to `kind`. `None` when the input does not denote a
/// value of that kind.
pub fn coerce(stored: &LeafValue, kind: PrimitiveKind) -> Option<Value> {
    match (kind, stored) {
        (PrimitiveKind::String, LeafValue::Text(s)) => Some(Value::String(s.clone())),
        (PrimitiveKind::String, LeafValue::Bool(b)) => Some(Value::String(b.to_string())),
        (PrimitiveKind::Boolean, LeafValue::Bool(b)) => Some(Value::Bool(*b)),
        (PrimitiveKind::Boolean, LeafValue::Text(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (PrimitiveKind::Null, LeafValue::Text(s)) if s == "null" => Some(Value::Null),
        (PrimitiveKind::Integer, LeafValue::Text(s)) => parse_integer(s.trim()),
        (PrimitiveKind::Number, LeafValue::Text(s)) => parse_number(s.trim()),
        _ => None,
    }
}

fn parse_integer(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Some(Value::Number(n.into()));
    }
    let f = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    // Integral values written with a fraction or exponent, e.g. "3.0" or "1e3".
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::Number((f as i64).into()))
    } else {
        None
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Some(Value::Number(n.into()));
    }
    let f = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Number::from_f64(f).map(Value::Number)
}

// ===========================================================================
// Tests
// ===========================================================================
