//! Field Descriptor Tree synthesis.
//!
//! [`synthesize`] walks the resolved schema from the root and describes every
//! input a renderer has to draw: one [`FieldDescriptor`] per position, each
//! carrying a [`Widget`]. It is pure: no I/O, no store mutation. The store is
//! only read for the structural choices a user has already made (selected
//! `oneOf` variant, array slot count, pattern entry keys).
//!
//! Schema problems never abort synthesis. They become [`Widget::Message`]
//! descriptors scoped to the affected field, and the rest of the tree is
//! built as usual.

use serde::Serialize;
use serde_json::Value;

use crate::config::SessionOptions;
use crate::hints::pattern_hint;
use crate::path::FieldPath;
use crate::resolver::{
    ArrayShape, ObjectShape, OneOfShape, PrimitiveKind, PrimitiveShape, Resolved, ResolvedNode,
    Resolver,
};
use crate::schema_utils::display_literal;
use crate::store::{ItemBounds, LiveValueStore};

/// One input position in the form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub path: FieldPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(flatten)]
    pub widget: Widget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    Object {
        fields: Vec<FieldDescriptor>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dynamic: Option<DynamicGroup>,
    },
    Array(RepeatableSlots),
    Primitive(PrimitiveInput),
    OneOf {
        /// One label per variant, in declaration order.
        options: Vec<String>,
        selected: usize,
        /// Descriptor of the selected variant, at the same path.
        active: Box<FieldDescriptor>,
    },
    /// A terminal explanation in place of an input.
    Message { text: String },
}

/// Zero-or-more name/value entries governed by `patternProperties`.
///
/// Entries live at `<object path>[i]`; the user-chosen name is stored as
/// the entry's key, so renaming never moves the path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicGroup {
    pub patterns: Vec<String>,
    pub entries: Vec<DynamicEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicEntry {
    pub key: Option<String>,
    /// False when the key is set but matches no pattern, or collides with a
    /// declared property. Such entries are not collected.
    pub key_valid: bool,
    pub value: FieldDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatableSlots {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    /// Slot count before the user adds or removes anything.
    pub initial_slots: usize,
    pub can_add: bool,
    pub can_remove: bool,
    pub slots: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimitiveInput {
    #[serde(rename = "type")]
    pub kind: PrimitiveKind,
    /// Allowed values: the `enum` list, or the single `const`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDescriptor {
    /// Find the descriptor at `path` in this subtree. For a `oneOf` path the
    /// selector itself is returned, not its active variant.
    pub fn find(&self, path: &FieldPath) -> Option<&FieldDescriptor> {
        if &self.path == path {
            return Some(self);
        }
        if !path.is_descendant_of(&self.path) && !self.path.is_root() {
            return None;
        }
        match &self.widget {
            Widget::Object { fields, dynamic } => fields
                .iter()
                .find_map(|f| f.find(path))
                .or_else(|| {
                    dynamic
                        .as_ref()?
                        .entries
                        .iter()
                        .find_map(|e| e.value.find(path))
                }),
            Widget::Array(slots) => slots.slots.iter().find_map(|s| s.find(path)),
            // The active variant shares this path; only its children differ.
            Widget::OneOf { active, .. } => active.find(path),
            _ => None,
        }
    }
}

/// Build the descriptor tree for the schema behind `resolver`.
pub fn synthesize(
    resolver: &Resolver<'_>,
    store: &LiveValueStore,
    options: &SessionOptions,
) -> FieldDescriptor {
    let synth = Synthesizer {
        resolver,
        store,
        options,
    };
    synth.field(resolver.resolve_root(), FieldPath::root(), None, false, 0)
}

struct Synthesizer<'r, 'a> {
    resolver: &'r Resolver<'a>,
    store: &'r LiveValueStore,
    options: &'r SessionOptions,
}

impl Synthesizer<'_, '_> {
    fn field(
        &self,
        resolved: Resolved,
        path: FieldPath,
        name: Option<&str>,
        required: bool,
        depth: usize,
    ) -> FieldDescriptor {
        let (title, description) = annotations(&resolved.node);
        let title = title.or_else(|| name.map(String::from));

        if depth > self.options.max_depth {
            tracing::debug!(%path, depth, "descriptor depth limit reached");
            return FieldDescriptor {
                path,
                title,
                description,
                required,
                widget: Widget::Message {
                    text: format!(
                        "Nesting deeper than {} levels is not shown.",
                        self.options.max_depth
                    ),
                },
            };
        }

        tracing::trace!(%path, "synthesizing field");
        let widget = match &resolved.node {
            ResolvedNode::Object(shape) => self.object(shape, &resolved, &path, depth),
            ResolvedNode::Array(shape) => self.array(shape, &resolved, &path, depth),
            ResolvedNode::Primitive(shape) => Widget::Primitive(primitive_input(shape)),
            ResolvedNode::OneOf(shape) => self.one_of(shape, &resolved, &path, name, depth),
            other => Widget::Message {
                text: other.explanation().unwrap_or_default(),
            },
        };

        FieldDescriptor {
            path,
            title,
            description,
            required,
            widget,
        }
    }

    fn object(
        &self,
        shape: &ObjectShape,
        resolved: &Resolved,
        path: &FieldPath,
        depth: usize,
    ) -> Widget {
        let fields = shape
            .properties
            .iter()
            .map(|(name, schema)| {
                let child = self.resolver.resolve(schema, &resolved.trail);
                self.field(
                    child,
                    path.child(name.clone()),
                    Some(name),
                    shape.required.contains(name),
                    depth + 1,
                )
            })
            .collect();

        let dynamic = (!shape.pattern_properties.is_empty()).then(|| {
            let count = self.store.count(path).unwrap_or(0);
            let entries = (0..count)
                .filter_map(|i| {
                    let entry_path = path.item(i);
                    let key = self.store.key(&entry_path).map(String::from);
                    let key_valid = match key.as_deref() {
                        Some(k) => !shape.is_declared(k) && shape.matching_pattern(k).is_some(),
                        None => true,
                    };
                    let schema = shape.entry_schema(key.as_deref())?;
                    let child = self.resolver.resolve(schema, &resolved.trail);
                    let value = self.field(child, entry_path, None, false, depth + 1);
                    Some(DynamicEntry {
                        key,
                        key_valid,
                        value,
                    })
                })
                .collect();
            DynamicGroup {
                patterns: shape
                    .pattern_properties
                    .iter()
                    .map(|(p, _)| p.clone())
                    .collect(),
                entries,
            }
        });

        Widget::Object { fields, dynamic }
    }

    fn array(
        &self,
        shape: &ArrayShape,
        resolved: &Resolved,
        path: &FieldPath,
        depth: usize,
    ) -> Widget {
        let initial_slots = self.options.initial_slots(shape.min_items);
        let count = self.store.count(path).unwrap_or(initial_slots);
        let bounds = ItemBounds {
            min_items: shape.min_items,
            max_items: shape.max_items,
        };

        let slots = (0..count)
            .map(|i| {
                let item = self.resolver.resolve(&shape.items, &resolved.trail);
                self.field(item, path.item(i), None, false, depth + 1)
            })
            .collect();

        Widget::Array(RepeatableSlots {
            min_items: shape.min_items,
            max_items: shape.max_items,
            initial_slots,
            can_add: bounds.allows_add(count),
            can_remove: bounds.allows_remove(count),
            slots,
        })
    }

    fn one_of(
        &self,
        shape: &OneOfShape,
        resolved: &Resolved,
        path: &FieldPath,
        name: Option<&str>,
        depth: usize,
    ) -> Widget {
        let options: Vec<String> = (0..shape.variants.len())
            .map(|i| {
                let variant = self.resolver.resolve_variant(shape, i, &resolved.trail);
                variant_label(&shape.variants[i], &variant.node, i)
            })
            .collect();

        let stored = self.store.variant(path).unwrap_or(0);
        let selected = if stored < shape.variants.len() { stored } else { 0 };
        let variant = self.resolver.resolve_variant(shape, selected, &resolved.trail);
        // The variant occupies the same path and depth. Self-referencing
        // variants end at the resolver's cycle marker.
        let active = self.field(variant, path.clone(), name, false, depth);

        Widget::OneOf {
            options,
            selected,
            active: Box::new(active),
        }
    }
}

fn annotations(node: &ResolvedNode) -> (Option<String>, Option<String>) {
    match node {
        ResolvedNode::Object(s) => (s.title.clone(), s.description.clone()),
        ResolvedNode::Array(s) => (s.title.clone(), s.description.clone()),
        ResolvedNode::Primitive(s) => (s.title.clone(), s.description.clone()),
        ResolvedNode::OneOf(s) => (s.title.clone(), s.description.clone()),
        _ => (None, None),
    }
}

/// Label for a `oneOf` option: the variant's title, else its constant,
/// else "Option N".
fn variant_label(raw: &Value, resolved: &ResolvedNode, index: usize) -> String {
    if let Some(title) = raw.get("title").and_then(Value::as_str) {
        return title.to_string();
    }
    if let (Some(title), _) = annotations(resolved) {
        return title;
    }
    if let ResolvedNode::Primitive(PrimitiveShape {
        const_value: Some(c),
        ..
    }) = resolved
    {
        return display_literal(c);
    }
    format!("Option {}", index + 1)
}

fn primitive_input(shape: &PrimitiveShape) -> PrimitiveInput {
    let choices = shape
        .enum_values
        .clone()
        .or_else(|| shape.const_value.clone().map(|c| vec![c]));
    PrimitiveInput {
        kind: shape.kind,
        choices,
        const_value: shape.const_value.clone(),
        minimum: shape.minimum,
        maximum: shape.maximum,
        exclusive_minimum: shape.exclusive_minimum,
        exclusive_maximum: shape.exclusive_maximum,
        min_length: shape.min_length,
        max_length: shape.max_length,
        pattern: shape.pattern.clone(),
        pattern_hint: shape.pattern.as_deref().and_then(pattern_hint),
        format: shape.format.clone(),
        default: shape.default.clone(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
