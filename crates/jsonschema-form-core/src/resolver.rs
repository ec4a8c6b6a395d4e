//! Reference resolution and shape classification.
//!
//! [`Resolver`] turns a raw schema node into a [`ResolvedNode`]: the
//! effective shape at that position after following `$ref` (internal
//! pointers, `$anchor` names, and cached external documents) and folding
//! `allOf`. Resolution is recomputed on demand from the immutable root
//! document, so it always reflects the schema currently loaded.
//!
//! ## Cycle detection
//!
//! Every call threads a [`RefTrail`], the set of references already followed
//! on the way to this node. The trail is immutable: following a ref produces
//! an extended copy, so sibling branches never see each other's refs and a
//! diamond (two properties pointing at the same definition) resolves twice,
//! independently. Meeting a ref that is already on the trail yields
//! [`ResolvedNode::CircularRef`].
//!
//! `allOf` members are resolved on independent copies of the trail; the
//! merged node continues with the union of those copies, so recursion that
//! passes through an `allOf` member still terminates.
//!
//! ## Malformed input
//!
//! Nothing here returns an error for a bad schema. Dangling refs, cycles,
//! `false` and unsupported keywords are all [`ResolvedNode`] variants.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::cache::{split_fragment, CacheEntry, ExternalSchemaCache};
use crate::combinator::{merge_all_of, split_one_of, unsupported_keyword};
use crate::error::FormError;
use crate::path::{FieldPath, Segment};
use crate::schema_utils::{
    build_anchor_map, for_each_subschema_mut, json_type_name, resolve_pointer,
};
use crate::store::LiveValueStore;

// ---------------------------------------------------------------------------
// RefTrail
// ---------------------------------------------------------------------------

/// References already followed along one resolution chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefTrail {
    refs: BTreeSet<String>,
}

impl RefTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.refs.contains(reference)
    }

    /// A copy of this trail extended with `reference`.
    pub fn with(&self, reference: &str) -> Self {
        let mut refs = self.refs.clone();
        refs.insert(reference.to_string());
        Self { refs }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    fn absorb(&mut self, other: RefTrail) {
        self.refs.extend(other.refs);
    }
}

// ---------------------------------------------------------------------------
// Resolved shapes
// ---------------------------------------------------------------------------

/// Primitive value kinds a leaf input can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl PrimitiveKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// Kind of a literal value; composite literals fall back to string.
    fn of_literal(value: &Value) -> Self {
        Self::from_type_name(json_type_name(value)).unwrap_or(Self::String)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectShape {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared properties in document order.
    pub properties: Vec<(String, Value)>,
    /// `patternProperties` in document order.
    pub pattern_properties: Vec<(String, Value)>,
    pub required: BTreeSet<String>,
}

impl ObjectShape {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, schema)| schema)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// The first pattern, in declaration order, whose regex matches `key`.
    /// Patterns that are not valid regexes never match.
    pub fn matching_pattern(&self, key: &str) -> Option<&(String, Value)> {
        self.pattern_properties.iter().find(|(pattern, _)| {
            match Regex::new(pattern) {
                Ok(re) => re.is_match(key),
                Err(e) => {
                    tracing::warn!(%pattern, error = %e, "invalid patternProperties regex");
                    false
                }
            }
        })
    }

    /// Schema for a pattern entry: the first matching pattern, or the first
    /// declared pattern when the key is unset or matches nothing.
    pub fn entry_schema(&self, key: Option<&str>) -> Option<&Value> {
        key.and_then(|k| self.matching_pattern(k))
            .or_else(|| self.pattern_properties.first())
            .map(|(_, schema)| schema)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayShape {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub items: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimitiveShape {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: PrimitiveKind,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneOfShape {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Keywords next to `oneOf`, merged into whichever variant is active.
    #[serde(skip)]
    pub base: Map<String, Value>,
    pub variants: Vec<Value>,
}

/// The effective schema at one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedNode {
    Object(ObjectShape),
    Array(ArrayShape),
    Primitive(PrimitiveShape),
    OneOf(OneOfShape),
    /// The `false` schema: no value is valid here.
    AlwaysInvalid,
    /// A keyword the form engine cannot render (e.g. `anyOf`).
    Unsupported { keyword: String },
    /// A `$ref` that points nowhere (or to a document that failed to load).
    UnresolvedRef { reference: String },
    /// A `$ref` already followed on this resolution chain.
    CircularRef { reference: String },
}

impl ResolvedNode {
    /// True for the terminal error variants.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ResolvedNode::AlwaysInvalid
                | ResolvedNode::Unsupported { .. }
                | ResolvedNode::UnresolvedRef { .. }
                | ResolvedNode::CircularRef { .. }
        )
    }

    /// Human-readable explanation for the terminal error variants.
    pub fn explanation(&self) -> Option<String> {
        match self {
            ResolvedNode::AlwaysInvalid => {
                Some("This field's schema is `false`; no value is allowed here.".to_string())
            }
            ResolvedNode::Unsupported { keyword } => {
                Some(format!("The `{}` keyword is not supported by this form.", keyword))
            }
            ResolvedNode::UnresolvedRef { reference } => {
                Some(format!("Could not resolve reference `{}`.", reference))
            }
            ResolvedNode::CircularRef { reference } => Some(format!(
                "Circular reference `{}` cannot be expanded further.",
                reference
            )),
            _ => None,
        }
    }
}

/// A resolved node together with the trail that produced it. Children of
/// this node must be resolved with this trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub node: ResolvedNode,
    pub trail: RefTrail,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Intermediate result of following refs and folding `allOf`.
enum Effective {
    Schema(Map<String, Value>),
    /// The `true` schema, with no sibling keywords.
    Permissive,
    Terminal(ResolvedNode),
}

/// Resolves schema nodes against one root document and the external cache.
///
/// Borrowing only, so it is cheap to build per query.
pub struct Resolver<'a> {
    root: &'a Value,
    cache: &'a ExternalSchemaCache,
    base: Option<Url>,
    anchors: HashMap<String, String>,
}

impl<'a> Resolver<'a> {
    /// Build a resolver. `base` is where the root document came from (if
    /// anywhere); a root `$id` takes precedence for relative refs.
    pub fn new(root: &'a Value, cache: &'a ExternalSchemaCache, base: Option<&Url>) -> Self {
        Self {
            root,
            cache,
            base: document_base(root, base),
            anchors: build_anchor_map(root),
        }
    }

    pub fn root(&self) -> &Value {
        self.root
    }

    /// Resolve the root schema with an empty trail.
    pub fn resolve_root(&self) -> Resolved {
        self.resolve(self.root, &RefTrail::new())
    }

    /// Resolve one schema node.
    pub fn resolve(&self, node: &Value, trail: &RefTrail) -> Resolved {
        let mut trail = trail.clone();
        let node = match self.effective(node, &mut trail) {
            Effective::Terminal(node) => node,
            Effective::Permissive => ResolvedNode::Object(ObjectShape::default()),
            Effective::Schema(obj) => classify(obj),
        };
        Resolved { node, trail }
    }

    /// Resolve variant `index` of a `oneOf` shape, merged with the keywords
    /// that sit next to `oneOf`. Out-of-range indexes fall back to 0.
    pub fn resolve_variant(&self, shape: &OneOfShape, index: usize, trail: &RefTrail) -> Resolved {
        let index = if index < shape.variants.len() { index } else { 0 };
        let Some(variant) = shape.variants.get(index) else {
            return Resolved {
                node: ResolvedNode::AlwaysInvalid,
                trail: trail.clone(),
            };
        };

        let mut trail = trail.clone();
        let node = match self.effective(variant, &mut trail) {
            Effective::Terminal(node) => node,
            Effective::Permissive => classify_with_base(&shape.base, Map::new()),
            Effective::Schema(obj) => classify_with_base(&shape.base, obj),
        };
        Resolved { node, trail }
    }

    /// Resolve the node addressed by `path`, following the variant
    /// selections recorded in `store`.
    pub fn resolve_at(
        &self,
        path: &FieldPath,
        store: &LiveValueStore,
    ) -> Result<Resolved, FormError> {
        let mut current = self.resolve_root();
        let mut at = FieldPath::root();

        for segment in path.segments() {
            current = self.active(current, &at, store);
            let child = match (&current.node, segment) {
                (ResolvedNode::Object(shape), Segment::Property(name)) => shape.property(name),
                (ResolvedNode::Object(shape), Segment::Index(i)) => {
                    shape.entry_schema(store.key(&at.item(*i)))
                }
                (ResolvedNode::Array(shape), Segment::Index(_)) => Some(&shape.items),
                _ => None,
            };
            let Some(child) = child.cloned() else {
                return Err(FormError::InvalidPath {
                    path: path.to_string(),
                    message: format!("nothing addressable below {}", at),
                });
            };
            current = self.resolve(&child, &current.trail);
            at = match segment {
                Segment::Property(name) => at.child(name.clone()),
                Segment::Index(i) => at.item(*i),
            };
        }

        Ok(current)
    }

    /// Descend through `oneOf` nodes into their selected variants.
    pub fn active(&self, mut resolved: Resolved, path: &FieldPath, store: &LiveValueStore) -> Resolved {
        while let ResolvedNode::OneOf(shape) = &resolved.node {
            let index = store.variant(path).unwrap_or(0);
            resolved = self.resolve_variant(shape, index, &resolved.trail);
        }
        resolved
    }

    // -----------------------------------------------------------------------
    // $ref following and allOf folding
    // -----------------------------------------------------------------------

    fn effective(&self, node: &Value, trail: &mut RefTrail) -> Effective {
        let obj = match node {
            Value::Bool(true) => return Effective::Permissive,
            Value::Bool(false) => return Effective::Terminal(ResolvedNode::AlwaysInvalid),
            Value::Object(obj) => obj,
            _ => {
                return Effective::Terminal(ResolvedNode::Unsupported {
                    keyword: format!("non-schema value ({})", json_type_name(node)),
                })
            }
        };

        if let Some(reference) = obj.get("$ref") {
            let Some(reference) = reference.as_str() else {
                return Effective::Terminal(ResolvedNode::Unsupported {
                    keyword: "$ref".to_string(),
                });
            };
            return self.follow_ref(obj, reference, trail);
        }

        if let Some(all_of) = obj.get("allOf") {
            let Some(members) = all_of.as_array() else {
                return Effective::Terminal(ResolvedNode::Unsupported {
                    keyword: "allOf".to_string(),
                });
            };
            return self.fold_all_of(obj, members, trail);
        }

        Effective::Schema(obj.clone())
    }

    fn follow_ref(
        &self,
        obj: &Map<String, Value>,
        reference: &str,
        trail: &mut RefTrail,
    ) -> Effective {
        let (canonical, target) = match self.lookup(reference) {
            Ok(found) => found,
            Err(node) => return Effective::Terminal(node),
        };

        if trail.contains(&canonical) {
            tracing::debug!(%reference, "circular $ref");
            return Effective::Terminal(ResolvedNode::CircularRef {
                reference: reference.to_string(),
            });
        }
        *trail = trail.with(&canonical);
        tracing::trace!(%reference, %canonical, "following $ref");

        let mut siblings = obj.clone();
        siblings.remove("$ref");

        match target {
            Value::Object(mut merged) => {
                // Sibling keywords win over the target's.
                for (key, value) in siblings {
                    merged.insert(key, value);
                }
                self.effective(&Value::Object(merged), trail)
            }
            Value::Bool(true) if siblings.is_empty() => Effective::Permissive,
            Value::Bool(true) => self.effective(&Value::Object(siblings), trail),
            other => self.effective(&other, trail),
        }
    }

    fn fold_all_of(
        &self,
        obj: &Map<String, Value>,
        members: &[Value],
        trail: &mut RefTrail,
    ) -> Effective {
        let mut siblings = obj.clone();
        siblings.remove("allOf");

        let mut schemas = vec![siblings];
        let mut merged_trail = trail.clone();
        for member in members {
            let mut member_trail = trail.clone();
            match self.effective(member, &mut member_trail) {
                Effective::Terminal(node) => return Effective::Terminal(node),
                Effective::Permissive => {}
                Effective::Schema(schema) => schemas.push(schema),
            }
            merged_trail.absorb(member_trail);
        }
        *trail = merged_trail;

        if schemas.iter().filter(|s| s.contains_key("oneOf")).count() > 1 {
            return Effective::Terminal(ResolvedNode::Unsupported {
                keyword: "oneOf in more than one allOf member".to_string(),
            });
        }

        Effective::Schema(merge_all_of(schemas))
    }

    /// Locate the target of a reference. Returns the canonical identity used
    /// on the trail plus an owned copy of the target.
    fn lookup(&self, reference: &str) -> Result<(String, Value), ResolvedNode> {
        let unresolved = || ResolvedNode::UnresolvedRef {
            reference: reference.to_string(),
        };

        if let Some(fragment) = reference.strip_prefix('#') {
            let pointer = fragment_pointer(fragment, &self.anchors).ok_or_else(unresolved)?;
            let target = resolve_pointer(self.root, &pointer).ok_or_else(unresolved)?;
            return Ok((format!("#{}", pointer), target.clone()));
        }

        let absolute = match &self.base {
            Some(base) => base.join(reference),
            None => Url::parse(reference),
        }
        .map_err(|_| unresolved())?;

        let (doc_uri, fragment) = split_fragment(absolute.as_str());

        // A ref back to the root document through its own base URI.
        if let Some(base) = &self.base {
            let (root_uri, _) = split_fragment(base.as_str());
            if root_uri == doc_uri {
                let pointer = fragment_pointer(&fragment, &self.anchors).ok_or_else(unresolved)?;
                let target = resolve_pointer(self.root, &pointer).ok_or_else(unresolved)?;
                return Ok((format!("#{}", pointer), target.clone()));
            }
        }

        if !matches!(absolute.scheme(), "http" | "https") {
            return Err(unresolved());
        }

        match self.cache.get(&doc_uri) {
            Some(CacheEntry::Document(doc)) => {
                let target = resolve_in_document(doc, &fragment).ok_or_else(unresolved)?;
                Ok((absolute.to_string(), absolutize_refs(target.clone(), &doc_uri)))
            }
            Some(CacheEntry::Failed(reason)) => {
                tracing::debug!(%reference, %reason, "external $ref target failed to load");
                Err(unresolved())
            }
            None => {
                tracing::warn!(%reference, "external $ref was not pre-resolved");
                Err(unresolved())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn classify_with_base(base: &Map<String, Value>, variant: Map<String, Value>) -> ResolvedNode {
    if base.is_empty() {
        return classify(variant);
    }
    classify(merge_all_of(vec![base.clone(), variant]))
}

/// Tag an effective schema object with its shape.
pub(crate) fn classify(obj: Map<String, Value>) -> ResolvedNode {
    if let Some(keyword) = unsupported_keyword(&obj) {
        return ResolvedNode::Unsupported {
            keyword: keyword.to_string(),
        };
    }

    let title = obj.get("title").and_then(Value::as_str).map(String::from);
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);

    if obj.contains_key("oneOf") {
        return match split_one_of(&obj) {
            Some((base, variants)) => ResolvedNode::OneOf(OneOfShape {
                title,
                description,
                base: strip_annotations(base),
                variants,
            }),
            None => ResolvedNode::Unsupported {
                keyword: "oneOf".to_string(),
            },
        };
    }

    let declared = match obj.get("type") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(types)) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            names
                .iter()
                .find(|t| **t != "null")
                .or_else(|| names.first())
                .map(|t| t.to_string())
        }
        Some(_) => {
            return ResolvedNode::Unsupported {
                keyword: "type".to_string(),
            }
        }
    };

    let declared = match declared {
        Some(name) => name,
        None => {
            return match infer_structure(&obj) {
                Structure::Object => ResolvedNode::Object(object_shape(&obj, title, description)),
                Structure::Array => array_node(&obj, title, description),
                Structure::Primitive => {
                    ResolvedNode::Primitive(primitive_shape(&obj, None, title, description))
                }
            }
        }
    };

    match declared.as_str() {
        "object" => ResolvedNode::Object(object_shape(&obj, title, description)),
        "array" => array_node(&obj, title, description),
        other => match PrimitiveKind::from_type_name(other) {
            Some(kind) => {
                ResolvedNode::Primitive(primitive_shape(&obj, Some(kind), title, description))
            }
            None => ResolvedNode::Unsupported {
                keyword: format!("type \"{}\"", other),
            },
        },
    }
}

enum Structure {
    Object,
    Array,
    Primitive,
}

/// Structure implied by keywords when `type` is absent.
fn infer_structure(obj: &Map<String, Value>) -> Structure {
    const OBJECT_KEYWORDS: &[&str] = &[
        "properties",
        "patternProperties",
        "additionalProperties",
        "required",
        "minProperties",
        "maxProperties",
    ];
    const ARRAY_KEYWORDS: &[&str] = &["items", "prefixItems", "minItems", "maxItems", "uniqueItems"];

    if obj.contains_key("const") || obj.contains_key("enum") {
        Structure::Primitive
    } else if OBJECT_KEYWORDS.iter().any(|k| obj.contains_key(*k)) {
        Structure::Object
    } else if ARRAY_KEYWORDS.iter().any(|k| obj.contains_key(*k)) {
        Structure::Array
    } else {
        Structure::Primitive
    }
}

fn array_node(
    obj: &Map<String, Value>,
    title: Option<String>,
    description: Option<String>,
) -> ResolvedNode {
    if obj.contains_key("prefixItems") || obj.get("items").is_some_and(Value::is_array) {
        return ResolvedNode::Unsupported {
            keyword: "prefixItems".to_string(),
        };
    }
    ResolvedNode::Array(ArrayShape {
        title,
        description,
        items: obj.get("items").cloned().unwrap_or(Value::Bool(true)),
        min_items: obj.get("minItems").and_then(Value::as_u64),
        max_items: obj.get("maxItems").and_then(Value::as_u64),
    })
}

fn object_shape(
    obj: &Map<String, Value>,
    title: Option<String>,
    description: Option<String>,
) -> ObjectShape {
    let entries = |key: &str| -> Vec<(String, Value)> {
        obj.get(key)
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    };
    let required = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    ObjectShape {
        title,
        description,
        properties: entries("properties"),
        pattern_properties: entries("patternProperties"),
        required,
    }
}

fn primitive_shape(
    obj: &Map<String, Value>,
    declared: Option<PrimitiveKind>,
    title: Option<String>,
    description: Option<String>,
) -> PrimitiveShape {
    let const_value = obj.get("const").cloned();
    let enum_values = obj.get("enum").and_then(Value::as_array).cloned();

    // Without an explicit type: const's kind, else the first non-null enum
    // member's kind, else string.
    let kind = declared.unwrap_or_else(|| {
        if let Some(c) = &const_value {
            PrimitiveKind::of_literal(c)
        } else if let Some(member) = enum_values
            .as_ref()
            .and_then(|members| members.iter().find(|m| !m.is_null()))
        {
            PrimitiveKind::of_literal(member)
        } else {
            PrimitiveKind::String
        }
    });

    let number = |key: &str| obj.get(key).and_then(Value::as_f64);
    let count = |key: &str| obj.get(key).and_then(Value::as_u64);
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(String::from);

    PrimitiveShape {
        title,
        description,
        kind,
        enum_values,
        const_value,
        pattern: text("pattern"),
        format: text("format"),
        min_length: count("minLength"),
        max_length: count("maxLength"),
        minimum: number("minimum"),
        maximum: number("maximum"),
        exclusive_minimum: number("exclusiveMinimum"),
        exclusive_maximum: number("exclusiveMaximum"),
        default: obj.get("default").cloned(),
    }
}

fn strip_annotations(mut base: Map<String, Value>) -> Map<String, Value> {
    for key in ["title", "description", "$comment", "examples"] {
        base.remove(key);
    }
    base
}

// ---------------------------------------------------------------------------
// Helpers shared with pre-resolution
// ---------------------------------------------------------------------------

/// Base URI for relative refs: the root `$id` (joined onto the load URL),
/// else the load URL.
pub(crate) fn document_base(root: &Value, loaded_from: Option<&Url>) -> Option<Url> {
    let id = root.get("$id").and_then(Value::as_str);
    match (id, loaded_from) {
        (Some(id), Some(base)) => base.join(id).ok().or_else(|| Some(base.clone())),
        (Some(id), None) => Url::parse(id).ok(),
        (None, Some(base)) => Some(base.clone()),
        (None, None) => None,
    }
}

/// Turn a fragment (without `#`) into a JSON Pointer, consulting the anchor
/// map for plain-name fragments.
fn fragment_pointer(fragment: &str, anchors: &HashMap<String, String>) -> Option<String> {
    if fragment.is_empty() || fragment.starts_with('/') {
        Some(fragment.to_string())
    } else {
        anchors
            .get(fragment)
            .map(|p| p.trim_start_matches('#').to_string())
    }
}

/// Look up a fragment inside an external document.
pub(crate) fn resolve_in_document<'d>(doc: &'d Value, fragment: &str) -> Option<&'d Value> {
    let anchors = if fragment.is_empty() || fragment.starts_with('/') {
        HashMap::new()
    } else {
        build_anchor_map(doc)
    };
    let pointer = fragment_pointer(fragment, &anchors)?;
    resolve_pointer(doc, &pointer)
}

/// Rewrite every non-absolute `$ref` inside `value` to an absolute URI
/// against `doc_uri`, so content lifted out of an external document keeps
/// pointing into that document.
pub(crate) fn absolutize_refs(mut value: Value, doc_uri: &str) -> Value {
    let base = Url::parse(doc_uri).ok();
    absolutize_in_place(&mut value, doc_uri, base.as_ref());
    value
}

fn absolutize_in_place(value: &mut Value, doc_uri: &str, base: Option<&Url>) {
    let Value::Object(obj) = value else {
        return;
    };
    if let Some(Value::String(reference)) = obj.get_mut("$ref") {
        if reference.starts_with('#') {
            *reference = format!("{}{}", doc_uri, reference);
        } else if Url::parse(reference).is_err() {
            if let Some(joined) = base.and_then(|b| b.join(reference).ok()) {
                *reference = joined.to_string();
            }
        }
    }
    for_each_subschema_mut(obj, |child| absolutize_in_place(child, doc_uri, base));
}

// ===========================================================================
// Tests
// ===========================================================================
