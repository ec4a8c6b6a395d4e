//! End-to-end tests that drive a [`Session`] the way a renderer would:
//! load a schema, read the descriptor tree, write into the store, collect,
//! and validate.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema_form_core::{
    ErrorCode, FetchError, FieldPath, JsonSchemaEngine, ResolvedNode, SchemaFetcher,
    SchemaSource, Session, SessionOptions, ValidationOutcome, Widget,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// ── Helpers ─────────────────────────────────────────────────────────────────

const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/schemas");

fn load_fixture(name: &str) -> Value {
    let path = Path::new(FIXTURES_DIR).join(format!("{name}.json"));
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {name}.json: {e}"));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {name}.json: {e}"))
}

/// Serves canned documents and counts every request.
struct CountingFetcher {
    documents: HashMap<String, Value>,
    requests: AtomicUsize,
}

impl CountingFetcher {
    fn new(documents: Vec<(&str, Value)>) -> Arc<Self> {
        Arc::new(Self {
            documents: documents
                .into_iter()
                .map(|(uri, doc)| (uri.to_string(), doc))
                .collect(),
            requests: AtomicUsize::new(0),
        })
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaFetcher for CountingFetcher {
    async fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(uri)
            .cloned()
            .ok_or(FetchError::Status { status: 404 })
    }
}

fn session_with(fetcher: Arc<CountingFetcher>) -> Session {
    Session::with_capabilities(SessionOptions::default(), fetcher, Arc::new(JsonSchemaEngine))
}

fn offline_session() -> Session {
    session_with(CountingFetcher::new(vec![]))
}

fn p(s: &str) -> FieldPath {
    s.parse().unwrap()
}

// ── Fixtures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_person_round_trip() {
    let mut s = offline_session();
    s.load_value(load_fixture("person")).await.unwrap();

    let tree = s.descriptor_tree().unwrap();
    let name = tree.find(&p("root.name")).unwrap();
    assert!(name.required);
    assert_eq!(name.title.as_deref(), Some("Full name"));
    assert!(!tree.find(&p("root.age")).unwrap().required);

    s.set_value(&p("root.name"), "Ada");
    s.set_value(&p("root.age"), "36");
    s.set_value(&p("root.newsletter"), true);
    assert_eq!(
        s.collect().unwrap(),
        Some(json!({ "name": "Ada", "age": 36, "newsletter": true }))
    );
    assert_eq!(s.validate().unwrap(), ValidationOutcome::Valid);
}

#[tokio::test]
async fn test_person_missing_required_and_bad_number() {
    let mut s = offline_session();
    s.load_value(load_fixture("person")).await.unwrap();

    // Uncoercible input is left out, not sent as a string.
    s.set_value(&p("root.age"), "thirty");
    assert_eq!(s.collect().unwrap(), Some(json!({})));

    match s.validate().unwrap() {
        ValidationOutcome::Invalid(messages) => {
            assert_eq!(
                messages,
                vec!["root is missing required property \"name\"".to_string()]
            );
        }
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[tokio::test]
async fn test_order_full_flow() {
    let mut s = offline_session();
    s.load_value(load_fixture("order")).await.unwrap();

    let tree = s.descriptor_tree().unwrap();
    match &tree.find(&p("root.payment")).unwrap().widget {
        Widget::OneOf {
            options, selected, ..
        } => {
            assert_eq!(options, &vec!["Card".to_string(), "Bank transfer".to_string()]);
            assert_eq!(*selected, 0);
        }
        other => panic!("expected OneOf, got {other:?}"),
    }
    match &tree.find(&p("root.lines")).unwrap().widget {
        Widget::Array(slots) => {
            assert_eq!(slots.initial_slots, 1);
            assert!(!slots.can_remove);
            assert!(slots.can_add);
        }
        other => panic!("expected Array, got {other:?}"),
    }

    s.set_value(&p("root.id"), "o-1");
    s.set_value(&p("root.priority"), "high");
    s.set_value(&p("root.lines[0].sku"), "ABC-1234");
    s.set_value(&p("root.lines[0].qty"), "2");
    s.select_variant(&p("root.payment"), 1);
    s.set_value(&p("root.payment.iban"), "DE00");
    let entry = s.add_entry(&p("root.labels"), "x-team").unwrap();
    s.set_value(&p("root.labels").item(entry), "core");

    assert_eq!(
        s.collect().unwrap(),
        Some(json!({
            "id": "o-1",
            "priority": "high",
            "lines": [{ "sku": "ABC-1234", "qty": 2 }],
            "payment": { "method": "bank", "iban": "DE00" },
            "labels": { "x-team": "core" }
        }))
    );
    assert_eq!(s.validate().unwrap(), ValidationOutcome::Valid);

    s.set_value(&p("root.lines[0].qty"), "0");
    match s.validate().unwrap() {
        ValidationOutcome::Invalid(messages) => {
            assert!(
                messages.contains(&"lines.0.qty must be >= 1".to_string()),
                "{messages:?}"
            );
        }
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[tokio::test]
async fn test_switching_variant_discards_previous_values() {
    let mut s = offline_session();
    s.load_value(load_fixture("order")).await.unwrap();

    s.set_value(&p("root.payment.number"), "4111");
    assert_eq!(
        s.collect().unwrap().unwrap()["payment"],
        json!({ "method": "card", "number": "4111" })
    );

    s.select_variant(&p("root.payment"), 1);
    s.select_variant(&p("root.payment"), 0);
    assert_eq!(s.collect().unwrap().unwrap()["payment"], json!({ "method": "card" }));
}

#[tokio::test]
async fn test_recursive_tree_expands_one_level_per_ref() {
    let mut s = offline_session();
    s.load_value(load_fixture("tree")).await.unwrap();

    let children = p("root.children");
    assert_eq!(s.add_item(&children).unwrap(), 0);
    s.set_value(&p("root.label"), "top");
    s.set_value(&p("root.children[0].label"), "leaf");

    assert_eq!(
        s.collect().unwrap(),
        Some(json!({ "label": "top", "children": [{ "label": "leaf" }] }))
    );
    assert!(matches!(
        s.resolve_at(&p("root.children[0].children[0]")).unwrap(),
        ResolvedNode::CircularRef { .. }
    ));
    assert_eq!(s.validate().unwrap(), ValidationOutcome::Valid);
}

#[tokio::test]
async fn test_all_of_fixture_merges_members() {
    let mut s = offline_session();
    s.load_value(load_fixture("composed")).await.unwrap();

    match s.resolve_at(&FieldPath::root()).unwrap() {
        ResolvedNode::Object(shape) => {
            let names: Vec<&str> = shape.properties.iter().map(|(n, _)| n.as_str()).collect();
            assert_eq!(names, vec!["name", "created", "tags"]);
            assert!(shape.required.contains("name"));
            assert!(shape.required.contains("created"));
        }
        other => panic!("expected Object, got {other:?}"),
    }

    s.set_value(&p("root.name"), "n");
    s.set_value(&p("root.created"), "2024-01-01");
    assert_eq!(s.add_item(&p("root.tags")).unwrap(), 0);
    s.set_value(&p("root.tags[0]"), "a");
    assert_eq!(
        s.collect().unwrap(),
        Some(json!({ "name": "n", "created": "2024-01-01", "tags": ["a"] }))
    );
}

// ── Spec-level scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn test_fixed_length_array_cannot_grow_or_shrink() {
    let mut s = offline_session();
    s.load_value(json!({
        "type": "array",
        "items": { "type": "integer" },
        "minItems": 2,
        "maxItems": 2
    }))
    .await
    .unwrap();

    let tree = s.descriptor_tree().unwrap();
    match &tree.widget {
        Widget::Array(slots) => {
            assert_eq!(slots.slots.len(), 2);
            assert!(!slots.can_add);
            assert!(!slots.can_remove);
        }
        other => panic!("expected Array, got {other:?}"),
    }

    let root = FieldPath::root();
    assert_eq!(s.add_item(&root).unwrap_err().error_code(), ErrorCode::ItemBounds);
    s.set_value(&root.item(0), "3");
    s.set_value(&root.item(1), "4");
    assert_eq!(s.collect().unwrap(), Some(json!([3, 4])));
    assert_eq!(s.validate().unwrap(), ValidationOutcome::Valid);
}

#[tokio::test]
async fn test_failed_external_document_is_fetched_once() {
    let fetcher = CountingFetcher::new(vec![]);
    let mut s = session_with(Arc::clone(&fetcher));
    s.load_value(json!({
        "type": "object",
        "properties": {
            "a": { "$ref": "https://x.test/missing.json#/$defs/A" },
            "b": { "$ref": "https://x.test/missing.json#/$defs/B" },
            "c": { "type": "string" }
        }
    }))
    .await
    .unwrap();

    assert_eq!(fetcher.requests(), 1);

    let tree = s.descriptor_tree().unwrap();
    for field in ["root.a", "root.b"] {
        match &tree.find(&p(field)).unwrap().widget {
            Widget::Message { text } => assert!(text.contains("missing.json"), "{text}"),
            other => panic!("expected Message at {field}, got {other:?}"),
        }
    }

    s.set_value(&p("root.c"), "ok");
    assert_eq!(s.collect().unwrap(), Some(json!({ "c": "ok" })));
    assert!(matches!(s.validate().unwrap(), ValidationOutcome::Unavailable(_)));

    // Queries never refetch.
    assert_eq!(fetcher.requests(), 1);
}

#[tokio::test]
async fn test_url_load_follows_relative_external_refs() {
    let fetcher = CountingFetcher::new(vec![
        (
            "https://x.test/forms/root.json",
            json!({
                "type": "object",
                "properties": { "address": { "$ref": "defs.json#/$defs/Address" } }
            }),
        ),
        (
            "https://x.test/forms/defs.json",
            json!({
                "$defs": {
                    "Address": {
                        "type": "object",
                        "required": ["street"],
                        "properties": {
                            "street": { "type": "string" },
                            "zip": { "$ref": "#/$defs/Zip" }
                        }
                    },
                    "Zip": { "type": "string", "pattern": "^[0-9]{5}$" }
                }
            }),
        ),
    ]);
    let mut s = session_with(Arc::clone(&fetcher));
    s.load_url("https://x.test/forms/root.json").await.unwrap();

    assert_eq!(s.schema_url(), Some("https://x.test/forms/root.json"));
    assert_eq!(fetcher.requests(), 2);

    match s.resolve_at(&p("root.address.zip")).unwrap() {
        ResolvedNode::Primitive(shape) => {
            assert_eq!(shape.pattern.as_deref(), Some("^[0-9]{5}$"));
        }
        other => panic!("expected Primitive, got {other:?}"),
    }

    s.set_value(&p("root.address.street"), "Main St");
    s.set_value(&p("root.address.zip"), "12345");
    assert_eq!(
        s.collect().unwrap(),
        Some(json!({ "address": { "street": "Main St", "zip": "12345" } }))
    );
    assert_eq!(s.validate().unwrap(), ValidationOutcome::Valid);
}

#[tokio::test]
async fn test_missing_internal_segment_is_scoped_to_the_field() {
    let mut s = offline_session();
    s.load_value(json!({
        "type": "object",
        "properties": {
            "broken": { "$ref": "#/$defs/nope" },
            "fine": { "type": "boolean" }
        }
    }))
    .await
    .unwrap();

    assert!(matches!(
        s.resolve_at(&p("root.broken")).unwrap(),
        ResolvedNode::UnresolvedRef { .. }
    ));
    s.set_value(&p("root.fine"), true);
    assert_eq!(s.collect().unwrap(), Some(json!({ "fine": true })));
}

#[tokio::test]
async fn test_remove_renumbers_later_items() {
    let mut s = offline_session();
    s.load_value(json!({
        "type": "object",
        "properties": {
            "people": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } }
                }
            }
        }
    }))
    .await
    .unwrap();

    let people = p("root.people");
    for name in ["a", "b", "c"] {
        let i = s.add_item(&people).unwrap();
        s.set_value(&people.item(i).child("name"), name);
    }

    s.remove_item(&people, 1).unwrap();
    assert_eq!(
        s.collect().unwrap(),
        Some(json!({ "people": [{ "name": "a" }, { "name": "c" }] }))
    );
    assert_eq!(s.store().count(&people), Some(2));
    assert!(s.store().value(&p("root.people[2].name")).is_none());
}

#[tokio::test]
async fn test_nested_all_of_groups_resolve_identically() {
    let a = json!({ "type": "object", "properties": { "a": { "type": "string" } }, "required": ["a"] });
    let b = json!({ "properties": { "b": { "type": "integer" } } });
    let c = json!({ "properties": { "c": { "type": "boolean" } }, "required": ["c"] });

    let mut flat = offline_session();
    flat.load_value(json!({ "allOf": [a.clone(), b.clone(), c.clone()] }))
        .await
        .unwrap();
    let mut left = offline_session();
    left.load_value(json!({ "allOf": [{ "allOf": [a.clone(), b.clone()] }, c.clone()] }))
        .await
        .unwrap();
    let mut right = offline_session();
    right
        .load_value(json!({ "allOf": [a, { "allOf": [b, c] }] }))
        .await
        .unwrap();

    let root = FieldPath::root();
    let flat = flat.resolve_at(&root).unwrap();
    assert!(matches!(flat, ResolvedNode::Object(_)));
    assert_eq!(left.resolve_at(&root).unwrap(), flat);
    assert_eq!(right.resolve_at(&root).unwrap(), flat);
}

#[tokio::test]
async fn test_newest_load_wins() {
    let fetcher = CountingFetcher::new(vec![
        ("https://x.test/old.json", json!({ "type": "string" })),
        ("https://x.test/new.json", json!({ "type": "boolean" })),
    ]);
    let mut s = session_with(fetcher);

    let old_ticket = s.begin_load();
    let new_ticket = s.begin_load();
    let loader = s.loader();

    // The newer load completes first; the older one arrives late.
    let new = loader
        .prepare(new_ticket, SchemaSource::Url("https://x.test/new.json".to_string()))
        .await
        .unwrap();
    s.install(new).unwrap();
    let old = loader
        .prepare(old_ticket, SchemaSource::Url("https://x.test/old.json".to_string()))
        .await
        .unwrap();
    assert_eq!(
        s.install(old).unwrap_err().error_code(),
        ErrorCode::LoadSuperseded
    );
    assert_eq!(s.schema_url(), Some("https://x.test/new.json"));
}

#[tokio::test]
async fn test_anyof_is_reported_not_rendered() {
    let mut s = offline_session();
    s.load_value(json!({
        "type": "object",
        "properties": {
            "x": { "anyOf": [{ "type": "string" }, { "type": "integer" }] }
        }
    }))
    .await
    .unwrap();

    let tree = s.descriptor_tree().unwrap();
    match &tree.find(&p("root.x")).unwrap().widget {
        Widget::Message { text } => assert!(text.contains("anyOf"), "{text}"),
        other => panic!("expected Message, got {other:?}"),
    }
}
