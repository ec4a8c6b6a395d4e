//! Property-based tests for the value store and collection.
//!
//! Array item removal must renumber every later item (and its descendants)
//! down by one, and collection must be a pure function of schema and store.

use jsonschema_form_core::{
    collector, ExternalSchemaCache, FieldPath, ItemBounds, LeafValue, LiveValueStore, Resolver,
    SessionOptions,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "rows": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "n": { "type": "integer" }
                    }
                }
            }
        }
    })
}

/// Store with one row per name, each row carrying `name` and `n`.
fn store_with_rows(names: &[String]) -> LiveValueStore {
    let rows: FieldPath = "root.rows".parse().expect("path");
    let bounds = ItemBounds::unbounded();
    let mut store = LiveValueStore::new();
    for (i, name) in names.iter().enumerate() {
        let at = store.push_item(&rows, 0, &bounds).expect("unbounded push");
        assert_eq!(at, i);
        store.set_value(&rows.item(at).child("name"), name.clone());
        store.set_value(&rows.item(at).child("n"), i.to_string());
    }
    store
}

fn collect(schema: &Value, store: &LiveValueStore) -> Option<Value> {
    let cache = ExternalSchemaCache::new();
    let resolver = Resolver::new(schema, &cache, None);
    collector::collect(&resolver, store, &SessionOptions::default())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..Default::default() })]

    /// Property: removing row `k` leaves exactly the other rows, in order,
    /// with no value left behind at the old last index.
    #[test]
    fn remove_renumbers_later_rows(
        names in proptest::collection::vec("[a-z]{1,6}", 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let k = pick.index(names.len());
        let rows: FieldPath = "root.rows".parse().expect("path");
        let mut store = store_with_rows(&names);

        store.remove_item(&rows, k, 0, &ItemBounds::unbounded()).expect("unbounded remove");

        let mut expected = names.clone();
        expected.remove(k);
        prop_assert_eq!(store.count(&rows), Some(expected.len()));
        for (i, name) in expected.iter().enumerate() {
            let stored = store.value(&rows.item(i).child("name")).cloned();
            prop_assert_eq!(stored, Some(LeafValue::from(name.clone())));
        }
        prop_assert!(store.value(&rows.item(names.len() - 1).child("name")).is_none());
    }

    /// Property: insert at `k` then remove at `k` restores the collected
    /// document.
    #[test]
    fn insert_then_remove_is_identity(
        names in proptest::collection::vec("[a-z]{1,6}", 0..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let schema = list_schema();
        let rows: FieldPath = "root.rows".parse().expect("path");
        let mut store = store_with_rows(&names);
        let before = collect(&schema, &store);

        let k = pick.index(names.len() + 1);
        let bounds = ItemBounds::unbounded();
        store.insert_item(&rows, k, 0, &bounds).expect("unbounded insert");
        store.set_value(&rows.item(k).child("name"), "inserted");
        store.remove_item(&rows, k, 0, &bounds).expect("unbounded remove");

        prop_assert_eq!(collect(&schema, &store), before);
    }

    /// Property: collection is idempotent and only emits meaningful rows.
    #[test]
    fn collect_is_idempotent(names in proptest::collection::vec("[a-z]{0,3}", 0..6)) {
        let schema = list_schema();
        let store = store_with_rows(&names);
        let first = collect(&schema, &store);
        let second = collect(&schema, &store);
        prop_assert_eq!(&first, &second);

        let doc = first.expect("object root always collects");
        match doc.get("rows").and_then(Value::as_array) {
            Some(rows) => {
                prop_assert_eq!(rows.len(), names.len());
                for (row, i) in rows.iter().zip(0..) {
                    prop_assert_eq!(&row["n"], &json!(i));
                }
            }
            None => prop_assert!(names.is_empty()),
        }
    }
}
