//! Live value store: the sparse, renderer-owned state of a form.
//!
//! One [`NodeState`] per [`FieldPath`] holds whatever the renderer has
//! recorded for that node: a raw leaf value, a selected `oneOf` variant,
//! an item count (arrays and pattern-property groups) and, for
//! pattern-property entries, the user-chosen key. The core only reads these
//! entries; the mutators here exist for the renderer's callbacks.
//!
//! Structural mutations (item removal/insertion, variant switches) rebuild
//! the key set in a single pass via [`crate::path`], so the store is never
//! observable in a partially renumbered state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::path::{self, FieldPath};

/// A raw value entered by the user for a leaf input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeafValue {
    Bool(bool),
    Text(String),
}

impl From<&str> for LeafValue {
    fn from(s: &str) -> Self {
        LeafValue::Text(s.to_string())
    }
}

impl From<String> for LeafValue {
    fn from(s: String) -> Self {
        LeafValue::Text(s)
    }
}

impl From<bool> for LeafValue {
    fn from(b: bool) -> Self {
        LeafValue::Bool(b)
    }
}

/// Everything recorded for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<LeafValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl NodeState {
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.variant.is_none() && self.count.is_none() && self.key.is_none()
    }
}

/// `minItems`/`maxItems` of an array, as enforced on add/remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBounds {
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

impl ItemBounds {
    /// Bounds that allow any number of items.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether one more item fits under `maxItems`.
    pub fn allows_add(&self, current: usize) -> bool {
        self.max_items.map_or(true, |max| (current as u64) < max)
    }

    /// Whether one item can go without breaking `minItems`.
    pub fn allows_remove(&self, current: usize) -> bool {
        current > 0 && self.min_items.map_or(true, |min| (current as u64) > min)
    }
}

/// Sparse map from [`FieldPath`] to [`NodeState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveValueStore {
    entries: BTreeMap<FieldPath, NodeState>,
}

impl LiveValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All tracked paths, in canonical order.
    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.entries.keys()
    }

    pub fn state(&self, path: &FieldPath) -> Option<&NodeState> {
        self.entries.get(path)
    }

    pub fn value(&self, path: &FieldPath) -> Option<&LeafValue> {
        self.state(path)?.value.as_ref()
    }

    pub fn variant(&self, path: &FieldPath) -> Option<usize> {
        self.state(path)?.variant
    }

    pub fn count(&self, path: &FieldPath) -> Option<usize> {
        self.state(path)?.count
    }

    pub fn key(&self, path: &FieldPath) -> Option<&str> {
        self.state(path)?.key.as_deref()
    }

    fn state_mut(&mut self, path: &FieldPath) -> &mut NodeState {
        self.entries.entry(path.clone()).or_default()
    }

    fn prune(&mut self, path: &FieldPath) {
        if self.entries.get(path).is_some_and(NodeState::is_empty) {
            self.entries.remove(path);
        }
    }

    // -----------------------------------------------------------------------
    // Leaf values
    // -----------------------------------------------------------------------

    pub fn set_value(&mut self, path: &FieldPath, value: impl Into<LeafValue>) {
        self.state_mut(path).value = Some(value.into());
    }

    pub fn clear_value(&mut self, path: &FieldPath) {
        if let Some(state) = self.entries.get_mut(path) {
            state.value = None;
        }
        self.prune(path);
    }

    // -----------------------------------------------------------------------
    // oneOf selection
    // -----------------------------------------------------------------------

    /// Select variant `index` at `path`.
    ///
    /// Switching to a different variant discards everything the previous
    /// variant left behind: all descendant entries plus the value and count
    /// recorded on the node itself. The entry key (owned by a parent pattern
    /// group) survives.
    pub fn select_variant(&mut self, path: &FieldPath, index: usize) {
        let previous = self.variant(path).unwrap_or(0);
        if previous != index {
            self.remove_descendants(path);
            let state = self.state_mut(path);
            state.value = None;
            state.count = None;
        }
        self.state_mut(path).variant = Some(index);
    }

    // -----------------------------------------------------------------------
    // Arrays
    // -----------------------------------------------------------------------

    /// Record an explicit item count (used by renderers that restore state).
    pub fn set_count(&mut self, path: &FieldPath, count: usize) {
        self.state_mut(path).count = Some(count);
    }

    /// Append an item slot. `current` is the slot count the renderer shows
    /// when no explicit count has been recorded yet. Returns the new index.
    pub fn push_item(
        &mut self,
        array: &FieldPath,
        current: usize,
        bounds: &ItemBounds,
    ) -> Result<usize, FormError> {
        let count = self.count(array).unwrap_or(current);
        self.insert_item(array, count, current, bounds)
    }

    /// Insert an item slot at `at`, moving later items (and all their
    /// descendants) up by one. Returns `at`.
    pub fn insert_item(
        &mut self,
        array: &FieldPath,
        at: usize,
        current: usize,
        bounds: &ItemBounds,
    ) -> Result<usize, FormError> {
        let count = self.count(array).unwrap_or(current);
        if at > count {
            return Err(FormError::InvalidPath {
                path: array.item(at).to_string(),
                message: format!("cannot insert at {} into {} items", at, count),
            });
        }
        if !bounds.allows_add(count) {
            return Err(FormError::ItemBounds {
                path: array.to_string(),
                message: format!(
                    "at most {} items allowed",
                    bounds.max_items.unwrap_or_default()
                ),
            });
        }

        let entries = std::mem::take(&mut self.entries);
        self.entries = path::insert_index(entries, array, at);
        self.state_mut(array).count = Some(count + 1);
        tracing::trace!(path = %array, at, count = count + 1, "inserted item");
        Ok(at)
    }

    /// Remove item `index`, discarding its entries and renumbering every
    /// later item and all of its descendants.
    pub fn remove_item(
        &mut self,
        array: &FieldPath,
        index: usize,
        current: usize,
        bounds: &ItemBounds,
    ) -> Result<(), FormError> {
        let count = self.count(array).unwrap_or(current);
        if index >= count {
            return Err(FormError::InvalidPath {
                path: array.item(index).to_string(),
                message: format!("no item {} in {} items", index, count),
            });
        }
        if !bounds.allows_remove(count) {
            return Err(FormError::ItemBounds {
                path: array.to_string(),
                message: format!(
                    "at least {} items required",
                    bounds.min_items.unwrap_or_default()
                ),
            });
        }

        let entries = std::mem::take(&mut self.entries);
        self.entries = path::remove_index(entries, array, index);
        self.state_mut(array).count = Some(count - 1);
        tracing::trace!(path = %array, index, count = count - 1, "removed item");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pattern-property entries
    // -----------------------------------------------------------------------

    /// Add a dynamic entry to a pattern-property group. Returns its slot index.
    pub fn add_entry(&mut self, group: &FieldPath, key: impl Into<String>) -> usize {
        let count = self.count(group).unwrap_or(0);
        self.state_mut(group).count = Some(count + 1);
        self.state_mut(&group.item(count)).key = Some(key.into());
        count
    }

    /// Change the key of an existing entry. The entry's path does not move.
    pub fn rename_entry(
        &mut self,
        group: &FieldPath,
        index: usize,
        key: impl Into<String>,
    ) -> Result<(), FormError> {
        let count = self.count(group).unwrap_or(0);
        if index >= count {
            return Err(FormError::InvalidPath {
                path: group.item(index).to_string(),
                message: format!("no entry {} in {} entries", index, count),
            });
        }
        self.state_mut(&group.item(index)).key = Some(key.into());
        Ok(())
    }

    /// Remove an entry and renumber the ones after it.
    pub fn remove_entry(&mut self, group: &FieldPath, index: usize) -> Result<(), FormError> {
        let count = self.count(group).unwrap_or(0);
        self.remove_item(group, index, count, &ItemBounds::unbounded())
    }

    // -----------------------------------------------------------------------
    // Bulk operations
    // -----------------------------------------------------------------------

    /// Move every entry at or under `old` to live under `new`.
    pub fn rewrite_prefix(&mut self, old: &FieldPath, new: &FieldPath) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = path::rewrite_prefix(entries, old, new);
    }

    /// Drop every entry strictly below `path`.
    pub fn remove_descendants(&mut self, path: &FieldPath) {
        self.entries.retain(|key, _| !key.is_descendant_of(path));
    }

    /// Drop all entries. Called when the schema changes or the session resets.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(s: &str) -> FieldPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_leaf_values() {
        let mut store = LiveValueStore::new();
        store.set_value(&p("root.a"), "x");
        store.set_value(&p("root.b"), true);
        assert_eq!(store.value(&p("root.a")), Some(&LeafValue::Text("x".into())));
        assert_eq!(store.value(&p("root.b")), Some(&LeafValue::Bool(true)));
        store.clear_value(&p("root.a"));
        assert_eq!(store.value(&p("root.a")), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_item_renumbers_atomically() {
        let mut store = LiveValueStore::new();
        let arr = p("root.items");
        store.set_count(&arr, 3);
        store.set_value(&p("root.items[0].name"), "a");
        store.set_value(&p("root.items[1].name"), "b");
        store.set_value(&p("root.items[2].name"), "c");
        store.set_value(&p("root.items[2].tags[0]"), "c0");
        store.set_count(&p("root.items[2].tags"), 1);

        store.remove_item(&arr, 1, 3, &ItemBounds::unbounded()).unwrap();

        let paths: Vec<String> = store.paths().map(ToString::to_string).collect();
        assert_eq!(
            paths,
            vec![
                "root.items",
                "root.items[0].name",
                "root.items[1].name",
                "root.items[1].tags",
                "root.items[1].tags[0]",
            ]
        );
        assert_eq!(store.count(&arr), Some(2));
        assert_eq!(store.value(&p("root.items[1].name")), Some(&"c".into()));
    }

    #[test]
    fn test_bounds_enforced() {
        let mut store = LiveValueStore::new();
        let arr = p("root");
        let bounds = ItemBounds {
            min_items: Some(2),
            max_items: Some(2),
        };
        let err = store.push_item(&arr, 2, &bounds).unwrap_err();
        assert!(matches!(err, FormError::ItemBounds { .. }));
        let err = store.remove_item(&arr, 0, 2, &bounds).unwrap_err();
        assert!(matches!(err, FormError::ItemBounds { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_push_uses_renderer_count_until_recorded() {
        let mut store = LiveValueStore::new();
        let arr = p("root.list");
        assert_eq!(store.push_item(&arr, 2, &ItemBounds::unbounded()).unwrap(), 2);
        assert_eq!(store.count(&arr), Some(3));
        assert_eq!(store.push_item(&arr, 0, &ItemBounds::unbounded()).unwrap(), 3);
    }

    #[test]
    fn test_insert_item_shifts_later_items() {
        let mut store = LiveValueStore::new();
        let arr = p("root.list");
        store.set_count(&arr, 2);
        store.set_value(&p("root.list[0]"), "a");
        store.set_value(&p("root.list[1]"), "b");
        store.insert_item(&arr, 1, 2, &ItemBounds::unbounded()).unwrap();
        assert_eq!(store.value(&p("root.list[0]")), Some(&"a".into()));
        assert_eq!(store.value(&p("root.list[1]")), None);
        assert_eq!(store.value(&p("root.list[2]")), Some(&"b".into()));
        assert_eq!(store.count(&arr), Some(3));
    }

    #[test]
    fn test_remove_out_of_range_is_invalid_path() {
        let mut store = LiveValueStore::new();
        let err = store
            .remove_item(&p("root.list"), 4, 2, &ItemBounds::unbounded())
            .unwrap_err();
        assert!(matches!(err, FormError::InvalidPath { .. }));
    }

    #[test]
    fn test_select_variant_discards_previous_branch() {
        let mut store = LiveValueStore::new();
        let node = p("root.choice");
        store.set_value(&node, "leftover");
        store.set_value(&p("root.choice.a"), "x");
        store.set_value(&p("root.sibling"), "keep");

        store.select_variant(&node, 1);

        assert_eq!(store.variant(&node), Some(1));
        assert_eq!(store.value(&node), None);
        assert_eq!(store.value(&p("root.choice.a")), None);
        assert_eq!(store.value(&p("root.sibling")), Some(&"keep".into()));
    }

    #[test]
    fn test_reselecting_same_variant_keeps_values() {
        let mut store = LiveValueStore::new();
        let node = p("root.choice");
        store.select_variant(&node, 1);
        store.set_value(&p("root.choice.a"), "x");
        store.select_variant(&node, 1);
        assert_eq!(store.value(&p("root.choice.a")), Some(&"x".into()));
    }

    #[test]
    fn test_pattern_entries() {
        let mut store = LiveValueStore::new();
        let group = p("root.labels");
        assert_eq!(store.add_entry(&group, "x-one"), 0);
        assert_eq!(store.add_entry(&group, "x-two"), 1);
        store.set_value(&group.item(1), "2");
        store.rename_entry(&group, 1, "x-2").unwrap();
        assert_eq!(store.key(&group.item(1)), Some("x-2"));

        store.remove_entry(&group, 0).unwrap();
        assert_eq!(store.count(&group), Some(1));
        assert_eq!(store.key(&group.item(0)), Some("x-2"));
        assert_eq!(store.value(&group.item(0)), Some(&"2".into()));
        assert!(store.rename_entry(&group, 3, "nope").is_err());
    }

    #[test]
    fn test_serde_is_keyed_by_path_string() {
        let mut store = LiveValueStore::new();
        store.set_value(&p("root.a[0]"), "x");
        store.select_variant(&p("root.b"), 2);
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["root.a[0]"]["value"], serde_json::json!("x"));
        assert_eq!(json["root.b"]["variant"], serde_json::json!(2));
        let back: LiveValueStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }
}
