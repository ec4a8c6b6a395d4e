//! Eager external-reference pass.
//!
//! Runs once per load, before anything is synthesized:
//!
//! 1. **Fetch**: scan the root for external `$ref` targets, fetch every
//!    base URI not already in the cache, scan the fetched documents the same
//!    way, and repeat until nothing new turns up. Failures are cached too.
//! 2. **Inline**: replace each external `$ref` with its fetched content
//!    (merged with the referencing node's siblings). Internal refs inside the
//!    lifted content are made absolute so they keep pointing into their own
//!    document, and are inlined in turn.
//!
//! Internal refs of the root stay lazy. An external ref that failed to
//! fetch, or that would re-enter a ref already being inlined, stays in place
//! in absolute form; [`crate::resolver::Resolver`] later reports it as
//! unresolved or circular.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use url::Url;

use crate::cache::{base_key, split_fragment, CacheEntry, ExternalSchemaCache};
use crate::fetch::SchemaFetcher;
use crate::resolver::{absolutize_refs, document_base, resolve_in_document};
use crate::schema_utils::{for_each_subschema, for_each_subschema_mut};

/// Fetch every external document reachable from `root`, then inline them.
///
/// Returns the rewritten root. The cache is filled as a side effect and is
/// consulted before every fetch, so a URI is requested at most once.
pub async fn preresolve(
    root: &Value,
    loaded_from: Option<&Url>,
    fetcher: &dyn SchemaFetcher,
    cache: &mut ExternalSchemaCache,
) -> Value {
    let fetched = fetch_external_documents(root, loaded_from, fetcher, cache).await;
    tracing::debug!(fetched, cached = cache.len(), "external documents ready");
    inline_external_refs(root, loaded_from, cache)
}

/// Fetch phase. Returns the number of fetches issued.
pub async fn fetch_external_documents(
    root: &Value,
    loaded_from: Option<&Url>,
    fetcher: &dyn SchemaFetcher,
    cache: &mut ExternalSchemaCache,
) -> usize {
    let root_base = document_base(root, loaded_from);
    let mut pending = external_documents(root, root_base.as_ref());
    let mut fetches = 0;

    while let Some(uri) = pending.pop_first() {
        if cache.contains(&uri) {
            continue;
        }
        fetches += 1;
        match fetcher.fetch(&uri).await {
            Ok(document) => {
                let doc_url = Url::parse(&uri).ok();
                let doc_base = document_base(&document, doc_url.as_ref());
                for next in external_documents(&document, doc_base.as_ref()) {
                    if next != uri && !cache.contains(&next) {
                        pending.insert(next);
                    }
                }
                cache.insert_document(&uri, document);
            }
            Err(e) => {
                tracing::warn!(%uri, error = %e, "failed to fetch external schema");
                cache.insert_failure(&uri, e.to_string());
            }
        }
    }

    fetches
}

/// Base URIs of every external document `document` refers to.
fn external_documents(document: &Value, base: Option<&Url>) -> BTreeSet<String> {
    let own = base.map(|b| base_key(b.as_str()));
    let mut found = BTreeSet::new();
    collect_refs(document, &mut |reference| {
        if let Some(absolute) = external_uri(reference, base) {
            let key = base_key(&absolute);
            if Some(&key) != own.as_ref() {
                found.insert(key);
            }
        }
    });
    found
}

fn collect_refs<F: FnMut(&str)>(node: &Value, visit: &mut F) {
    let Value::Object(obj) = node else {
        return;
    };
    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        visit(reference);
    }
    for_each_subschema(obj, |child| collect_refs(child, visit));
}

/// The absolute `http(s)` URI a reference points to, if it is external.
fn external_uri(reference: &str, base: Option<&Url>) -> Option<String> {
    if reference.starts_with('#') {
        return None;
    }
    let absolute = match base {
        Some(base) => base.join(reference),
        None => Url::parse(reference),
    }
    .ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}

// ---------------------------------------------------------------------------
// Inline phase
// ---------------------------------------------------------------------------

/// Replace external refs in `root` with cached content. Synchronous; never
/// fetches.
pub fn inline_external_refs(
    root: &Value,
    loaded_from: Option<&Url>,
    cache: &ExternalSchemaCache,
) -> Value {
    let base = document_base(root, loaded_from);
    let inliner = Inliner {
        cache,
        root_uri: base.as_ref().map(|b| base_key(b.as_str())),
        base,
    };
    let mut root = root.clone();
    inliner.inline(&mut root, &BTreeSet::new());
    root
}

struct Inliner<'a> {
    cache: &'a ExternalSchemaCache,
    base: Option<Url>,
    root_uri: Option<String>,
}

impl Inliner<'_> {
    /// `active` holds the absolute refs currently being inlined above this
    /// node.
    fn inline(&self, node: &mut Value, active: &BTreeSet<String>) {
        let Value::Object(obj) = node else {
            return;
        };

        if let Some(absolute) = obj
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| external_uri(r, self.base.as_ref()))
        {
            let (doc_uri, fragment) = split_fragment(&absolute);
            if Some(&doc_uri) != self.root_uri.as_ref() {
                if let Some(mut replaced) = self.replacement(obj, &absolute, &doc_uri, &fragment, active) {
                    let mut active = active.clone();
                    active.insert(absolute);
                    self.inline(&mut replaced, &active);
                    *node = replaced;
                } else {
                    obj.insert("$ref".to_string(), Value::String(absolute));
                    self.inline_children(node, active);
                }
                return;
            }
        }

        self.inline_children(node, active);
    }

    fn inline_children(&self, node: &mut Value, active: &BTreeSet<String>) {
        if let Value::Object(obj) = node {
            for_each_subschema_mut(obj, |child| self.inline(child, active));
        }
    }

    /// The fetched target merged with the referencing node's siblings, or
    /// `None` when the ref must stay (cycle, failed fetch, missing fragment).
    fn replacement(
        &self,
        obj: &Map<String, Value>,
        absolute: &str,
        doc_uri: &str,
        fragment: &str,
        active: &BTreeSet<String>,
    ) -> Option<Value> {
        if active.contains(absolute) {
            tracing::debug!(reference = %absolute, "cyclic external ref left in place");
            return None;
        }
        let document = match self.cache.get(doc_uri)? {
            CacheEntry::Document(doc) => doc,
            CacheEntry::Failed(_) => return None,
        };
        let Some(target) = resolve_in_document(document, fragment) else {
            tracing::warn!(reference = %absolute, "fragment not found in fetched document");
            return None;
        };
        let target = absolutize_refs(target.clone(), doc_uri);

        let mut siblings = obj.clone();
        siblings.remove("$ref");
        Some(match target {
            Value::Object(mut merged) => {
                for (key, value) in siblings {
                    merged.insert(key, value);
                }
                Value::Object(merged)
            }
            Value::Bool(true) if !siblings.is_empty() => Value::Object(siblings),
            other => other,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockFetcher {
        documents: HashMap<String, Value>,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn new(documents: Vec<(&str, Value)>) -> Self {
            Self {
                documents: documents
                    .into_iter()
                    .map(|(uri, doc)| (uri.to_string(), doc))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SchemaFetcher for MockFetcher {
        async fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(uri)
                .cloned()
                .ok_or(FetchError::Status { status: 404 })
        }
    }

    #[tokio::test]
    async fn test_inlines_external_fragment() {
        let fetcher = MockFetcher::new(vec![(
            "https://x.test/s.json",
            json!({ "$defs": { "Name": { "type": "string", "minLength": 1 } } }),
        )]);
        let mut cache = ExternalSchemaCache::new();
        let root = json!({
            "type": "object",
            "properties": { "name": { "$ref": "https://x.test/s.json#/$defs/Name", "title": "Name" } }
        });

        let resolved = preresolve(&root, None, &fetcher, &mut cache).await;
        assert_eq!(
            resolved["properties"]["name"],
            json!({ "type": "string", "minLength": 1, "title": "Name" })
        );
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_cached_and_not_refetched() {
        let fetcher = MockFetcher::new(vec![]);
        let mut cache = ExternalSchemaCache::new();
        let root = json!({
            "properties": {
                "a": { "$ref": "https://x.test/schema.json#/$defs/Name" },
                "b": { "$ref": "https://x.test/schema.json#/$defs/Other" }
            }
        });

        let resolved = preresolve(&root, None, &fetcher, &mut cache).await;
        assert_eq!(fetcher.calls(), 1);
        assert!(matches!(
            cache.get("https://x.test/schema.json"),
            Some(CacheEntry::Failed(_))
        ));
        // Refs stay in place for lazy resolution to report.
        assert_eq!(
            resolved["properties"]["a"]["$ref"],
            json!("https://x.test/schema.json#/$defs/Name")
        );

        // A second pass over the same cache issues no new fetch.
        let _ = preresolve(&root, None, &fetcher, &mut cache).await;
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_follows_refs_inside_fetched_documents() {
        let fetcher = MockFetcher::new(vec![
            (
                "https://x.test/a.json",
                json!({ "type": "object", "properties": { "b": { "$ref": "b.json" } } }),
            ),
            ("https://x.test/b.json", json!({ "type": "integer" })),
        ]);
        let mut cache = ExternalSchemaCache::new();
        let root = json!({ "$ref": "https://x.test/a.json" });

        let resolved = preresolve(&root, None, &fetcher, &mut cache).await;
        assert_eq!(resolved["properties"]["b"], json!({ "type": "integer" }));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_internal_refs_of_fetched_document_are_scoped() {
        let fetcher = MockFetcher::new(vec![(
            "https://x.test/s.json",
            json!({
                "$defs": {
                    "W": { "type": "object", "properties": { "n": { "$ref": "#/$defs/N" } } },
                    "N": { "type": "number" }
                }
            }),
        )]);
        let mut cache = ExternalSchemaCache::new();
        // The root also has a #/$defs/N, which must not be picked up.
        let root = json!({
            "$defs": { "N": { "type": "boolean" } },
            "$ref": "https://x.test/s.json#/$defs/W"
        });

        let resolved = preresolve(&root, None, &fetcher, &mut cache).await;
        assert_eq!(resolved["properties"]["n"], json!({ "type": "number" }));
    }

    #[tokio::test]
    async fn test_cyclic_external_refs_left_in_place() {
        let fetcher = MockFetcher::new(vec![(
            "https://x.test/tree.json",
            json!({
                "type": "object",
                "properties": { "child": { "$ref": "#" } }
            }),
        )]);
        let mut cache = ExternalSchemaCache::new();
        let root = json!({ "$ref": "https://x.test/tree.json" });

        let resolved = preresolve(&root, None, &fetcher, &mut cache).await;
        assert_eq!(resolved["type"], json!("object"));
        assert_eq!(
            resolved["properties"]["child"]["properties"]["child"],
            json!({ "$ref": "https://x.test/tree.json#" })
        );
    }

    #[tokio::test]
    async fn test_relative_refs_use_load_url() {
        let fetcher = MockFetcher::new(vec![("https://x.test/dir/b.json", json!({ "type": "boolean" }))]);
        let mut cache = ExternalSchemaCache::new();
        let root = json!({ "properties": { "flag": { "$ref": "b.json" } } });
        let base = Url::parse("https://x.test/dir/root.json").unwrap();

        let resolved = preresolve(&root, Some(&base), &fetcher, &mut cache).await;
        assert_eq!(resolved["properties"]["flag"], json!({ "type": "boolean" }));
    }

    #[test]
    fn test_internal_refs_stay_lazy() {
        let cache = ExternalSchemaCache::new();
        let root = json!({ "$defs": { "A": {} }, "properties": { "a": { "$ref": "#/$defs/A" } } });
        assert_eq!(inline_external_refs(&root, None, &cache), root);
    }
}
