//! Session-scoped store of externally fetched schema documents.
//!
//! Keys are base URIs with the fragment stripped, so `https://x/s.json#/a`
//! and `https://x/s.json#/b` share one entry and one fetch. A failed fetch
//! is recorded as [`CacheEntry::Failed`] so the same URI is never retried
//! within a session. Entries never expire; [`ExternalSchemaCache::reset`]
//! is the only way to drop them.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

/// Outcome of fetching one external document.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// The parsed document.
    Document(Arc<Value>),
    /// The fetch failed; the reason is kept for diagnostics.
    Failed(String),
}

impl CacheEntry {
    /// The document, if the fetch succeeded.
    pub fn document(&self) -> Option<&Value> {
        match self {
            CacheEntry::Document(doc) => Some(doc),
            CacheEntry::Failed(_) => None,
        }
    }
}

/// Map from fragment-less base URI to fetched document or failure sentinel.
#[derive(Debug, Clone, Default)]
pub struct ExternalSchemaCache {
    entries: HashMap<String, CacheEntry>,
}

impl ExternalSchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for a URI. The fragment, if any, is ignored.
    pub fn get(&self, uri: &str) -> Option<&CacheEntry> {
        self.entries.get(&base_key(uri))
    }

    /// Whether a fetch for this URI has already completed (either way).
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(&base_key(uri))
    }

    /// Record a successfully fetched document.
    pub fn insert_document(&mut self, uri: &str, document: Value) {
        let key = base_key(uri);
        tracing::debug!(uri = %key, "caching external schema document");
        self.entries
            .insert(key, CacheEntry::Document(Arc::new(document)));
    }

    /// Record a failed fetch so the URI is not retried.
    pub fn insert_failure(&mut self, uri: &str, reason: impl Into<String>) {
        let key = base_key(uri);
        let reason = reason.into();
        tracing::debug!(uri = %key, %reason, "caching external schema failure");
        self.entries.insert(key, CacheEntry::Failed(reason));
    }

    /// Iterate over all successfully fetched documents.
    pub fn documents(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter_map(|(uri, entry)| entry.document().map(|doc| (uri.as_str(), doc)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Called when the schema changes or the session resets.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

/// Strip the fragment from a URI to form the cache key.
///
/// Absolute URIs are normalized through [`Url`]; anything that does not parse
/// is split at the first `#` instead.
pub fn base_key(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => uri.split('#').next().unwrap_or(uri).to_string(),
    }
}

/// Split a reference into its fragment-less base and its fragment
/// (without the leading `#`; empty when absent).
pub(crate) fn split_fragment(uri: &str) -> (String, String) {
    let fragment = uri.split_once('#').map(|(_, f)| f).unwrap_or("");
    (base_key(uri), fragment.to_string())
}
