#![no_main]

use libfuzzer_sys::fuzz_target;

use jsonschema_form_core::{
    collector, synthesize, ExternalSchemaCache, LiveValueStore, Resolver, SessionOptions,
};

// Accepts arbitrary bytes, attempts to parse as JSON, then synthesizes the
// descriptor tree and collects an empty store.
// Goal: no panics, even on malformed or deeply recursive schemas.
fuzz_target!(|data: &[u8]| {
    if let Ok(schema) = serde_json::from_slice::<serde_json::Value>(data) {
        let cache = ExternalSchemaCache::new();
        let resolver = Resolver::new(&schema, &cache, None);
        let store = LiveValueStore::new();
        let options = SessionOptions::default();
        let _ = synthesize(&resolver, &store, &options);
        let _ = collector::collect(&resolver, &store, &options);
    }
});
