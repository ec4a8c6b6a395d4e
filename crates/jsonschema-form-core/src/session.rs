//! Session controller.
//!
//! A [`Session`] owns everything with a lifetime: the loaded root document,
//! the [`ExternalSchemaCache`] filled while loading it, the
//! [`LiveValueStore`] the renderer writes into, and the compiled validator.
//! All queries ([`Session::descriptor_tree`], [`Session::collect`],
//! [`Session::validate`], [`Session::resolve_at`]) are recomputed from that
//! state on every call.
//!
//! Loading is split in two so that a slow fetch never leaves the session
//! half-updated:
//!
//! ```text
//! begin_load() ──► LoadTicket ──► SchemaLoader::prepare().await ──► PreparedSchema
//!                                                                       │
//!                                      Session::install() ◄─────────────┘
//! ```
//!
//! [`Session::install`] swaps root, cache, store and validator in one step.
//! A prepared schema whose ticket is older than the latest `begin_load` (or
//! `reset`) is rejected with [`FormError::LoadSuperseded`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::cache::ExternalSchemaCache;
use crate::collector;
use crate::config::SessionOptions;
use crate::descriptor::{self, FieldDescriptor};
use crate::error::FormError;
use crate::fetch::{HttpFetcher, SchemaFetcher};
use crate::path::FieldPath;
use crate::preresolve::preresolve;
use crate::resolver::{ResolvedNode, Resolver};
use crate::store::{ItemBounds, LeafValue, LiveValueStore};
use crate::validation::{
    run_validation, CompiledSchema, JsonSchemaEngine, ValidationOutcome, ValidatorEngine,
};

/// Where a schema comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// An already-parsed document.
    Value(Value),
    /// JSON text, e.g. pasted by the user.
    Text(String),
    /// An `http(s)` URL to fetch.
    Url(String),
}

/// Proof of the load a [`PreparedSchema`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything that belongs to one loaded schema.
struct LoadedSchema {
    root: Value,
    cache: ExternalSchemaCache,
    loaded_from: Option<Url>,
    validator: Result<Box<dyn CompiledSchema>, String>,
}

/// A fully pre-resolved schema, ready to install.
pub struct PreparedSchema {
    ticket: LoadTicket,
    schema: LoadedSchema,
}

impl PreparedSchema {
    pub fn ticket(&self) -> LoadTicket {
        self.ticket
    }

    /// The pre-resolved root document.
    pub fn root(&self) -> &Value {
        &self.schema.root
    }

    /// Whether a validator was compiled.
    pub fn has_validator(&self) -> bool {
        self.schema.validator.is_ok()
    }
}

impl std::fmt::Debug for PreparedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedSchema")
            .field("ticket", &self.ticket)
            .field("loaded_from", &self.schema.loaded_from)
            .field("cached_documents", &self.schema.cache.len())
            .finish()
    }
}

/// The async half of loading. Cheap to clone; holds no session state.
#[derive(Clone)]
pub struct SchemaLoader {
    fetcher: Arc<dyn SchemaFetcher>,
    engine: Arc<dyn ValidatorEngine>,
    options: SessionOptions,
}

impl SchemaLoader {
    /// Parse or fetch `source`, fetch and inline every external reference
    /// into a fresh cache, and compile the validator.
    ///
    /// Schema problems do not fail the load. Only unparseable input or a
    /// failed fetch of the schema itself do.
    pub async fn prepare(
        &self,
        ticket: LoadTicket,
        source: SchemaSource,
    ) -> Result<PreparedSchema, FormError> {
        let mut cache = ExternalSchemaCache::new();

        let (raw, loaded_from) = match source {
            SchemaSource::Value(value) => (value, None),
            SchemaSource::Text(text) => (serde_json::from_str(&text)?, None),
            SchemaSource::Url(uri) => {
                let url = Url::parse(&uri).map_err(|e| FormError::Fetch {
                    uri: uri.clone(),
                    reason: e.to_string(),
                })?;
                let document = self
                    .fetcher
                    .fetch(url.as_str())
                    .await
                    .map_err(|e| FormError::Fetch {
                        uri: uri.clone(),
                        reason: e.to_string(),
                    })?;
                // Refs back to the schema's own URL must not refetch it.
                cache.insert_document(url.as_str(), document.clone());
                (document, Some(url))
            }
        };

        tracing::debug!(generation = ticket.generation, "pre-resolving schema");
        let root = preresolve(&raw, loaded_from.as_ref(), self.fetcher.as_ref(), &mut cache).await;

        let validator = if self.options.validate {
            self.engine.compile(&root, &cache, loaded_from.as_ref())
        } else {
            Err("validation is disabled".to_string())
        };

        Ok(PreparedSchema {
            ticket,
            schema: LoadedSchema {
                root,
                cache,
                loaded_from,
                validator,
            },
        })
    }
}

/// One form-editing session.
pub struct Session {
    options: SessionOptions,
    fetcher: Arc<dyn SchemaFetcher>,
    engine: Arc<dyn ValidatorEngine>,
    generation: u64,
    loaded: Option<LoadedSchema>,
    store: LiveValueStore,
}

impl Session {
    /// A session using [`HttpFetcher`] and [`JsonSchemaEngine`].
    pub fn new(options: SessionOptions) -> Result<Self, FormError> {
        let fetcher = HttpFetcher::new(Duration::from_secs(options.fetch_timeout_secs)).map_err(
            |e| FormError::Fetch {
                uri: String::new(),
                reason: e.to_string(),
            },
        )?;
        Ok(Self::with_capabilities(
            options,
            Arc::new(fetcher),
            Arc::new(JsonSchemaEngine),
        ))
    }

    /// A session with host-supplied fetcher and validator engine.
    pub fn with_capabilities(
        options: SessionOptions,
        fetcher: Arc<dyn SchemaFetcher>,
        engine: Arc<dyn ValidatorEngine>,
    ) -> Self {
        Self {
            options,
            fetcher,
            engine,
            generation: 0,
            loaded: None,
            store: LiveValueStore::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Start a load. Any ticket issued earlier becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// A loader that can run without borrowing the session.
    pub fn loader(&self) -> SchemaLoader {
        SchemaLoader {
            fetcher: Arc::clone(&self.fetcher),
            engine: Arc::clone(&self.engine),
            options: self.options.clone(),
        }
    }

    /// Install a prepared schema, replacing the current one and clearing the
    /// store. Fails without touching the session if the ticket is stale.
    pub fn install(&mut self, prepared: PreparedSchema) -> Result<(), FormError> {
        if prepared.ticket.generation != self.generation {
            tracing::debug!(
                stale = prepared.ticket.generation,
                current = self.generation,
                "discarding superseded schema load"
            );
            return Err(FormError::LoadSuperseded {
                generation: prepared.ticket.generation,
            });
        }
        if let Err(reason) = &prepared.schema.validator {
            tracing::warn!(%reason, "validation unavailable for this schema");
        }
        self.loaded = Some(prepared.schema);
        self.store.clear();
        Ok(())
    }

    /// Load and install in one step.
    pub async fn load(&mut self, source: SchemaSource) -> Result<(), FormError> {
        let ticket = self.begin_load();
        let prepared = self.loader().prepare(ticket, source).await?;
        self.install(prepared)
    }

    pub async fn load_value(&mut self, schema: Value) -> Result<(), FormError> {
        self.load(SchemaSource::Value(schema)).await
    }

    pub async fn load_text(&mut self, text: &str) -> Result<(), FormError> {
        self.load(SchemaSource::Text(text.to_string())).await
    }

    pub async fn load_url(&mut self, url: &str) -> Result<(), FormError> {
        self.load(SchemaSource::Url(url.to_string())).await
    }

    /// Drop the schema, cache, store and validator. In-flight loads become
    /// stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.loaded = None;
        self.store.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// The pre-resolved root document.
    pub fn root(&self) -> Option<&Value> {
        self.loaded.as_ref().map(|l| &l.root)
    }

    /// The URL the schema was loaded from: the session's shareable state.
    pub fn schema_url(&self) -> Option<&str> {
        self.loaded
            .as_ref()
            .and_then(|l| l.loaded_from.as_ref())
            .map(Url::as_str)
    }

    pub fn cache(&self) -> Option<&ExternalSchemaCache> {
        self.loaded.as_ref().map(|l| &l.cache)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn resolver(&self) -> Result<Resolver<'_>, FormError> {
        let loaded = self.loaded.as_ref().ok_or(FormError::NoSchemaLoaded)?;
        Ok(Resolver::new(
            &loaded.root,
            &loaded.cache,
            loaded.loaded_from.as_ref(),
        ))
    }

    pub fn descriptor_tree(&self) -> Result<FieldDescriptor, FormError> {
        let resolver = self.resolver()?;
        Ok(descriptor::synthesize(&resolver, &self.store, &self.options))
    }

    pub fn collect(&self) -> Result<Option<Value>, FormError> {
        let resolver = self.resolver()?;
        Ok(collector::collect(&resolver, &self.store, &self.options))
    }

    /// Collect, then validate the collected document. An absent document is
    /// validated as `null`.
    pub fn validate(&self) -> Result<ValidationOutcome, FormError> {
        let loaded = self.loaded.as_ref().ok_or(FormError::NoSchemaLoaded)?;
        let document = self.collect()?.unwrap_or(Value::Null);
        let compiled = match &loaded.validator {
            Ok(compiled) => Ok(compiled.as_ref()),
            Err(reason) => Err(reason.as_str()),
        };
        Ok(run_validation(compiled, &document))
    }

    /// The effective schema at `path`, honoring selected variants.
    pub fn resolve_at(&self, path: &FieldPath) -> Result<ResolvedNode, FormError> {
        let resolver = self.resolver()?;
        Ok(resolver.resolve_at(path, &self.store)?.node)
    }

    // -----------------------------------------------------------------------
    // Renderer notifications
    // -----------------------------------------------------------------------

    pub fn store(&self) -> &LiveValueStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LiveValueStore {
        &mut self.store
    }

    pub fn set_value(&mut self, path: &FieldPath, value: impl Into<LeafValue>) {
        self.store.set_value(path, value);
    }

    pub fn clear_value(&mut self, path: &FieldPath) {
        self.store.clear_value(path);
    }

    pub fn select_variant(&mut self, path: &FieldPath, index: usize) {
        self.store.select_variant(path, index);
    }

    /// Append an item to the array at `path`. Returns the new index.
    pub fn add_item(&mut self, array: &FieldPath) -> Result<usize, FormError> {
        let (bounds, current) = self.array_bounds(array)?;
        self.store.push_item(array, current, &bounds)
    }

    /// Insert an item at `at`, shifting later items up.
    pub fn insert_item(&mut self, array: &FieldPath, at: usize) -> Result<usize, FormError> {
        let (bounds, current) = self.array_bounds(array)?;
        self.store.insert_item(array, at, current, &bounds)
    }

    /// Remove item `index`, renumbering every later item and its descendants.
    pub fn remove_item(&mut self, array: &FieldPath, index: usize) -> Result<(), FormError> {
        let (bounds, current) = self.array_bounds(array)?;
        self.store.remove_item(array, index, current, &bounds)
    }

    /// Add a pattern-property entry to the object at `group`.
    pub fn add_entry(
        &mut self,
        group: &FieldPath,
        key: impl Into<String>,
    ) -> Result<usize, FormError> {
        self.require_pattern_group(group)?;
        Ok(self.store.add_entry(group, key))
    }

    pub fn rename_entry(
        &mut self,
        group: &FieldPath,
        index: usize,
        key: impl Into<String>,
    ) -> Result<(), FormError> {
        self.require_pattern_group(group)?;
        self.store.rename_entry(group, index, key)
    }

    pub fn remove_entry(&mut self, group: &FieldPath, index: usize) -> Result<(), FormError> {
        self.require_pattern_group(group)?;
        self.store.remove_entry(group, index)
    }

    /// Bounds and current slot count of the array at `path`.
    fn array_bounds(&self, path: &FieldPath) -> Result<(ItemBounds, usize), FormError> {
        let resolver = self.resolver()?;
        let resolved = resolver.resolve_at(path, &self.store)?;
        match resolver.active(resolved, path, &self.store).node {
            ResolvedNode::Array(shape) => Ok((
                ItemBounds {
                    min_items: shape.min_items,
                    max_items: shape.max_items,
                },
                self.options.initial_slots(shape.min_items),
            )),
            _ => Err(FormError::InvalidPath {
                path: path.to_string(),
                message: "not an array".to_string(),
            }),
        }
    }

    fn require_pattern_group(&self, path: &FieldPath) -> Result<(), FormError> {
        let resolver = self.resolver()?;
        let resolved = resolver.resolve_at(path, &self.store)?;
        match resolver.active(resolved, path, &self.store).node {
            ResolvedNode::Object(shape) if !shape.pattern_properties.is_empty() => Ok(()),
            _ => Err(FormError::InvalidPath {
                path: path.to_string(),
                message: "no patternProperties here".to_string(),
            }),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
