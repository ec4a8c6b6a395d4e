//! # jsonschema-form-core
//!
//! Turns an arbitrary JSON Schema into an addressable tree of form fields and
//! collects sparse, path-keyed user input back into a JSON document that is
//! validated against the same schema.
//!
//! ## Pipeline
//!
//! ```text
//! load ─► preresolve (fetch + inline external $refs) ─► Resolver (lazy, per node)
//!                                                          │
//!            LiveValueStore ◄── renderer writes ──┐        ▼
//!                  │                              └─ synthesize() ─► FieldDescriptor tree
//!                  ▼
//!              collect() ─► JSON document ─► validate() ─► ValidationOutcome
//! ```
//!
//! [`Session`] ties the stages together and owns all state. The individual
//! stages are public for hosts that want to drive them directly.

pub mod cache;
pub mod collector;
pub mod combinator;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod hints;
pub mod path;
pub mod preresolve;
pub mod resolver;
pub mod schema_utils;
pub mod session;
pub mod store;
pub mod validation;

pub use cache::{CacheEntry, ExternalSchemaCache};
pub use config::SessionOptions;
pub use descriptor::{
    synthesize, DynamicEntry, DynamicGroup, FieldDescriptor, PrimitiveInput, RepeatableSlots,
    Widget,
};
pub use error::{ErrorCode, FormError};
pub use fetch::{FetchError, HttpFetcher, SchemaFetcher};
pub use path::{FieldPath, Segment};
pub use preresolve::preresolve;
pub use resolver::{PrimitiveKind, RefTrail, Resolved, ResolvedNode, Resolver};
pub use session::{LoadTicket, PreparedSchema, SchemaLoader, SchemaSource, Session};
pub use store::{ItemBounds, LeafValue, LiveValueStore};
pub use validation::{
    CompiledSchema, JsonSchemaEngine, ValidationIssue, ValidationOutcome, ValidatorEngine,
};
