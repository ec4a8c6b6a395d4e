//! Validation adapter.
//!
//! The validation algorithm itself is a black box behind [`ValidatorEngine`].
//! This module compiles the pre-resolved root once per load, runs it against
//! each collected document, and turns every structured error into one
//! readable sentence.
//!
//! Failure modes degrade instead of propagating:
//! - compilation failure → [`ValidationOutcome::Unavailable`]
//! - a panic inside the engine → [`ValidationOutcome::Failed`]

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{Retrieve, Uri};
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::cache::{base_key, ExternalSchemaCache};
use crate::schema_utils::{display_literal, split_path};

/// One structured validation error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// JSON Pointer into the validated document (`""` for the root).
    pub instance_path: String,
    /// The failing keyword, e.g. `required` or `minItems`.
    pub keyword: String,
    /// Keyword-specific details (`{"limit": 2}`, `{"missingProperty": "a"}`,
    /// `{"unexpected": ["x", "y"]}`).
    pub params: Value,
    /// The engine's own message.
    pub message: String,
}

/// Result of validating one collected document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    /// One readable sentence per error.
    Invalid(Vec<String>),
    /// No validator could be compiled for this schema.
    Unavailable(String),
    /// The validator failed while running.
    Failed(String),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

/// A validator compiled for one schema.
pub trait CompiledSchema: Send + Sync {
    fn validate(&self, instance: &Value) -> Vec<ValidationIssue>;
}

/// Compiles schemas into [`CompiledSchema`]s.
pub trait ValidatorEngine: Send + Sync {
    /// `cache` holds every external document the schema may still refer to.
    fn compile(
        &self,
        schema: &Value,
        cache: &ExternalSchemaCache,
        base: Option<&Url>,
    ) -> Result<Box<dyn CompiledSchema>, String>;
}

/// Run `compiled` (if any) against `instance` and humanize the result.
pub fn run_validation(
    compiled: Result<&dyn CompiledSchema, &str>,
    instance: &Value,
) -> ValidationOutcome {
    let compiled = match compiled {
        Ok(compiled) => compiled,
        Err(reason) => return ValidationOutcome::Unavailable(reason.to_string()),
    };

    let issues = match panic::catch_unwind(AssertUnwindSafe(|| compiled.validate(instance))) {
        Ok(issues) => issues,
        Err(_) => {
            tracing::warn!("validator panicked");
            return ValidationOutcome::Failed(
                "Validation could not be completed because the validator failed unexpectedly."
                    .to_string(),
            );
        }
    };

    if issues.is_empty() {
        ValidationOutcome::Valid
    } else {
        ValidationOutcome::Invalid(issues.iter().map(humanize).collect())
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// `/a/0/b` → `a.0.b`; the empty pointer → `root`.
pub fn human_path(pointer: &str) -> String {
    let segments = split_path(pointer);
    if segments.is_empty() {
        "root".to_string()
    } else {
        segments.join(".")
    }
}

/// One readable sentence for an issue.
pub fn humanize(issue: &ValidationIssue) -> String {
    let field = human_path(&issue.instance_path);
    let param = |key: &str| issue.params.get(key).map(display_literal);

    let sentence = match (issue.keyword.as_str(), &issue.params) {
        ("required", _) => param("missingProperty")
            .map(|p| format!("{} is missing required property \"{}\"", field, p)),
        ("const", _) => param("allowedValue").map(|v| format!("{} must be equal to {}", field, v)),
        ("enum", Value::Object(params)) => params.get("allowedValues").and_then(Value::as_array).map(
            |values| {
                let list: Vec<String> = values.iter().map(display_literal).collect();
                format!("{} must be one of: {}", field, list.join(", "))
            },
        ),
        ("type", _) => param("type").map(|t| format!("{} must be of type {}", field, t)),
        ("oneOf", _) => Some(format!(
            "{} must match exactly one of the allowed options",
            field
        )),
        ("minItems", _) => param("limit").map(|n| format!("{} must have at least {} items", field, n)),
        ("maxItems", _) => param("limit").map(|n| format!("{} must have at most {} items", field, n)),
        ("minLength", _) => {
            param("limit").map(|n| format!("{} must be at least {} characters long", field, n))
        }
        ("maxLength", _) => {
            param("limit").map(|n| format!("{} must be at most {} characters long", field, n))
        }
        ("minProperties", _) => {
            param("limit").map(|n| format!("{} must have at least {} properties", field, n))
        }
        ("maxProperties", _) => {
            param("limit").map(|n| format!("{} must have at most {} properties", field, n))
        }
        ("minimum", _) => param("limit").map(|n| format!("{} must be >= {}", field, n)),
        ("maximum", _) => param("limit").map(|n| format!("{} must be <= {}", field, n)),
        ("exclusiveMinimum", _) => param("limit").map(|n| format!("{} must be > {}", field, n)),
        ("exclusiveMaximum", _) => param("limit").map(|n| format!("{} must be < {}", field, n)),
        ("pattern", _) => {
            param("pattern").map(|p| format!("{} must match pattern \"{}\"", field, p))
        }
        ("additionalProperties", Value::Object(params)) => params
            .get("unexpected")
            .and_then(Value::as_array)
            .filter(|names| !names.is_empty())
            .map(|names| {
                let quoted: Vec<String> = names
                    .iter()
                    .map(|n| format!("\"{}\"", display_literal(n)))
                    .collect();
                let noun = if quoted.len() == 1 { "property" } else { "properties" };
                format!("{} has unexpected {} {}", field, noun, quoted.join(", "))
            }),
        _ => None,
    };

    sentence.unwrap_or_else(|| format!("{}: {}", field, issue.message))
}

// ---------------------------------------------------------------------------
// jsonschema-backed engine
// ---------------------------------------------------------------------------

/// [`ValidatorEngine`] backed by the `jsonschema` crate (Draft 2020-12).
///
/// External documents are served from the session cache by a local
/// retriever; the validator never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaEngine;

/// Serves cached external documents to the `jsonschema` crate.
struct CachedDocumentRetriever {
    documents: HashMap<String, Value>,
}

impl Retrieve for CachedDocumentRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let key = base_key(uri.as_str());
        self.documents
            .get(&key)
            .cloned()
            .ok_or_else(|| format!("schema {} is not available offline", key).into())
    }
}

impl ValidatorEngine for JsonSchemaEngine {
    fn compile(
        &self,
        schema: &Value,
        cache: &ExternalSchemaCache,
        _base: Option<&Url>,
    ) -> Result<Box<dyn CompiledSchema>, String> {
        let documents = cache
            .documents()
            .map(|(uri, doc)| (uri.to_string(), doc.clone()))
            .collect();

        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft202012);
        opts.with_retriever(CachedDocumentRetriever { documents });

        let validator = opts.build(schema).map_err(|e| {
            tracing::warn!(error = %e, "validator compilation failed");
            e.to_string()
        })?;

        Ok(Box::new(CompiledJsonSchema { validator }))
    }
}

struct CompiledJsonSchema {
    validator: jsonschema::Validator,
}

impl CompiledSchema for CompiledJsonSchema {
    fn validate(&self, instance: &Value) -> Vec<ValidationIssue> {
        self.validator
            .iter_errors(instance)
            .map(|e| {
                let schema_path = e.schema_path.to_string();
                ValidationIssue {
                    instance_path: e.instance_path.to_string(),
                    keyword: split_path(&schema_path).pop().unwrap_or_default(),
                    params: kind_params(&e.kind),
                    message: e.to_string(),
                }
            })
            .collect()
    }
}

/// Keyword parameters carried by the engine's structured error kind.
fn kind_params(kind: &ValidationErrorKind) -> Value {
    match kind {
        ValidationErrorKind::Required { property } => json!({ "missingProperty": property }),
        ValidationErrorKind::Constant { expected_value } => {
            json!({ "allowedValue": expected_value })
        }
        ValidationErrorKind::Enum { options } => json!({ "allowedValues": options }),
        ValidationErrorKind::Type { kind } => json!({ "type": type_names(kind) }),
        ValidationErrorKind::Pattern { pattern } => json!({ "pattern": pattern }),
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            json!({ "unexpected": unexpected })
        }
        ValidationErrorKind::MinItems { limit }
        | ValidationErrorKind::MaxItems { limit }
        | ValidationErrorKind::MinLength { limit }
        | ValidationErrorKind::MaxLength { limit }
        | ValidationErrorKind::MinProperties { limit }
        | ValidationErrorKind::MaxProperties { limit } => json!({ "limit": limit }),
        ValidationErrorKind::Minimum { limit }
        | ValidationErrorKind::Maximum { limit }
        | ValidationErrorKind::ExclusiveMinimum { limit }
        | ValidationErrorKind::ExclusiveMaximum { limit } => json!({ "limit": limit }),
        _ => json!({}),
    }
}

/// `integer`, or `string or null` for a multi-type keyword.
fn type_names(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(t) => t.to_string(),
        TypeKind::Multiple(types) => types
            .into_iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" or "),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
