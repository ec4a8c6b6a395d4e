//! Error types for schema loading and form state mutation.
//!
//! Malformed schemas are not errors here: dangling refs, cycles, `false`
//! schemas and unsupported combinators are carried as data (see
//! [`crate::resolver::ResolvedNode`]). These types cover what can genuinely
//! fail: parsing input, fetching documents, and store mutations that would
//! break a schema bound.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error codes.
///
/// Serialized as `snake_case`; variant names form part of the CLI's JSON
/// error output and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// Input was not valid JSON.
    JsonParseError,
    /// A schema document could not be fetched.
    FetchFailed,
    /// An array add/remove would violate `minItems`/`maxItems`.
    ItemBounds,
    /// A path does not address a node the operation applies to.
    InvalidPath,
    /// An operation needed a schema but none is loaded.
    NoSchemaLoaded,
    /// A newer load was started before this one was installed.
    LoadSuperseded,
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("JSON (de)serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to fetch {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("Item bounds violated at {path}: {message}")]
    ItemBounds { path: String, message: String },

    #[error("Invalid path {path}: {message}")]
    InvalidPath { path: String, message: String },

    #[error("No schema loaded")]
    NoSchemaLoaded,

    #[error("Schema load superseded (generation {generation} is no longer current)")]
    LoadSuperseded { generation: u64 },
}

impl FormError {
    /// Returns the stable error code for this error variant.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FormError::JsonError(_) => ErrorCode::JsonParseError,
            FormError::Fetch { .. } => ErrorCode::FetchFailed,
            FormError::ItemBounds { .. } => ErrorCode::ItemBounds,
            FormError::InvalidPath { .. } => ErrorCode::InvalidPath,
            FormError::NoSchemaLoaded => ErrorCode::NoSchemaLoaded,
            FormError::LoadSuperseded { .. } => ErrorCode::LoadSuperseded,
        }
    }

    /// Returns the field path (or URI) context, if available.
    pub fn path(&self) -> Option<&str> {
        match self {
            FormError::JsonError(_) => None,
            FormError::Fetch { uri, .. } => Some(uri),
            FormError::ItemBounds { path, .. } => Some(path),
            FormError::InvalidPath { path, .. } => Some(path),
            FormError::NoSchemaLoaded => None,
            FormError::LoadSuperseded { .. } => None,
        }
    }

    /// Produces a structured JSON error.
    ///
    /// Format: `{"code": "...", "message": "...", "path": "..." | null}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "path": self.path(),
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_serializes_snake_case() {
        let json = serde_json::to_value(ErrorCode::ItemBounds).unwrap();
        assert_eq!(json, json!("item_bounds"));
    }

    #[test]
    fn test_error_code_round_trips() {
        let code = ErrorCode::LoadSuperseded;
        let json_str = serde_json::to_string(&code).unwrap();
        let deserialized: ErrorCode = serde_json::from_str(&json_str).unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_to_json_includes_path() {
        let err = FormError::ItemBounds {
            path: "root.tags".to_string(),
            message: "at most 2 items allowed".to_string(),
        };
        let json = err.to_json();
        assert_eq!(json["code"], json!("item_bounds"));
        assert_eq!(json["path"], json!("root.tags"));
        assert!(json["message"].as_str().unwrap().contains("at most 2"));
    }

    #[test]
    fn test_to_json_null_path() {
        let json = FormError::NoSchemaLoaded.to_json();
        assert_eq!(json["code"], json!("no_schema_loaded"));
        assert!(json["path"].is_null());
    }

    #[test]
    fn test_json_error_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: FormError = parse_err.into();
        assert_eq!(err.error_code(), ErrorCode::JsonParseError);
        assert!(err.path().is_none());
    }
}
