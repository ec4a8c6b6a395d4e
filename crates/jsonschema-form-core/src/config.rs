//! Configuration for a form session.

use serde::{Deserialize, Serialize};

/// Options for a form session.
///
/// ## Serialization Format
///
/// Fields are serialized in `kebab-case` (e.g., `max-depth`, `initial-slot-cap`),
/// matching the CLI flag names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionOptions {
    /// Maximum nesting depth walked by the synthesizer and the collector.
    /// Deeper nodes render as a message and collect no value.
    pub max_depth: usize,
    /// Upper bound on the number of array slots created up front.
    /// Initial slots are `min(minItems, initial_slot_cap)`.
    pub initial_slot_cap: usize,
    /// Timeout for fetching external schema documents over HTTP.
    pub fetch_timeout_secs: u64,
    /// Compile a validator on load. When off, validation reports "not available".
    pub validate: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_depth: 50,
            initial_slot_cap: 5,
            fetch_timeout_secs: 10,
            validate: true,
        }
    }
}

impl SessionOptions {
    /// Number of slots an array starts with before the user adds or removes any.
    pub fn initial_slots(&self, min_items: Option<u64>) -> usize {
        let min = min_items
            .map(|m| usize::try_from(m).unwrap_or(usize::MAX))
            .unwrap_or(0);
        min.min(self.initial_slot_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_options_serde_round_trip() {
        let opts = SessionOptions {
            max_depth: 12,
            initial_slot_cap: 3,
            fetch_timeout_secs: 2,
            validate: false,
        };

        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"max-depth\""));
        assert!(json.contains("\"initial-slot-cap\""));
        assert!(json.contains("\"fetch-timeout-secs\""));

        let deserialized: SessionOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, opts);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let opts: SessionOptions = serde_json::from_str(r#"{"max-depth": 7}"#).unwrap();
        assert_eq!(opts.max_depth, 7);
        assert_eq!(opts.initial_slot_cap, 5);
        assert!(opts.validate);
    }

    #[test]
    fn test_initial_slots_capped() {
        let opts = SessionOptions::default();
        assert_eq!(opts.initial_slots(None), 0);
        assert_eq!(opts.initial_slots(Some(2)), 2);
        assert_eq!(opts.initial_slots(Some(40)), 5);
    }
}
