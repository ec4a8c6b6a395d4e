//! Human-readable hints for `pattern` constraints.
//!
//! A fixed table covers patterns that show up constantly in real schemas.
//! Anything else gets a generic hint built from the character classes it
//! mentions, or no hint at all.

/// Known patterns and their hints. Matched on the exact pattern text.
const KNOWN_PATTERNS: &[(&str, &str)] = &[
    ("^[a-z0-9-]+$", "Lowercase letters, digits and hyphens"),
    ("^[a-z0-9_]+$", "Lowercase letters, digits and underscores"),
    ("^[a-zA-Z0-9_]+$", "Letters, digits and underscores"),
    ("^[a-zA-Z0-9-]+$", "Letters, digits and hyphens"),
    ("^[a-zA-Z]+$", "Letters only"),
    ("^[a-z]+$", "Lowercase letters only"),
    ("^[A-Z]+$", "Uppercase letters only"),
    ("^[0-9]+$", "Digits only"),
    ("^\\d+$", "Digits only"),
    ("^[A-Z]{2}$", "Two-letter uppercase code, e.g. US"),
    ("^[A-Z]{3}$", "Three-letter uppercase code, e.g. EUR"),
    ("^[a-z]{2}(-[A-Z]{2})?$", "Language tag, e.g. en or en-US"),
    ("^#[0-9a-fA-F]{6}$", "Hex color, e.g. #1a2b3c"),
    ("^#?[0-9a-fA-F]{6}$", "Hex color, e.g. #1a2b3c"),
    ("^[0-9a-fA-F]+$", "Hexadecimal digits"),
    ("^\\d{4}-\\d{2}-\\d{2}$", "Date as YYYY-MM-DD"),
    ("^[0-9]{4}-[0-9]{2}-[0-9]{2}$", "Date as YYYY-MM-DD"),
    ("^\\d{2}:\\d{2}$", "Time as HH:MM"),
    ("^\\d+\\.\\d+\\.\\d+$", "Version as MAJOR.MINOR.PATCH"),
    ("^[0-9]+\\.[0-9]+\\.[0-9]+$", "Version as MAJOR.MINOR.PATCH"),
    (
        "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        "UUID, e.g. 123e4567-e89b-12d3-a456-426614174000",
    ),
    ("^[^@]+@[^@]+\\.[^@]+$", "Email address"),
    ("^\\S+@\\S+\\.\\S+$", "Email address"),
    ("^https?://", "URL starting with http:// or https://"),
    ("^https?://.+", "URL starting with http:// or https://"),
    ("^\\+?[0-9]{7,15}$", "Phone number, digits with optional leading +"),
    ("^\\S+$", "No whitespace"),
    ("^\\S*$", "No whitespace"),
    ("^[^\\s]+$", "No whitespace"),
];

/// Character classes recognised by the generic fallback, in display order.
const CHARACTER_CLASSES: &[(&[&str], &str)] = &[
    (&["a-z"], "lowercase letters"),
    (&["A-Z"], "uppercase letters"),
    (&["0-9", "\\d"], "digits"),
    (&["_", "\\w"], "underscores"),
    (&["\\-", "-]", "[-"], "hyphens"),
    (&["\\."], "dots"),
    (&["\\s", " "], "spaces"),
];

/// A best-effort hint for `pattern`, or `None` when nothing useful can be
/// said.
pub fn pattern_hint(pattern: &str) -> Option<String> {
    if let Some((_, hint)) = KNOWN_PATTERNS.iter().find(|(known, _)| *known == pattern) {
        return Some(hint.to_string());
    }
    generic_hint(pattern)
}

fn generic_hint(pattern: &str) -> Option<String> {
    // `\w` implies letters and digits too.
    let word = pattern.contains("\\w");
    let mut parts: Vec<&str> = CHARACTER_CLASSES
        .iter()
        .filter(|(needles, _)| needles.iter().any(|n| pattern.contains(n)))
        .map(|(_, label)| *label)
        .collect();
    if word {
        for implied in ["lowercase letters", "uppercase letters", "digits"] {
            if !parts.contains(&implied) {
                parts.push(implied);
            }
        }
    }
    if parts.is_empty() {
        return None;
    }
    parts.sort_by_key(|label| {
        CHARACTER_CLASSES
            .iter()
            .position(|(_, l)| l == label)
            .unwrap_or(usize::MAX)
    });
    Some(format!("Allowed characters: {}", join_labels(&parts)))
}

fn join_labels(parts: &[&str]) -> String {
    match parts {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}
