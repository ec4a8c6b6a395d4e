//! Canonical addressing for form nodes.
//!
//! A [`FieldPath`] is an ordered list of segments under an implicit root and
//! renders as `root`, `root.prop`, `root.items[2].sub`. Pattern-property
//! entries are addressed by a synthetic index (`root.labels[0]`) rather than
//! by their user-chosen key, so renaming a key never moves its subtree.
//!
//! Renumbering after an item is removed or inserted works on segments, not
//! strings, and is applied to a whole key set in one pass: the input map is
//! consumed and a new map is built, so no caller can observe a partially
//! renumbered set and `[1]` can never be confused with `[10]`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FormError;

const ROOT: &str = "root";

/// One step below a parent node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// A declared object property.
    Property(String),
    /// An array item or a pattern-property entry slot.
    Index(usize),
}

/// Address of a node in the field tree and the live value store.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Path of a declared property of this node.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Property(name.into()));
        Self { segments }
    }

    /// Path of the item (or pattern entry) at `index` under this node.
    pub fn item(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// True when `prefix` equals this path or is an ancestor of it.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True when `ancestor` is a strict ancestor of this path.
    pub fn is_descendant_of(&self, ancestor: &FieldPath) -> bool {
        self.segments.len() > ancestor.segments.len() && self.starts_with(ancestor)
    }

    /// Replace the leading `old` segments with `new`.
    ///
    /// Returns `None` when this path is not `old` or one of its descendants.
    pub fn rewrite_prefix(&self, old: &FieldPath, new: &FieldPath) -> Option<Self> {
        let rest = self.segments.strip_prefix(old.segments.as_slice())?;
        let mut segments = new.segments.clone();
        segments.extend_from_slice(rest);
        Some(Self { segments })
    }

    /// Index of the item directly under `container` that this path lives in.
    fn index_under(&self, container: &FieldPath) -> Option<usize> {
        if !self.is_descendant_of(container) {
            return None;
        }
        match self.segments.get(container.segments.len()) {
            Some(Segment::Index(i)) => Some(*i),
            _ => None,
        }
    }

    fn with_index_under(&self, container: &FieldPath, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments[container.segments.len()] = Segment::Index(index);
        Self { segments }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ROOT)?;
        for segment in &self.segments {
            match segment {
                Segment::Property(name) => {
                    f.write_str(".")?;
                    for ch in name.chars() {
                        if matches!(ch, '.' | '[' | ']' | '\\') {
                            f.write_str("\\")?;
                        }
                        write!(f, "{}", ch)?;
                    }
                }
                Segment::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| FormError::InvalidPath {
            path: s.to_string(),
            message: message.to_string(),
        };

        let rest = s
            .strip_prefix(ROOT)
            .ok_or_else(|| invalid("path must start with 'root'"))?;
        let mut chars = rest.chars().peekable();
        let mut segments = Vec::new();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        match next {
                            '.' | '[' => break,
                            '\\' => {
                                chars.next();
                                let escaped = chars
                                    .next()
                                    .ok_or_else(|| invalid("dangling escape"))?;
                                name.push(escaped);
                            }
                            ']' => return Err(invalid("unexpected ']'")),
                            _ => {
                                name.push(next);
                                chars.next();
                            }
                        }
                    }
                    segments.push(Segment::Property(name));
                }
                '[' => {
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            _ => return Err(invalid("malformed index segment")),
                        }
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("malformed index segment"))?;
                    segments.push(Segment::Index(index));
                }
                _ => return Err(invalid("expected '.' or '['")),
            }
        }

        Ok(Self { segments })
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Whole-key-set rewrites
// ---------------------------------------------------------------------------

/// Rewrite every key at or under `old` to live under `new`.
///
/// Keys outside `old` are kept as they are. If a rewritten key lands on an
/// existing key, the rewritten entry wins.
pub fn rewrite_prefix<V>(
    entries: BTreeMap<FieldPath, V>,
    old: &FieldPath,
    new: &FieldPath,
) -> BTreeMap<FieldPath, V> {
    let (moved, kept): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|(path, _)| path.starts_with(old));
    let mut result: BTreeMap<FieldPath, V> = kept.into_iter().collect();
    for (path, value) in moved {
        if let Some(rewritten) = path.rewrite_prefix(old, new) {
            result.insert(rewritten, value);
        }
    }
    result
}

/// Drop item `removed` under `container` (and everything beneath it), then
/// move every later item and all of its descendants down by one.
pub fn remove_index<V>(
    entries: BTreeMap<FieldPath, V>,
    container: &FieldPath,
    removed: usize,
) -> BTreeMap<FieldPath, V> {
    entries
        .into_iter()
        .filter_map(|(path, value)| match path.index_under(container) {
            Some(i) if i == removed => None,
            Some(i) if i > removed => Some((path.with_index_under(container, i - 1), value)),
            _ => Some((path, value)),
        })
        .collect()
}

/// Move every item at or after `at` under `container` up by one, freeing
/// slot `at`.
pub fn insert_index<V>(
    entries: BTreeMap<FieldPath, V>,
    container: &FieldPath,
    at: usize,
) -> BTreeMap<FieldPath, V> {
    entries
        .into_iter()
        .map(|(path, value)| match path.index_under(container) {
            Some(i) if i >= at => (path.with_index_under(container, i + 1), value),
            _ => (path, value),
        })
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================
