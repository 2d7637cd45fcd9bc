//! Entity paths and instance paths.
//!
//! An entity path (`level1.level2.level3`) names where a rule or condition
//! is declared. An instance path (`level1.level2[1].level3[0]`) names one
//! concrete node of one record.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// A dotted, unindexed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityPath(Arc<str>);

impl EntityPath {
    /// Parse and validate a dotted path.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        if text.is_empty() {
            return Err(EngineError::invalid_path(text, "path is empty"));
        }
        for segment in text.split('.') {
            if !SEGMENT_RE.is_match(segment) {
                return Err(EngineError::invalid_path(
                    text,
                    format!("invalid segment '{segment}'"),
                ));
            }
        }
        Ok(Self(Arc::from(text)))
    }

    /// The path text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment.
    pub fn root(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    /// Segments from root to leaf.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn is_ancestor_or_self_of(&self, other: &EntityPath) -> bool {
        is_dotted_prefix(&self.0, &other.0)
    }

    /// Every prefix of this path, root first, ending with the path itself.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        let text: &str = &self.0;
        text.match_indices('.')
            .map(move |(at, _)| &text[..at])
            .chain(std::iter::once(text))
    }
}

fn is_dotted_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityPath {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityPath> for String {
    fn from(path: EntityPath) -> Self {
        path.0.to_string()
    }
}

/// One segment of an instance path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment {
    /// Property name.
    pub name: Arc<str>,
    /// Element index when the property is a collection.
    pub index: Option<usize>,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{index}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A path to one concrete node, with collection indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstancePath {
    segments: Arc<[PathSegment]>,
}

impl InstancePath {
    /// Path of a record root.
    pub fn root(name: &str) -> Self {
        Self {
            segments: Arc::from(vec![PathSegment {
                name: Arc::from(name),
                index: None,
            }]),
        }
    }

    /// Parse the textual form, e.g. `level1.level2[1].level3[0]`.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let mut segments = Vec::new();
        for part in text.split('.') {
            let (name, index) = match part.split_once('[') {
                Some((name, rest)) => {
                    let index = rest
                        .strip_suffix(']')
                        .and_then(|digits| digits.parse::<usize>().ok())
                        .ok_or_else(|| {
                            EngineError::invalid_path(text, format!("invalid index in '{part}'"))
                        })?;
                    (name, Some(index))
                }
                None => (part, None),
            };
            if !SEGMENT_RE.is_match(name) {
                return Err(EngineError::invalid_path(
                    text,
                    format!("invalid segment '{part}'"),
                ));
            }
            segments.push(PathSegment {
                name: Arc::from(name),
                index,
            });
        }
        Ok(Self {
            segments: Arc::from(segments),
        })
    }

    /// Extend with a child segment.
    pub fn child(&self, name: &str, index: Option<usize>) -> Self {
        let mut segments = self.segments.to_vec();
        segments.push(PathSegment {
            name: Arc::from(name),
            index,
        });
        Self {
            segments: Arc::from(segments),
        }
    }

    /// Segments from root to leaf.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The leaf segment.
    pub fn leaf(&self) -> &PathSegment {
        // Never empty: every constructor pushes at least the root.
        &self.segments[self.segments.len() - 1]
    }

    /// Name of the record root.
    pub fn root_name(&self) -> &str {
        &self.segments[0].name
    }

    /// The path with its indices stripped.
    pub fn entity_path(&self) -> String {
        self.segments
            .iter()
            .map(|segment| &*segment.name)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The parent path, `None` for a root.
    pub fn parent(&self) -> Option<Self> {
        (self.segments.len() > 1).then(|| Self {
            segments: Arc::from(&self.segments[..self.segments.len() - 1]),
        })
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn is_ancestor_or_self_of(&self, other: &InstancePath) -> bool {
        other.segments.starts_with(&self.segments)
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("level1")]
    #[case("level1.level2.level3")]
    #[case("_a.b_2")]
    fn entity_path_accepts(#[case] text: &str) {
        assert_eq!(EntityPath::parse(text).unwrap().as_str(), text);
    }

    #[rstest]
    #[case("")]
    #[case("a..b")]
    #[case("a.")]
    #[case("2a")]
    #[case("a.b[0]")]
    #[case("a b")]
    fn entity_path_rejects(#[case] text: &str) {
        assert!(matches!(
            EntityPath::parse(text),
            Err(EngineError::InvalidPath { .. })
        ));
    }

    #[test]
    fn ancestry_respects_segment_boundaries() {
        let root = EntityPath::parse("level1").unwrap();
        let child = EntityPath::parse("level1.level2").unwrap();
        let lookalike = EntityPath::parse("level10").unwrap();
        assert!(root.is_ancestor_or_self_of(&child));
        assert!(root.is_ancestor_or_self_of(&root));
        assert!(!child.is_ancestor_or_self_of(&root));
        assert!(!root.is_ancestor_or_self_of(&lookalike));
    }

    #[test]
    fn prefixes_are_root_first() {
        let path = EntityPath::parse("a.b.c").unwrap();
        assert_eq!(path.prefixes().collect::<Vec<_>>(), vec!["a", "a.b", "a.b.c"]);
        assert_eq!(path.root(), "a");
        assert_eq!(path.depth(), 3);
    }

    #[test]
    fn instance_path_round_trips_text() {
        let path = InstancePath::parse("level1.level2[1].level3[0]").unwrap();
        assert_eq!(path.to_string(), "level1.level2[1].level3[0]");
        assert_eq!(path.entity_path(), "level1.level2.level3");
        assert_eq!(path.leaf().index, Some(0));
        assert_eq!(path.parent().unwrap().to_string(), "level1.level2[1]");
    }

    #[test]
    fn instance_ancestry_distinguishes_siblings() {
        let root = InstancePath::root("ROOT");
        let first = root.child("COLLECTION", Some(0));
        let second = root.child("COLLECTION", Some(1));
        assert!(root.is_ancestor_or_self_of(&first));
        assert!(!first.is_ancestor_or_self_of(&second));
        assert!(!second.is_ancestor_or_self_of(&root));
    }

    #[test]
    fn entity_path_deserializes_through_validation() {
        let ok: EntityPath = serde_json::from_str("\"a.b\"").unwrap();
        assert_eq!(ok.as_str(), "a.b");
        assert!(serde_json::from_str::<EntityPath>("\"a..b\"").is_err());
    }
}
