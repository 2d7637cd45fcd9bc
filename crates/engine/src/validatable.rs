//! Record adapters.
//!
//! [`Validatable`] is the only view of a record the engine needs; any data
//! shape implements it once. [`JsonValidatable`] covers `serde_json` trees.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::path::InstancePath;

/// Shape of a named child below a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    /// No such child, or it is null.
    Missing,
    /// A single nested node.
    Single,
    /// A collection with this many elements.
    Collection(usize),
}

/// Navigable view of one record.
pub trait Validatable {
    /// Name of the record root, the first segment of every path.
    fn root_name(&self) -> &str;

    /// Shape of child `name` below the node at `path`.
    fn child(&self, path: &InstancePath, name: &str) -> Child;

    /// Whether child `name` is a collection.
    fn is_collection(&self, path: &InstancePath, name: &str) -> bool {
        matches!(self.child(path, name), Child::Collection(_))
    }

    /// Instance paths of every node reachable as child `name`.
    fn children(&self, path: &InstancePath, name: &str) -> Vec<InstancePath> {
        match self.child(path, name) {
            Child::Missing => Vec::new(),
            Child::Single => vec![path.child(name, None)],
            Child::Collection(len) => (0..len).map(|i| path.child(name, Some(i))).collect(),
        }
    }

    /// Value of property `name` of the node at `path`.
    fn property_value(&self, path: &InstancePath, name: &str) -> Option<Value>;

    /// The whole node at `path`.
    fn node_value(&self, path: &InstancePath) -> Option<Value>;

    /// Identifier of the entity the node at `path` belongs to, for records
    /// that bundle several entities.
    fn entity_identifier(&self, _path: &InstancePath) -> Option<String> {
        None
    }
}

/// Maps root aliases to record roots.
pub trait PathResolver: Send + Sync {
    /// Roots the surrounding application understands.
    fn supported_roots(&self) -> BTreeSet<String>;

    /// Alias under which bodies see the record rooted at `root`.
    fn alias_for_path(&self, root: &str) -> Option<String>;

    /// Root named by `alias`.
    fn path_for_alias(&self, alias: &str) -> Option<String>;
}

/// A [`PathResolver`] backed by a fixed root/alias table.
#[derive(Debug, Clone, Default)]
pub struct StaticPathResolver {
    aliases: Vec<(String, String)>,
}

impl StaticPathResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `root` under `alias`.
    pub fn with_root(mut self, root: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.push((root.into(), alias.into()));
        self
    }
}

impl PathResolver for StaticPathResolver {
    fn supported_roots(&self) -> BTreeSet<String> {
        self.aliases.iter().map(|(root, _)| root.clone()).collect()
    }

    fn alias_for_path(&self, root: &str) -> Option<String> {
        self.aliases
            .iter()
            .find(|(r, _)| r == root)
            .map(|(_, alias)| alias.clone())
    }

    fn path_for_alias(&self, alias: &str) -> Option<String> {
        self.aliases
            .iter()
            .find(|(_, a)| a == alias)
            .map(|(root, _)| root.clone())
    }
}

/// A record held as a JSON tree. The tree is the content of the root node.
#[derive(Debug, Clone)]
pub struct JsonValidatable {
    root_name: String,
    data: Value,
    identifier_property: Option<String>,
}

impl JsonValidatable {
    /// Wrap `data` as the record rooted at `root_name`.
    pub fn new(root_name: impl Into<String>, data: Value) -> Self {
        Self {
            root_name: root_name.into(),
            data,
            identifier_property: None,
        }
    }

    /// Report entity identifiers from this property of the nearest node
    /// (the node itself or an ancestor) that has it.
    pub fn with_identifier_property(mut self, property: impl Into<String>) -> Self {
        self.identifier_property = Some(property.into());
        self
    }

    /// The wrapped tree.
    pub fn data(&self) -> &Value {
        &self.data
    }

    fn node(&self, path: &InstancePath) -> Option<&Value> {
        let (root, rest) = path.segments().split_first()?;
        if &*root.name != self.root_name.as_str() {
            return None;
        }
        let mut node = &self.data;
        for segment in rest {
            node = node.get(&*segment.name)?;
            if let Some(index) = segment.index {
                node = node.get(index)?;
            }
        }
        Some(node)
    }
}

impl Validatable for JsonValidatable {
    fn root_name(&self) -> &str {
        &self.root_name
    }

    fn child(&self, path: &InstancePath, name: &str) -> Child {
        match self.node(path).and_then(|node| node.get(name)) {
            None | Some(Value::Null) => Child::Missing,
            Some(Value::Array(items)) => Child::Collection(items.len()),
            Some(_) => Child::Single,
        }
    }

    fn property_value(&self, path: &InstancePath, name: &str) -> Option<Value> {
        self.node(path)?.get(name).cloned()
    }

    fn node_value(&self, path: &InstancePath) -> Option<Value> {
        self.node(path).cloned()
    }

    fn entity_identifier(&self, path: &InstancePath) -> Option<String> {
        let property = self.identifier_property.as_deref()?;
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if let Some(value) = self.node(&p).and_then(|node| node.get(property)) {
                return match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                };
            }
            current = p.parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> JsonValidatable {
        JsonValidatable::new(
            "level1",
            json!({
                "id": "P-1",
                "level2": [
                    {"level3": [{"prop": "1"}, {"prop": "2"}]},
                    {"level3": {"prop": "3"}},
                    {"other": null}
                ]
            }),
        )
        .with_identifier_property("id")
    }

    #[test]
    fn child_shapes() {
        let record = record();
        let root = InstancePath::root("level1");
        assert_eq!(record.child(&root, "level2"), Child::Collection(3));
        assert_eq!(record.child(&root, "nope"), Child::Missing);

        let second = root.child("level2", Some(1));
        assert_eq!(record.child(&second, "level3"), Child::Single);
        let third = root.child("level2", Some(2));
        assert_eq!(record.child(&third, "other"), Child::Missing);
    }

    #[test]
    fn children_carry_indices() {
        let record = record();
        let first = InstancePath::root("level1").child("level2", Some(0));
        let children: Vec<String> = record
            .children(&first, "level3")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            children,
            vec!["level1.level2[0].level3[0]", "level1.level2[0].level3[1]"]
        );
    }

    #[test]
    fn property_lookup_follows_indices() {
        let record = record();
        let path = InstancePath::parse("level1.level2[0].level3[1]").unwrap();
        assert_eq!(record.property_value(&path, "prop"), Some(json!("2")));
        assert_eq!(record.property_value(&path, "missing"), None);
    }

    #[test]
    fn wrong_root_resolves_nothing() {
        let record = record();
        assert_eq!(record.node_value(&InstancePath::root("other")), None);
    }

    #[test]
    fn identifier_comes_from_nearest_ancestor() {
        let record = record();
        let path = InstancePath::parse("level1.level2[0].level3[0]").unwrap();
        assert_eq!(record.entity_identifier(&path).as_deref(), Some("P-1"));
    }

    #[test]
    fn static_resolver_maps_both_ways() {
        let resolver = StaticPathResolver::new().with_root("level1", "record");
        assert_eq!(resolver.alias_for_path("level1").as_deref(), Some("record"));
        assert_eq!(resolver.path_for_alias("record").as_deref(), Some("level1"));
        assert!(resolver.supported_roots().contains("level1"));
    }
}
