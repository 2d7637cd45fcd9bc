//! Entity path expansion.
//!
//! Walks a record depth-first and turns every declared entity path into the
//! instance paths that exist in that record. Only subtrees that lead to a
//! declared path are visited.

use std::collections::{BTreeSet, HashMap};

use crate::path::{EntityPath, InstancePath};
use crate::validatable::Validatable;

/// Declared entity paths, indexed for prefix walks.
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    declared: BTreeSet<String>,
    roots: BTreeSet<String>,
    children: HashMap<String, BTreeSet<String>>,
}

impl PathIndex {
    /// Index the given declared paths.
    pub fn new<'a>(paths: impl IntoIterator<Item = &'a EntityPath>) -> Self {
        let mut index = Self::default();
        for path in paths {
            index.insert(path);
        }
        index
    }

    fn insert(&mut self, path: &EntityPath) {
        if !self.declared.insert(path.as_str().to_string()) {
            return;
        }
        self.roots.insert(path.root().to_string());
        let mut parent: Option<&str> = None;
        for prefix in path.prefixes() {
            if let Some(parent) = parent {
                let name = &prefix[parent.len() + 1..];
                self.children
                    .entry(parent.to_string())
                    .or_default()
                    .insert(name.to_string());
            }
            parent = Some(prefix);
        }
    }

    /// Whether rules or conditions are declared at `path`.
    pub fn is_declared(&self, path: &str) -> bool {
        self.declared.contains(path)
    }

    /// Whether any declared path starts at `root`.
    pub fn supports_root(&self, root: &str) -> bool {
        self.roots.contains(root)
    }

    /// Roots of all declared paths.
    pub fn roots(&self) -> &BTreeSet<String> {
        &self.roots
    }

    /// Declared paths, sorted.
    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    fn child_names(&self, entity_path: &str) -> impl Iterator<Item = &str> {
        self.children
            .get(entity_path)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }
}

/// One reachable node at a declared entity path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedNode {
    /// The node's instance path.
    pub path: InstancePath,
    /// The entity path it instantiates.
    pub entity_path: String,
    /// Instance paths from the root down to and including `path`.
    pub chain: Vec<InstancePath>,
}

/// Expand every declared path reachable in `record`, in pre-order.
pub fn expand(record: &dyn Validatable, index: &PathIndex) -> Vec<ExpandedNode> {
    let root_name = record.root_name();
    let mut out = Vec::new();
    if !index.supports_root(root_name) {
        return out;
    }
    let mut chain = Vec::new();
    walk(
        record,
        index,
        InstancePath::root(root_name),
        root_name.to_string(),
        &mut chain,
        &mut out,
    );
    out
}

fn walk(
    record: &dyn Validatable,
    index: &PathIndex,
    path: InstancePath,
    entity_path: String,
    chain: &mut Vec<InstancePath>,
    out: &mut Vec<ExpandedNode>,
) {
    chain.push(path.clone());
    if index.is_declared(&entity_path) {
        out.push(ExpandedNode {
            path: path.clone(),
            entity_path: entity_path.clone(),
            chain: chain.clone(),
        });
    }
    for name in index.child_names(&entity_path) {
        let child_entity = format!("{entity_path}.{name}");
        for child in record.children(&path, name) {
            walk(record, index, child, child_entity.clone(), chain, out);
        }
    }
    chain.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validatable::JsonValidatable;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn index(paths: &[&str]) -> PathIndex {
        let parsed: Vec<EntityPath> = paths.iter().map(|p| EntityPath::parse(p).unwrap()).collect();
        PathIndex::new(&parsed)
    }

    fn paths(nodes: &[ExpandedNode]) -> Vec<String> {
        nodes.iter().map(|n| n.path.to_string()).collect()
    }

    #[test]
    fn expands_nested_collections_in_pre_order() {
        let record = JsonValidatable::new(
            "level1",
            json!({"level2": [
                {"level3": [{"prop": "a"}, {"prop": "b"}]},
                {"level3": [{"prop": "c"}]}
            ]}),
        );
        let nodes = expand(&record, &index(&["level1", "level1.level2.level3"]));
        assert_eq!(
            paths(&nodes),
            vec![
                "level1",
                "level1.level2[0].level3[0]",
                "level1.level2[0].level3[1]",
                "level1.level2[1].level3[0]",
            ]
        );
    }

    #[test]
    fn chain_includes_undeclared_ancestors_and_self() {
        let record = JsonValidatable::new("level1", json!({"level2": [{"level3": {"prop": 1}}]}));
        let nodes = expand(&record, &index(&["level1.level2.level3"]));
        assert_eq!(nodes.len(), 1);
        let chain: Vec<String> = nodes[0].chain.iter().map(ToString::to_string).collect();
        assert_eq!(
            chain,
            vec!["level1", "level1.level2[0]", "level1.level2[0].level3"]
        );
        assert_eq!(nodes[0].entity_path, "level1.level2.level3");
    }

    #[test]
    fn missing_nodes_are_skipped() {
        let record = JsonValidatable::new("level1", json!({"level2": []}));
        let nodes = expand(&record, &index(&["level1.level2.level3", "level1.absent"]));
        assert!(nodes.is_empty());
    }

    #[test]
    fn unsupported_root_expands_to_nothing() {
        let record = JsonValidatable::new("other", json!({"level2": [{}]}));
        assert!(expand(&record, &index(&["level1.level2"])).is_empty());
    }

    #[test]
    fn undeclared_subtrees_are_not_visited() {
        struct Counting<'a> {
            inner: JsonValidatable,
            asked: &'a std::cell::RefCell<Vec<String>>,
        }
        impl Validatable for Counting<'_> {
            fn root_name(&self) -> &str {
                self.inner.root_name()
            }
            fn child(&self, path: &InstancePath, name: &str) -> crate::validatable::Child {
                self.asked.borrow_mut().push(name.to_string());
                self.inner.child(path, name)
            }
            fn property_value(&self, path: &InstancePath, name: &str) -> Option<serde_json::Value> {
                self.inner.property_value(path, name)
            }
            fn node_value(&self, path: &InstancePath) -> Option<serde_json::Value> {
                self.inner.node_value(path)
            }
        }

        let asked = std::cell::RefCell::new(Vec::new());
        let record = Counting {
            inner: JsonValidatable::new("r", json!({"a": [{}, {}], "b": [{"deep": {}}]})),
            asked: &asked,
        };
        expand(&record, &index(&["r.a"]));
        assert_eq!(*asked.borrow(), vec!["a".to_string()]);
    }
}
