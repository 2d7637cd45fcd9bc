//! Rule, condition and validator types.
//!
//! `*Definition` and `Editable*` types are plain serde data used to create
//! and edit items. [`Rule`], [`Condition`] and [`Validator`] are the
//! compiled, immutable forms the registry holds.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use regula_expression::Value;
use serde::{Deserialize, Serialize};

use crate::body::CompiledBody;
use crate::path::EntityPath;

/// How serious a failure is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Must be fixed.
    #[default]
    Error,
    /// Should be reviewed.
    Warning,
    /// Informational only.
    Information,
}

fn default_true() -> bool {
    true
}

/// Editable snapshot of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableRule {
    /// Unique rule id.
    pub id: String,
    /// Owning validator; filled from the bundle when empty.
    #[serde(default)]
    pub validator_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Where the rule is declared.
    pub entity_path: String,
    /// Body source. May be omitted when a native body is provided.
    #[serde(default)]
    pub expression: Option<String>,
    /// Failure message template; `${name}` placeholders are substituted.
    #[serde(default)]
    pub message: String,
    /// Failure severity.
    #[serde(default)]
    pub severity: Severity,
    /// Rules that must not have failed for this one to run.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Guard conditions, in declaration order.
    #[serde(default)]
    pub conditions: IndexSet<String>,
    /// Combine guard conditions with AND (any failed skips) or OR (all
    /// failed skips).
    #[serde(default = "default_true")]
    pub use_and_for_conditions: bool,
    /// Soft-deleted.
    #[serde(default)]
    pub ignored: bool,
    /// Free-form tag, used by set filters.
    #[serde(default)]
    pub tag: Option<String>,
    /// Category id within the validator.
    #[serde(default)]
    pub category: Option<String>,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
}

impl EditableRule {
    /// A rule with the given id, validator, path and body.
    pub fn new(
        id: impl Into<String>,
        validator_id: impl Into<String>,
        entity_path: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            validator_id: validator_id.into(),
            name: None,
            entity_path: entity_path.into(),
            expression: Some(expression.into()),
            message: String::new(),
            severity: Severity::default(),
            dependencies: BTreeSet::new(),
            conditions: IndexSet::new(),
            use_and_for_conditions: true,
            ignored: false,
            tag: None,
            category: None,
            description: None,
        }
    }

    /// Set the message template.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add a dependency.
    pub fn depends_on(mut self, rule_id: impl Into<String>) -> Self {
        self.dependencies.insert(rule_id.into());
        self
    }

    /// Add a guard condition.
    pub fn guarded_by(mut self, condition_id: impl Into<String>) -> Self {
        self.conditions.insert(condition_id.into());
        self
    }

    /// Combine guard conditions with OR.
    pub fn with_or_conditions(mut self) -> Self {
        self.use_and_for_conditions = false;
        self
    }

    /// Set the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Mark as ignored.
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Editable snapshot of a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableCondition {
    /// Unique condition id.
    pub id: String,
    /// Owning validator; filled from the bundle when empty.
    #[serde(default)]
    pub validator_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Where the condition is declared.
    pub entity_path: String,
    /// Body source. May be omitted when a native body is provided.
    #[serde(default)]
    pub expression: Option<String>,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
}

impl EditableCondition {
    /// A condition with the given id, validator, path and body.
    pub fn new(
        id: impl Into<String>,
        validator_id: impl Into<String>,
        entity_path: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            validator_id: validator_id.into(),
            name: None,
            entity_path: entity_path.into(),
            expression: Some(expression.into()),
            description: None,
        }
    }
}

/// A named context expression, evaluated once when published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDefinition {
    /// Name bodies refer to.
    pub key: String,
    /// Expression producing the value.
    pub expression: String,
}

/// A named grouping of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDefinition {
    /// Set id, unique within the validator.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Rules in the set; empty means every rule of the validator.
    #[serde(default)]
    pub include: BTreeSet<String>,
    /// Rules removed from the set.
    #[serde(default)]
    pub exclude: BTreeSet<String>,
    /// Keep only rules with this tag.
    #[serde(default)]
    pub tag: Option<String>,
}

/// A rule category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    /// Category id, unique within the validator.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A validator bundle as loaded by `initialize` or `add_validator`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDefinition {
    /// Unique validator id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Version label.
    #[serde(default)]
    pub version: String,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Rules.
    #[serde(default)]
    pub rules: Vec<EditableRule>,
    /// Conditions.
    #[serde(default)]
    pub conditions: Vec<EditableCondition>,
    /// Categories.
    #[serde(default)]
    pub categories: Vec<CategoryDefinition>,
    /// Context expressions, evaluated in order.
    #[serde(default)]
    pub contexts: Vec<ContextDefinition>,
    /// Rule sets.
    #[serde(default)]
    pub sets: Vec<SetDefinition>,
}

impl ValidatorDefinition {
    /// An empty bundle.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// Add a rule; its validator id is set to this bundle.
    pub fn with_rule(mut self, mut rule: EditableRule) -> Self {
        rule.validator_id.clone_from(&self.id);
        self.rules.push(rule);
        self
    }

    /// Add a condition; its validator id is set to this bundle.
    pub fn with_condition(mut self, mut condition: EditableCondition) -> Self {
        condition.validator_id.clone_from(&self.id);
        self.conditions.push(condition);
        self
    }

    /// Add a context expression.
    pub fn with_context(mut self, key: impl Into<String>, expression: impl Into<String>) -> Self {
        self.contexts.push(ContextDefinition {
            key: key.into(),
            expression: expression.into(),
        });
        self
    }

    /// Add a category.
    pub fn with_category(mut self, id: impl Into<String>) -> Self {
        self.categories.push(CategoryDefinition {
            id: id.into(),
            name: None,
            description: None,
        });
        self
    }

    /// Add a rule set.
    pub fn with_set(mut self, set: SetDefinition) -> Self {
        self.sets.push(set);
        self
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) definition: EditableRule,
    pub(crate) entity_path: EntityPath,
    pub(crate) body: CompiledBody,
    pub(crate) identifiers: BTreeSet<String>,
    pub(crate) inverted_dependencies: BTreeSet<String>,
}

impl Rule {
    /// Rule id.
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Owning validator id.
    pub fn validator_id(&self) -> &str {
        &self.definition.validator_id
    }

    /// Display name.
    pub fn name(&self) -> Option<&str> {
        self.definition.name.as_deref()
    }

    /// Where the rule is declared.
    pub fn entity_path(&self) -> &EntityPath {
        &self.entity_path
    }

    /// Compiled body.
    pub fn body(&self) -> &CompiledBody {
        &self.body
    }

    /// Direct dependencies.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.definition.dependencies
    }

    /// Rules that list this one as a dependency.
    pub fn inverted_dependencies(&self) -> &BTreeSet<String> {
        &self.inverted_dependencies
    }

    /// Guard conditions, in declaration order.
    pub fn conditions(&self) -> &IndexSet<String> {
        &self.definition.conditions
    }

    /// AND (true) or OR (false) guard combination.
    pub fn use_and_for_conditions(&self) -> bool {
        self.definition.use_and_for_conditions
    }

    /// Soft-deleted.
    pub fn is_ignored(&self) -> bool {
        self.definition.ignored
    }

    /// Failure severity.
    pub fn severity(&self) -> Severity {
        self.definition.severity
    }

    /// Failure message template.
    pub fn message(&self) -> &str {
        &self.definition.message
    }

    /// Tag.
    pub fn tag(&self) -> Option<&str> {
        self.definition.tag.as_deref()
    }

    /// Category id.
    pub fn category(&self) -> Option<&str> {
        self.definition.category.as_deref()
    }

    /// Identifiers the body reads.
    pub fn referenced_identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    /// An editable copy of this rule.
    pub fn to_editable(&self) -> EditableRule {
        self.definition.clone()
    }
}

/// A compiled condition.
#[derive(Debug, Clone)]
pub struct Condition {
    pub(crate) definition: EditableCondition,
    pub(crate) entity_path: EntityPath,
    pub(crate) body: CompiledBody,
    pub(crate) identifiers: BTreeSet<String>,
}

impl Condition {
    /// Condition id.
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Owning validator id.
    pub fn validator_id(&self) -> &str {
        &self.definition.validator_id
    }

    /// Where the condition is declared.
    pub fn entity_path(&self) -> &EntityPath {
        &self.entity_path
    }

    /// Compiled body.
    pub fn body(&self) -> &CompiledBody {
        &self.body
    }

    /// Identifiers the body reads.
    pub fn referenced_identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    /// An editable copy of this condition.
    pub fn to_editable(&self) -> EditableCondition {
        self.definition.clone()
    }
}

/// A published context value.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    /// Source expression.
    pub expression: String,
    /// Value it evaluated to.
    pub value: Value,
}

/// A validator bundle as held by the registry.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) description: Option<String>,
    pub(crate) rule_ids: BTreeSet<String>,
    pub(crate) condition_ids: BTreeSet<String>,
    pub(crate) categories: IndexMap<String, CategoryDefinition>,
    pub(crate) contexts: IndexMap<String, ContextEntry>,
    pub(crate) sets: IndexMap<String, SetDefinition>,
}

impl Validator {
    /// Validator id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version label.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Longer description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Ids of the validator's rules.
    pub fn rule_ids(&self) -> &BTreeSet<String> {
        &self.rule_ids
    }

    /// Ids of the validator's conditions.
    pub fn condition_ids(&self) -> &BTreeSet<String> {
        &self.condition_ids
    }

    /// Categories by id.
    pub fn categories(&self) -> &IndexMap<String, CategoryDefinition> {
        &self.categories
    }

    /// Contexts by key, in evaluation order.
    pub fn contexts(&self) -> &IndexMap<String, ContextEntry> {
        &self.contexts
    }

    /// Value of context `key`.
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.contexts.get(key).map(|entry| &entry.value)
    }

    /// Rule sets by id.
    pub fn sets(&self) -> &IndexMap<String, SetDefinition> {
        &self.sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editable_rule_deserializes_with_defaults() {
        let rule: EditableRule = serde_json::from_str(
            r#"{"id": "R1", "entity_path": "level1", "expression": "true"}"#,
        )
        .unwrap();
        assert!(rule.use_and_for_conditions);
        assert!(!rule.ignored);
        assert_eq!(rule.severity, Severity::Error);
        assert!(rule.validator_id.is_empty());
    }

    #[test]
    fn bundle_builder_sets_validator_ids() {
        let bundle = ValidatorDefinition::new("V1")
            .with_rule(EditableRule::new("R1", "", "level1", "true"))
            .with_condition(EditableCondition::new("C1", "", "level1", "true"));
        assert_eq!(bundle.rules[0].validator_id, "V1");
        assert_eq!(bundle.conditions[0].validator_id, "V1");
        assert_eq!(bundle.name, "V1");
    }

    #[test]
    fn condition_order_is_preserved() {
        let rule = EditableRule::new("R1", "V1", "a", "true")
            .guarded_by("C2")
            .guarded_by("C1");
        let order: Vec<_> = rule.conditions.iter().cloned().collect();
        assert_eq!(order, vec!["C2".to_string(), "C1".to_string()]);
    }
}
