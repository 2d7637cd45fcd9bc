//! The rule and condition registry.
//!
//! [`RegistryState`] is a value: every mutation runs on a clone, and
//! [`RegistryState::rebuild`] re-checks every invariant over the whole
//! would-be registry before the clone is published. A failed mutation
//! therefore leaves the published registry untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;
use regula_expression::{EvaluationContext, ExpressionEngine, Value};
use serde_json::json;
use tracing::debug;

use crate::body::{BodyCompiler, BodyOwner};
use crate::error::{EngineError, ItemKind};
use crate::expander::PathIndex;
use crate::graph::DependencyGraph;
use crate::model::{
    Condition, ContextDefinition, ContextEntry, EditableCondition, EditableRule, Rule,
    SetDefinition, Validator, ValidatorDefinition,
};
use crate::path::EntityPath;
use crate::stats::{RuleCompilation, ValidatorStats};

/// A validator bundle compiled but not yet installed.
#[derive(Debug)]
pub(crate) struct CompiledBundle {
    validator: Validator,
    rules: Vec<Rule>,
    conditions: Vec<Condition>,
    pub stats: ValidatorStats,
}

pub(crate) fn compile_rule(
    editable: &EditableRule,
    compiler: &BodyCompiler,
) -> Result<(Rule, RuleCompilation), EngineError> {
    let entity_path = EntityPath::parse(&editable.entity_path)?;
    let outcome = compiler.compile(BodyOwner::Rule(&editable.id), editable.expression.as_deref())?;
    let compilation = RuleCompilation {
        kind: outcome.body.kind(),
        skip_reason: outcome.skip_reason,
    };
    let rule = Rule {
        definition: editable.clone(),
        entity_path,
        body: outcome.body,
        identifiers: outcome.identifiers,
        inverted_dependencies: BTreeSet::new(),
    };
    Ok((rule, compilation))
}

pub(crate) fn compile_condition(
    editable: &EditableCondition,
    compiler: &BodyCompiler,
) -> Result<Condition, EngineError> {
    let entity_path = EntityPath::parse(&editable.entity_path)?;
    let outcome =
        compiler.compile(BodyOwner::Condition(&editable.id), editable.expression.as_deref())?;
    Ok(Condition {
        definition: editable.clone(),
        entity_path,
        body: outcome.body,
        identifiers: outcome.identifiers,
    })
}

/// Evaluate context expressions in order. Each expression sees the values
/// of the ones before it.
pub(crate) fn evaluate_contexts<'a>(
    definitions: impl IntoIterator<Item = &'a ContextDefinition>,
    expressions: &ExpressionEngine,
) -> Result<IndexMap<String, ContextEntry>, EngineError> {
    let mut entries: IndexMap<String, ContextEntry> = IndexMap::new();
    for definition in definitions {
        if entries.contains_key(&definition.key) {
            return Err(EngineError::duplicate(ItemKind::Context, &definition.key));
        }
        let owner = || format!("context '{}'", definition.key);
        let expr = expressions
            .compile(&definition.expression)
            .map_err(|error| EngineError::invalid_expression(owner(), error))?;
        let value = {
            let resolver = |name: &str| entries.get(name).map(|entry| entry.value.clone());
            let context = EvaluationContext::with_resolver(&resolver);
            expressions
                .evaluate_compiled(&expr, &context)
                .map_err(|error| EngineError::invalid_expression(owner(), error))?
        };
        entries.insert(
            definition.key.clone(),
            ContextEntry {
                expression: definition.expression.clone(),
                value,
            },
        );
    }
    Ok(entries)
}

fn context_definitions(validator: &Validator) -> Vec<ContextDefinition> {
    validator
        .contexts
        .iter()
        .map(|(key, entry)| ContextDefinition {
            key: key.clone(),
            expression: entry.expression.clone(),
        })
        .collect()
}

/// Compile a whole bundle. With `parallel`, bodies compile on the current
/// rayon pool.
pub(crate) fn compile_bundle(
    definition: &ValidatorDefinition,
    compiler: &BodyCompiler,
    parallel: bool,
) -> Result<CompiledBundle, EngineError> {
    let mut seen = BTreeSet::new();
    for rule in &definition.rules {
        if !seen.insert(rule.id.as_str()) {
            return Err(EngineError::duplicate(ItemKind::Rule, &rule.id));
        }
    }
    seen.clear();
    for condition in &definition.conditions {
        if !seen.insert(condition.id.as_str()) {
            return Err(EngineError::duplicate(ItemKind::Condition, &condition.id));
        }
    }

    let rule_job = |rule: &EditableRule| {
        let mut rule = rule.clone();
        rule.validator_id.clone_from(&definition.id);
        compile_rule(&rule, compiler)
    };
    let condition_job = |condition: &EditableCondition| {
        let mut condition = condition.clone();
        condition.validator_id.clone_from(&definition.id);
        compile_condition(&condition, compiler)
    };

    let (rules, conditions): (Vec<_>, Vec<_>) = if parallel {
        (
            definition.rules.par_iter().map(rule_job).collect::<Result<_, _>>()?,
            definition
                .conditions
                .par_iter()
                .map(condition_job)
                .collect::<Result<_, _>>()?,
        )
    } else {
        (
            definition.rules.iter().map(rule_job).collect::<Result<_, _>>()?,
            definition
                .conditions
                .iter()
                .map(condition_job)
                .collect::<Result<_, _>>()?,
        )
    };

    let mut categories = IndexMap::new();
    for category in &definition.categories {
        if categories.insert(category.id.clone(), category.clone()).is_some() {
            return Err(EngineError::duplicate(ItemKind::Category, &category.id));
        }
    }
    let mut sets = IndexMap::new();
    for set in &definition.sets {
        if sets.insert(set.id.clone(), set.clone()).is_some() {
            return Err(EngineError::duplicate(ItemKind::Set, &set.id));
        }
    }

    let contexts = evaluate_contexts(&definition.contexts, compiler.expressions())?;

    let mut stats = ValidatorStats {
        conditions: conditions.len(),
        ..ValidatorStats::default()
    };
    for (rule, compilation) in &rules {
        stats.record_rule(rule.id(), *compilation);
    }

    let validator = Validator {
        id: definition.id.clone(),
        name: definition.name.clone(),
        version: definition.version.clone(),
        description: definition.description.clone(),
        rule_ids: rules.iter().map(|(rule, _)| rule.id().to_string()).collect(),
        condition_ids: conditions.iter().map(|c| c.id().to_string()).collect(),
        categories,
        contexts,
        sets,
    };
    for set in validator.sets.values() {
        if let Some(missing) = set
            .include
            .iter()
            .chain(&set.exclude)
            .find(|id| !validator.rule_ids.contains(id.as_str()))
        {
            return Err(EngineError::unknown(ItemKind::Rule, missing));
        }
    }

    Ok(CompiledBundle {
        validator,
        rules: rules.into_iter().map(|(rule, _)| rule).collect(),
        conditions,
        stats,
    })
}

/// Lookup tables recomputed by every rebuild.
#[derive(Debug, Default)]
struct Derived {
    paths: PathIndex,
    rules_by_path: HashMap<String, Vec<Arc<Rule>>>,
    conditions_by_path: HashMap<String, Vec<Arc<Condition>>>,
    closure: BTreeMap<String, BTreeSet<String>>,
}

/// Every validator, rule and condition, plus derived lookup tables.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegistryState {
    validators: BTreeMap<String, Arc<Validator>>,
    rules: BTreeMap<String, Arc<Rule>>,
    conditions: BTreeMap<String, Arc<Condition>>,
    derived: Arc<Derived>,
}

impl RegistryState {
    // ----- construction ------------------------------------------------

    /// Add a compiled bundle without checking cross-item invariants; call
    /// [`Self::rebuild`] afterwards.
    pub fn install(&mut self, bundle: CompiledBundle) -> Result<(), EngineError> {
        let CompiledBundle {
            validator,
            rules,
            conditions,
            ..
        } = bundle;
        if self.validators.contains_key(&validator.id) {
            return Err(EngineError::duplicate(ItemKind::Validator, &validator.id));
        }
        for rule in rules {
            if self.rules.contains_key(rule.id()) {
                return Err(EngineError::duplicate(ItemKind::Rule, rule.id()));
            }
            self.rules.insert(rule.id().to_string(), Arc::new(rule));
        }
        for condition in conditions {
            if self.conditions.contains_key(condition.id()) {
                return Err(EngineError::duplicate(ItemKind::Condition, condition.id()));
            }
            self.conditions
                .insert(condition.id().to_string(), Arc::new(condition));
        }
        self.validators
            .insert(validator.id.clone(), Arc::new(validator));
        Ok(())
    }

    /// Check every invariant and recompute the derived tables.
    pub fn rebuild(&mut self) -> Result<(), EngineError> {
        for rule in self.rules.values() {
            self.check_rule(rule)?;
        }
        for condition in self.conditions.values() {
            if !self.validators.contains_key(condition.validator_id()) {
                return Err(EngineError::unknown(
                    ItemKind::Validator,
                    condition.validator_id(),
                ));
            }
        }

        // ignored rules keep their edges, so a cycle through them is still one
        DependencyGraph::from_known_rules(
            self.rules
                .values()
                .map(|rule| (rule.id(), rule.dependencies())),
        )
        .ensure_acyclic()?;

        let graph = DependencyGraph::from_rules(
            self.rules
                .values()
                .filter(|rule| !rule.is_ignored())
                .map(|rule| (rule.id(), rule.dependencies())),
        )?;
        let ranks = graph.ranks()?;

        for rule in self.rules.values_mut() {
            let dependents = graph.dependents(rule.id());
            if rule.inverted_dependencies != dependents {
                Arc::make_mut(rule).inverted_dependencies = dependents;
            }
        }

        let paths = PathIndex::new(
            self.rules
                .values()
                .map(|rule| &rule.entity_path)
                .chain(self.conditions.values().map(|c| &c.entity_path)),
        );

        let mut rules_by_path: HashMap<String, Vec<Arc<Rule>>> = HashMap::new();
        for rule in self.rules.values() {
            rules_by_path
                .entry(rule.entity_path.as_str().to_string())
                .or_default()
                .push(Arc::clone(rule));
        }
        for rules in rules_by_path.values_mut() {
            rules.sort_by_key(|rule| ranks.get(rule.id()).copied().unwrap_or(usize::MAX));
        }

        let mut conditions_by_path: HashMap<String, Vec<Arc<Condition>>> = HashMap::new();
        for condition in self.conditions.values() {
            conditions_by_path
                .entry(condition.entity_path.as_str().to_string())
                .or_default()
                .push(Arc::clone(condition));
        }

        debug!(
            rules = self.rules.len(),
            active = graph.len(),
            conditions = self.conditions.len(),
            "registry rebuilt"
        );

        self.derived = Arc::new(Derived {
            paths,
            rules_by_path,
            conditions_by_path,
            closure: graph.closure(),
        });
        Ok(())
    }

    fn check_rule(&self, rule: &Rule) -> Result<(), EngineError> {
        let validator = self
            .validators
            .get(rule.validator_id())
            .ok_or_else(|| EngineError::unknown(ItemKind::Validator, rule.validator_id()))?;

        if let Some(category) = rule.category() {
            if !validator.categories.contains_key(category) {
                return Err(EngineError::unknown(ItemKind::Category, category));
            }
        }

        for condition_id in rule.conditions() {
            let condition = self
                .conditions
                .get(condition_id)
                .filter(|c| c.validator_id() == rule.validator_id())
                .ok_or_else(|| EngineError::unknown(ItemKind::Condition, condition_id))?;
            if !condition.entity_path.is_ancestor_or_self_of(&rule.entity_path) {
                return Err(EngineError::PathAncestryViolation {
                    id: rule.id().to_string(),
                    path: rule.entity_path.to_string(),
                    condition: condition_id.clone(),
                    condition_path: condition.entity_path.to_string(),
                });
            }
        }

        if !rule.is_ignored() {
            for dependency in rule.dependencies() {
                match self.rules.get(dependency) {
                    Some(dep) if !dep.is_ignored() => {}
                    _ => return Err(EngineError::unknown(ItemKind::Dependency, dependency)),
                }
            }
        }
        Ok(())
    }

    fn validator_mut(&mut self, id: &str) -> Result<&mut Validator, EngineError> {
        self.validators
            .get_mut(id)
            .map(Arc::make_mut)
            .ok_or_else(|| EngineError::unknown(ItemKind::Validator, id))
    }

    fn check_dependencies_exist(&self, rule: &EditableRule) -> Result<(), EngineError> {
        match rule
            .dependencies
            .iter()
            .find(|dep| !self.rules.contains_key(dep.as_str()))
        {
            Some(missing) => Err(EngineError::unknown(ItemKind::Dependency, missing)),
            None => Ok(()),
        }
    }

    /// Active rules other than `id` that list it as a dependency.
    fn active_dependents(&self, id: &str) -> Vec<String> {
        self.rules
            .values()
            .filter(|rule| !rule.is_ignored() && rule.id() != id && rule.dependencies().contains(id))
            .map(|rule| rule.id().to_string())
            .collect()
    }

    fn ensure_no_active_dependents(&self, id: &str) -> Result<(), EngineError> {
        let dependents = self.active_dependents(id);
        if dependents.is_empty() {
            Ok(())
        } else {
            Err(EngineError::DependentsExist {
                kind: ItemKind::Rule,
                id: id.to_string(),
                dependents,
            })
        }
    }

    // ----- rules -------------------------------------------------------

    pub fn add_rule(
        &mut self,
        editable: EditableRule,
        compiler: &BodyCompiler,
    ) -> Result<Arc<Rule>, EngineError> {
        if self.rules.contains_key(&editable.id) {
            return Err(EngineError::duplicate(ItemKind::Rule, &editable.id));
        }
        if !self.validators.contains_key(&editable.validator_id) {
            return Err(EngineError::unknown(
                ItemKind::Validator,
                &editable.validator_id,
            ));
        }
        self.check_dependencies_exist(&editable)?;
        let (rule, _) = compile_rule(&editable, compiler)?;
        self.validator_mut(&editable.validator_id)?
            .rule_ids
            .insert(editable.id.clone());
        self.rules.insert(editable.id.clone(), Arc::new(rule));
        self.rebuild()?;
        self.rules
            .get(&editable.id)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Rule, &editable.id))
    }

    pub fn update_rule(
        &mut self,
        mut editable: EditableRule,
        compiler: &BodyCompiler,
    ) -> Result<Arc<Rule>, EngineError> {
        let existing = self
            .rules
            .get(&editable.id)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Rule, &editable.id))?;
        if editable.validator_id.is_empty() {
            editable.validator_id = existing.validator_id().to_string();
        }
        if !self.validators.contains_key(&editable.validator_id) {
            return Err(EngineError::unknown(
                ItemKind::Validator,
                &editable.validator_id,
            ));
        }
        if editable.ignored && !existing.is_ignored() {
            self.ensure_no_active_dependents(&editable.id)?;
        }
        self.check_dependencies_exist(&editable)?;

        let (rule, _) = compile_rule(&editable, compiler)?;
        if existing.validator_id() != editable.validator_id {
            self.validator_mut(existing.validator_id())?
                .rule_ids
                .remove(&editable.id);
            self.validator_mut(&editable.validator_id)?
                .rule_ids
                .insert(editable.id.clone());
        }
        self.rules.insert(editable.id.clone(), Arc::new(rule));
        self.rebuild()?;
        self.rules
            .get(&editable.id)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Rule, &editable.id))
    }

    pub fn delete_rule(&mut self, id: &str) -> Result<Arc<Rule>, EngineError> {
        let existing = self
            .rules
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Rule, id))?;
        self.ensure_no_active_dependents(id)?;
        self.rules.remove(id);
        self.validator_mut(existing.validator_id())?
            .rule_ids
            .remove(id);
        self.rebuild()?;
        Ok(existing)
    }

    /// Flip the ignore flag of many rules at once.
    pub fn mass_update_ignore_flags(
        &mut self,
        to_ignore: &[String],
        to_unignore: &[String],
    ) -> Result<(), EngineError> {
        for (ids, ignored) in [(to_ignore, true), (to_unignore, false)] {
            for id in ids {
                let rule = self
                    .rules
                    .get_mut(id)
                    .ok_or_else(|| EngineError::unknown(ItemKind::Rule, id))?;
                if rule.is_ignored() != ignored {
                    Arc::make_mut(rule).definition.ignored = ignored;
                }
            }
        }
        for id in to_ignore {
            self.ensure_no_active_dependents(id)?;
        }
        self.rebuild()
    }

    /// Compile a rule that is run once without being registered. Returns
    /// the rule and every rule it depends on, directly or transitively.
    pub fn prepare_forced(
        &self,
        mut editable: EditableRule,
        compiler: &BodyCompiler,
    ) -> Result<(Arc<Rule>, BTreeSet<String>), EngineError> {
        if editable.validator_id.is_empty() {
            if let Some(existing) = self.rules.get(&editable.id) {
                editable.validator_id = existing.validator_id().to_string();
            }
        }
        editable.ignored = false;
        let (rule, _) = compile_rule(&editable, compiler)?;
        self.check_rule(&rule)?;

        let mut closure = rule.dependencies().clone();
        for dependency in rule.dependencies() {
            if let Some(transitive) = self.derived.closure.get(dependency) {
                closure.extend(transitive.iter().cloned());
            }
        }
        if closure.contains(rule.id()) {
            return Err(EngineError::CyclicDependency {
                chain: vec![rule.id().to_string(), rule.id().to_string()],
            });
        }
        Ok((Arc::new(rule), closure))
    }

    // ----- conditions --------------------------------------------------

    pub fn add_condition(
        &mut self,
        editable: EditableCondition,
        compiler: &BodyCompiler,
    ) -> Result<Arc<Condition>, EngineError> {
        if self.conditions.contains_key(&editable.id) {
            return Err(EngineError::duplicate(ItemKind::Condition, &editable.id));
        }
        let condition = Arc::new(compile_condition(&editable, compiler)?);
        self.validator_mut(&editable.validator_id)?
            .condition_ids
            .insert(editable.id.clone());
        self.conditions
            .insert(editable.id.clone(), Arc::clone(&condition));
        self.rebuild()?;
        Ok(condition)
    }

    pub fn update_condition(
        &mut self,
        mut editable: EditableCondition,
        compiler: &BodyCompiler,
    ) -> Result<Arc<Condition>, EngineError> {
        let existing = self
            .conditions
            .get(&editable.id)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Condition, &editable.id))?;
        if editable.validator_id.is_empty() {
            editable.validator_id = existing.validator_id().to_string();
        }
        let condition = Arc::new(compile_condition(&editable, compiler)?);
        if existing.validator_id() != editable.validator_id {
            self.validator_mut(&editable.validator_id)?
                .condition_ids
                .insert(editable.id.clone());
            self.validator_mut(existing.validator_id())?
                .condition_ids
                .remove(&editable.id);
        }
        self.conditions
            .insert(editable.id.clone(), Arc::clone(&condition));
        self.rebuild()?;
        Ok(condition)
    }

    pub fn delete_condition(&mut self, id: &str) -> Result<Arc<Condition>, EngineError> {
        let existing = self
            .conditions
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Condition, id))?;
        let dependents: Vec<String> = self
            .rules
            .values()
            .filter(|rule| rule.conditions().contains(id))
            .map(|rule| rule.id().to_string())
            .collect();
        if !dependents.is_empty() {
            return Err(EngineError::DependentsExist {
                kind: ItemKind::Condition,
                id: id.to_string(),
                dependents,
            });
        }
        self.conditions.remove(id);
        self.validator_mut(existing.validator_id())?
            .condition_ids
            .remove(id);
        self.rebuild()?;
        Ok(existing)
    }

    // ----- validators --------------------------------------------------

    pub fn add_validator(
        &mut self,
        definition: &ValidatorDefinition,
        compiler: &BodyCompiler,
    ) -> Result<ValidatorStats, EngineError> {
        if self.validators.contains_key(&definition.id) {
            return Err(EngineError::duplicate(ItemKind::Validator, &definition.id));
        }
        let bundle = compile_bundle(definition, compiler, false)?;
        let stats = bundle.stats.clone();
        self.install(bundle)?;
        self.rebuild()?;
        Ok(stats)
    }

    pub fn delete_validator(&mut self, id: &str) -> Result<Arc<Validator>, EngineError> {
        let validator = self
            .validators
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Validator, id))?;
        let dependents: Vec<String> = self
            .rules
            .values()
            .filter(|rule| rule.validator_id() != id && !rule.is_ignored())
            .filter(|rule| {
                rule.dependencies()
                    .iter()
                    .any(|dep| validator.rule_ids.contains(dep))
            })
            .map(|rule| rule.id().to_string())
            .collect();
        if !dependents.is_empty() {
            return Err(EngineError::DependentsExist {
                kind: ItemKind::Validator,
                id: id.to_string(),
                dependents,
            });
        }
        self.rules.retain(|_, rule| rule.validator_id() != id);
        self.conditions
            .retain(|_, condition| condition.validator_id() != id);
        self.validators.remove(id);
        self.rebuild()?;
        Ok(validator)
    }

    // ----- contexts ----------------------------------------------------

    pub fn add_context(
        &mut self,
        validator_id: &str,
        definition: ContextDefinition,
        expressions: &ExpressionEngine,
    ) -> Result<Value, EngineError> {
        let validator = self.validator_mut(validator_id)?;
        if validator.contexts.contains_key(&definition.key) {
            return Err(EngineError::duplicate(ItemKind::Context, &definition.key));
        }
        let mut definitions = context_definitions(validator);
        let key = definition.key.clone();
        definitions.push(definition);
        validator.contexts = evaluate_contexts(&definitions, expressions)?;
        validator
            .context_value(&key)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Context, key))
    }

    pub fn update_context(
        &mut self,
        validator_id: &str,
        definition: ContextDefinition,
        expressions: &ExpressionEngine,
    ) -> Result<Value, EngineError> {
        let validator = self.validator_mut(validator_id)?;
        let mut definitions = context_definitions(validator);
        let slot = definitions
            .iter_mut()
            .find(|existing| existing.key == definition.key)
            .ok_or_else(|| EngineError::unknown(ItemKind::Context, &definition.key))?;
        slot.expression.clone_from(&definition.expression);
        validator.contexts = evaluate_contexts(&definitions, expressions)?;
        validator
            .context_value(&definition.key)
            .cloned()
            .ok_or_else(|| EngineError::unknown(ItemKind::Context, &definition.key))
    }

    pub fn delete_context(
        &mut self,
        validator_id: &str,
        key: &str,
        expressions: &ExpressionEngine,
    ) -> Result<(), EngineError> {
        let validator = self
            .validators
            .get(validator_id)
            .ok_or_else(|| EngineError::unknown(ItemKind::Validator, validator_id))?;
        if !validator.contexts.contains_key(key) {
            return Err(EngineError::unknown(ItemKind::Context, key));
        }

        let mut dependents: Vec<String> = self
            .rules
            .values()
            .filter(|rule| rule.validator_id() == validator_id)
            .filter(|rule| rule.identifiers.contains(key))
            .map(|rule| rule.id().to_string())
            .chain(
                self.conditions
                    .values()
                    .filter(|c| c.validator_id() == validator_id && c.identifiers.contains(key))
                    .map(|c| c.id().to_string()),
            )
            .collect();
        for (other, entry) in validator.contexts.iter().filter(|(k, _)| k.as_str() != key) {
            let reads_key = expressions
                .compile(&entry.expression)
                .is_ok_and(|expr| expr.referenced_identifiers().contains(key));
            if reads_key {
                dependents.push(other.clone());
            }
        }
        if !dependents.is_empty() {
            return Err(EngineError::DependentsExist {
                kind: ItemKind::Context,
                id: key.to_string(),
                dependents,
            });
        }

        let validator = self.validator_mut(validator_id)?;
        validator.contexts.shift_remove(key);
        let definitions = context_definitions(validator);
        validator.contexts = evaluate_contexts(&definitions, expressions)?;
        Ok(())
    }

    // ----- sets --------------------------------------------------------

    pub fn add_set(&mut self, validator_id: &str, set: SetDefinition) -> Result<(), EngineError> {
        let validator = self.validator_mut(validator_id)?;
        if validator.sets.contains_key(&set.id) {
            return Err(EngineError::duplicate(ItemKind::Set, &set.id));
        }
        if let Some(missing) = set
            .include
            .iter()
            .chain(&set.exclude)
            .find(|id| !validator.rule_ids.contains(id.as_str()))
        {
            return Err(EngineError::unknown(ItemKind::Rule, missing));
        }
        validator.sets.insert(set.id.clone(), set);
        Ok(())
    }

    pub fn delete_set(&mut self, validator_id: &str, set_id: &str) -> Result<(), EngineError> {
        let validator = self.validator_mut(validator_id)?;
        validator
            .sets
            .shift_remove(set_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::unknown(ItemKind::Set, set_id))
    }

    /// Rule ids a set resolves to.
    pub fn rules_in_set(
        &self,
        validator_id: &str,
        set_id: &str,
    ) -> Result<BTreeSet<String>, EngineError> {
        let validator = self
            .validators
            .get(validator_id)
            .ok_or_else(|| EngineError::unknown(ItemKind::Validator, validator_id))?;
        let set = validator
            .sets
            .get(set_id)
            .ok_or_else(|| EngineError::unknown(ItemKind::Set, set_id))?;
        let base = if set.include.is_empty() {
            &validator.rule_ids
        } else {
            &set.include
        };
        Ok(base
            .iter()
            .filter(|id| !set.exclude.contains(*id))
            .filter(|id| match &set.tag {
                Some(tag) => self
                    .rules
                    .get(id.as_str())
                    .is_some_and(|rule| rule.tag() == Some(tag.as_str())),
                None => true,
            })
            .cloned()
            .collect())
    }

    // ----- queries -----------------------------------------------------

    pub fn rule(&self, id: &str) -> Option<Arc<Rule>> {
        self.rules.get(id).cloned()
    }

    pub fn condition(&self, id: &str) -> Option<Arc<Condition>> {
        self.conditions.get(id).cloned()
    }

    pub fn validator(&self, id: &str) -> Option<Arc<Validator>> {
        self.validators.get(id).cloned()
    }

    pub fn validators(&self) -> impl Iterator<Item = &Arc<Validator>> {
        self.validators.values()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Arc<Condition>> {
        self.conditions.values()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Every rule `id` depends on, directly or transitively.
    pub fn all_dependencies_of(&self, id: &str) -> Option<BTreeSet<String>> {
        if let Some(closure) = self.derived.closure.get(id) {
            return Some(closure.clone());
        }
        // Ignored rules are not in the graph; combine their direct
        // dependencies' closures.
        let rule = self.rules.get(id)?;
        let mut out = rule.dependencies().clone();
        for dependency in rule.dependencies() {
            if let Some(closure) = self.derived.closure.get(dependency) {
                out.extend(closure.iter().cloned());
            }
        }
        Some(out)
    }

    pub(crate) fn closure_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.derived.closure.get(id)
    }

    pub fn path_index(&self) -> &PathIndex {
        &self.derived.paths
    }

    pub fn rules_at(&self, entity_path: &str) -> &[Arc<Rule>] {
        self.derived
            .rules_by_path
            .get(entity_path)
            .map_or(&[], Vec::as_slice)
    }

    pub fn conditions_at(&self, entity_path: &str) -> &[Arc<Condition>] {
        self.derived
            .conditions_by_path
            .get(entity_path)
            .map_or(&[], Vec::as_slice)
    }

    /// JSON snapshot of every item and derived table.
    pub fn dump(&self) -> Value {
        let validators: serde_json::Map<String, Value> = self
            .validators
            .values()
            .map(|v| {
                let contexts: serde_json::Map<String, Value> = v
                    .contexts
                    .iter()
                    .map(|(key, entry)| {
                        (
                            key.clone(),
                            json!({"expression": entry.expression, "value": entry.value}),
                        )
                    })
                    .collect();
                (
                    v.id.clone(),
                    json!({
                        "name": v.name,
                        "version": v.version,
                        "rules": v.rule_ids,
                        "conditions": v.condition_ids,
                        "categories": v.categories.keys().collect::<Vec<_>>(),
                        "contexts": contexts,
                        "sets": v.sets.values().collect::<Vec<_>>(),
                    }),
                )
            })
            .collect();
        let rules: serde_json::Map<String, Value> = self
            .rules
            .values()
            .map(|rule| {
                (
                    rule.id().to_string(),
                    json!({
                        "definition": rule.definition,
                        "body": rule.body.kind(),
                        "inverted_dependencies": rule.inverted_dependencies,
                        "all_dependencies": self.derived.closure.get(rule.id()),
                    }),
                )
            })
            .collect();
        let conditions: serde_json::Map<String, Value> = self
            .conditions
            .values()
            .map(|c| {
                (
                    c.id().to_string(),
                    json!({"definition": c.definition, "body": c.body.kind()}),
                )
            })
            .collect();
        json!({
            "validators": validators,
            "rules": rules,
            "conditions": conditions,
            "paths": self.derived.paths.declared(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compiler() -> BodyCompiler {
        BodyCompiler::new(Arc::new(ExpressionEngine::with_cache_size(64)), None, true)
    }

    fn registry(definition: ValidatorDefinition) -> RegistryState {
        let compiler = compiler();
        let mut state = RegistryState::default();
        state.add_validator(&definition, &compiler).unwrap();
        state
    }

    fn chain_bundle() -> ValidatorDefinition {
        ValidatorDefinition::new("V1")
            .with_rule(EditableRule::new("R1", "", "level1", "true"))
            .with_rule(EditableRule::new("R2", "", "level1", "true").depends_on("R1"))
            .with_rule(EditableRule::new("R3", "", "level1.level2", "true").depends_on("R2"))
    }

    #[test]
    fn rebuild_tracks_inverted_dependencies_and_order() {
        let state = registry(chain_bundle());
        assert_eq!(
            state.rule("R1").unwrap().inverted_dependencies(),
            &BTreeSet::from(["R2".to_string()])
        );
        let order: Vec<_> = state.rules_at("level1").iter().map(|r| r.id().to_string()).collect();
        assert_eq!(order, vec!["R1".to_string(), "R2".to_string()]);
        assert_eq!(
            state.all_dependencies_of("R3").unwrap(),
            BTreeSet::from(["R1".to_string(), "R2".to_string()])
        );
    }

    #[test]
    fn failed_mutation_is_reported_on_the_working_copy_only() {
        let published = registry(chain_bundle());
        let mut working = published.clone();
        let err = working
            .update_rule(
                EditableRule::new("R1", "V1", "level1", "true").depends_on("R3"),
                &compiler(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
        assert!(published.rule("R1").unwrap().dependencies().is_empty());
    }

    #[test]
    fn delete_rule_with_active_dependents_fails() {
        let mut state = registry(chain_bundle());
        let err = state.delete_rule("R1").unwrap_err();
        assert!(matches!(err, EngineError::DependentsExist { ref dependents, .. } if dependents == &["R2".to_string()]));
    }

    #[test]
    fn ignored_dependency_blocks_reactivation_order() {
        let mut state = registry(chain_bundle());
        state
            .mass_update_ignore_flags(&["R3".into(), "R2".into()], &[])
            .unwrap();
        let err = state
            .mass_update_ignore_flags(&[], &["R3".into()])
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnknownReference { kind: ItemKind::Dependency, ref id } if id == "R2"
        ));
        state
            .mass_update_ignore_flags(&[], &["R2".into(), "R3".into()])
            .unwrap();
        assert!(!state.rule("R3").unwrap().is_ignored());
    }

    #[test]
    fn condition_ancestry_is_enforced() {
        let definition = ValidatorDefinition::new("V1")
            .with_condition(EditableCondition::new("C1", "", "level1.level2", "true"))
            .with_rule(EditableRule::new("R1", "", "level1", "true").guarded_by("C1"));
        let err = RegistryState::default()
            .add_validator(&definition, &compiler())
            .unwrap_err();
        assert!(matches!(err, EngineError::PathAncestryViolation { .. }));
    }

    #[test]
    fn contexts_see_earlier_contexts() {
        let mut state = registry(ValidatorDefinition::new("V1").with_context("A", "2"));
        let engine = ExpressionEngine::new();
        let value = state
            .add_context(
                "V1",
                ContextDefinition {
                    key: "B".into(),
                    expression: "A * 3".into(),
                },
                &engine,
            )
            .unwrap();
        assert_eq!(value, json!(6));
        let err = state.delete_context("V1", "A", &engine).unwrap_err();
        assert!(matches!(err, EngineError::DependentsExist { kind: ItemKind::Context, .. }));
    }

    #[test]
    fn sets_resolve_include_exclude_and_tag() {
        let mut state = registry(
            ValidatorDefinition::new("V1")
                .with_rule(EditableRule::new("R1", "", "a", "true").with_tag("x"))
                .with_rule(EditableRule::new("R2", "", "a", "true").with_tag("x"))
                .with_rule(EditableRule::new("R3", "", "a", "true")),
        );
        state
            .add_set(
                "V1",
                SetDefinition {
                    id: "S1".into(),
                    exclude: BTreeSet::from(["R2".to_string()]),
                    ..SetDefinition::default()
                },
            )
            .unwrap();
        state
            .add_set(
                "V1",
                SetDefinition {
                    id: "S2".into(),
                    tag: Some("x".into()),
                    ..SetDefinition::default()
                },
            )
            .unwrap();
        assert_eq!(
            state.rules_in_set("V1", "S1").unwrap(),
            BTreeSet::from(["R1".to_string(), "R3".to_string()])
        );
        assert_eq!(
            state.rules_in_set("V1", "S2").unwrap(),
            BTreeSet::from(["R1".to_string(), "R2".to_string()])
        );
        assert!(state.delete_set("V1", "S9").is_err());
    }

    #[test]
    fn dump_lists_every_item() {
        let state = registry(chain_bundle());
        let dump = state.dump();
        assert_eq!(dump["rules"].as_object().unwrap().len(), 3);
        assert_eq!(dump["validators"]["V1"]["rules"], json!(["R1", "R2", "R3"]));
    }
}
