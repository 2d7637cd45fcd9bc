//! The per-record rule run.
//!
//! Nodes are visited root to leaf. At each node every condition declared
//! there is evaluated first, then every rule declared there in dependency
//! order. A rule is skipped, in this order of precedence, when it is
//! ignored, when the run filter excludes it, when its guard conditions
//! failed along the ancestor chain, or when any rule it depends on
//! (directly or transitively) failed along the ancestor chain.

use std::collections::BTreeSet;
use std::iter;
use std::sync::Arc;
use std::time::Instant;

use regula_expression::{EvaluationContext, ExpressionEngine, Outputs};
use tracing::{debug, warn};

use crate::body::Environment;
use crate::context::ValidatingContext;
use crate::error::{BodyError, ValidationError};
use crate::expander::{ExpandedNode, PathIndex, expand};
use crate::failure::{RuleFailure, render_message};
use crate::model::{Condition, Rule, Validator};
use crate::registry::RegistryState;
use crate::stats::ExecutionStats;
use crate::validatable::Validatable;

/// Which registered rules a run may execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunFilter {
    /// Every active rule.
    #[default]
    All,
    /// Only these rules.
    Include(BTreeSet<String>),
    /// Every active rule except these.
    Exclude(BTreeSet<String>),
}

impl RunFilter {
    /// Run only `ids`.
    pub fn include<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(ids.into_iter().map(Into::into).collect())
    }

    /// Run everything but `ids`.
    pub fn exclude<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(ids.into_iter().map(Into::into).collect())
    }

    /// Whether rule `id` may run.
    pub fn admits(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Include(ids) => ids.contains(id),
            Self::Exclude(ids) => !ids.contains(id),
        }
    }
}

/// One `validate` call over one record.
pub(crate) struct Run<'a> {
    pub registry: &'a RegistryState,
    pub expressions: &'a ExpressionEngine,
    pub record: &'a dyn Validatable,
    pub root_alias: Option<&'a str>,
    pub stats: Option<&'a ExecutionStats>,
}

impl Run<'_> {
    /// Run every registered rule the filter admits.
    pub fn execute(
        &self,
        filter: &RunFilter,
        context: &mut dyn ValidatingContext,
    ) -> Vec<RuleFailure> {
        let nodes = expand(self.record, self.registry.path_index());
        let mut failures = Vec::new();
        for node in &nodes {
            self.evaluate_conditions(node, context);
            for rule in self.registry.rules_at(&node.entity_path) {
                if rule.is_ignored() {
                    debug!(rule = rule.id(), path = %node.path, "skipped: ignored");
                    self.record_skip(rule);
                    continue;
                }
                if !filter.admits(rule.id()) {
                    debug!(rule = rule.id(), path = %node.path, "skipped: filtered out");
                    self.record_skip(rule);
                    continue;
                }
                let dependencies = self.registry.closure_of(rule.id());
                if let Some(failure) = self.step(rule, dependencies, node, context) {
                    failures.push(failure);
                }
            }
        }
        failures
    }

    /// Run `forced` against the record without registering it. Registered
    /// rules it depends on run first so their failures can skip it; only
    /// the forced rule's failures are returned.
    pub fn execute_forced(
        &self,
        forced: &Arc<Rule>,
        dependencies: &BTreeSet<String>,
        context: &mut dyn ValidatingContext,
    ) -> Result<Vec<RuleFailure>, ValidationError> {
        let index = PathIndex::new(
            self.registry
                .rules()
                .map(|rule| rule.entity_path())
                .chain(self.registry.conditions().map(|c| c.entity_path()))
                .chain(iter::once(forced.entity_path())),
        );

        let nodes = expand(self.record, &index);
        let target = forced.entity_path().as_str();
        if !nodes.iter().any(|node| node.entity_path == target) {
            return Err(ValidationError::UnreachablePath {
                rule_id: forced.id().to_string(),
                path: target.to_string(),
            });
        }

        let mut failures = Vec::new();
        for node in &nodes {
            self.evaluate_conditions(node, context);
            for rule in self.registry.rules_at(&node.entity_path) {
                if rule.is_ignored() || !dependencies.contains(rule.id()) || rule.id() == forced.id()
                {
                    continue;
                }
                let closure = self.registry.closure_of(rule.id());
                let _ = self.step(rule, closure, node, context);
            }
            if node.entity_path == target {
                if let Some(failure) = self.step(forced, Some(dependencies), node, context) {
                    failures.push(failure);
                }
            }
        }
        Ok(failures)
    }

    fn evaluate_conditions(&self, node: &ExpandedNode, context: &mut dyn ValidatingContext) {
        for condition in self.registry.conditions_at(&node.entity_path) {
            if !self.condition_passes(condition, node) {
                debug!(condition = condition.id(), path = %node.path, "condition failed");
                context
                    .ledger_mut()
                    .record_condition_failure(&node.path, condition.id());
            }
        }
    }

    fn condition_passes(&self, condition: &Condition, node: &ExpandedNode) -> bool {
        let validator = self.registry.validator(condition.validator_id());
        let environment = self.environment(node, validator.as_deref());
        let evaluation = EvaluationContext::with_resolver(&environment);
        match condition.body().evaluate(self.expressions, &evaluation) {
            Ok(passed) => passed,
            Err(error) => {
                warn!(condition = condition.id(), path = %node.path, %error, "condition body failed");
                false
            }
        }
    }

    fn guard_blocks(
        &self,
        rule: &Rule,
        node: &ExpandedNode,
        context: &dyn ValidatingContext,
    ) -> bool {
        if rule.conditions().is_empty() {
            return false;
        }
        let mut failed = rule
            .conditions()
            .iter()
            .map(|id| context.condition_failed(&node.chain, id));
        if rule.use_and_for_conditions() {
            failed.any(|f| f)
        } else {
            failed.all(|f| f)
        }
    }

    /// Decide skip or run for one active, admitted rule.
    fn step(
        &self,
        rule: &Arc<Rule>,
        dependencies: Option<&BTreeSet<String>>,
        node: &ExpandedNode,
        context: &mut dyn ValidatingContext,
    ) -> Option<RuleFailure> {
        if self.guard_blocks(rule, node, context) {
            debug!(rule = rule.id(), path = %node.path, "skipped: guard condition failed");
            self.record_skip(rule);
            return None;
        }
        if dependencies.is_some_and(|deps| context.at_least_one_dependency_failed(&node.chain, deps))
        {
            debug!(rule = rule.id(), path = %node.path, "skipped: dependency failed");
            self.record_skip(rule);
            return None;
        }

        let failure = self.run_rule(rule, node);
        if failure.is_some() {
            context.ledger_mut().record_rule_failure(&node.path, rule.id());
        }
        failure
    }

    fn run_rule(&self, rule: &Arc<Rule>, node: &ExpandedNode) -> Option<RuleFailure> {
        let validator = self.registry.validator(rule.validator_id());
        let environment = self.environment(node, validator.as_deref());
        let evaluation = EvaluationContext::with_resolver(&environment);

        let started = Instant::now();
        let result = rule.body().evaluate(self.expressions, &evaluation);
        let elapsed = started.elapsed();
        let outputs = evaluation.take_outputs();

        let failed = !matches!(result, Ok(true)) || outputs.force_failure;
        if let Some(stats) = self.stats {
            stats.record_evaluation(rule.id(), elapsed, failed);
        }
        if !failed {
            return None;
        }

        let body_error = result.err();
        match &body_error {
            Some(error) => {
                warn!(rule = rule.id(), path = %node.path, %error, "rule body failed");
            }
            None => debug!(rule = rule.id(), path = %node.path, "rule failed"),
        }

        Some(self.failure(rule, node, &environment, validator.as_deref(), outputs, body_error))
    }

    fn failure(
        &self,
        rule: &Arc<Rule>,
        node: &ExpandedNode,
        environment: &Environment<'_>,
        validator: Option<&Validator>,
        outputs: Outputs,
        body_error: Option<BodyError>,
    ) -> RuleFailure {
        let message = match (&outputs.message, &body_error) {
            (Some(message), _) => message.clone(),
            (None, Some(error)) => format!("Error executing rule '{}': {error}", rule.id()),
            (None, None) if rule.message().is_empty() => format!("Rule '{}' failed", rule.id()),
            (None, None) => render_message(rule.message(), environment),
        };

        let properties = rule
            .referenced_identifiers()
            .iter()
            .filter(|name| validator.is_none_or(|v| v.context_value(name).is_none()))
            .filter(|name| self.root_alias != Some(name.as_str()))
            .cloned()
            .collect();

        RuleFailure {
            rule: Arc::clone(rule),
            message,
            properties,
            entity_identifier: self.record.entity_identifier(&node.path),
            instance_path: node.path.clone(),
            errors: outputs.errors,
            warnings: outputs.warnings,
            information: outputs.information,
            body_error,
        }
    }

    fn environment<'e>(
        &'e self,
        node: &'e ExpandedNode,
        validator: Option<&'e Validator>,
    ) -> Environment<'e> {
        Environment::new(self.record, &node.chain, validator, self.root_alias)
    }

    fn record_skip(&self, rule: &Rule) {
        if let Some(stats) = self.stats {
            stats.record_skip(rule.id());
        }
    }
}
