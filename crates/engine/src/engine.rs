//! The validation engine handle.
//!
//! The published state is immutable and swapped atomically, so `validate`
//! calls never block and always see one consistent registry. Mutations are
//! serialized by a writer lock, applied to a copy of the state, and
//! published only when every invariant holds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use regula_expression::{ExpressionEngine, Value};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::body::BodyCompiler;
use crate::context::{DefaultValidatingContext, ValidatingContext};
use crate::error::{EngineError, ItemKind, ValidationError};
use crate::execution::{Run, RunFilter};
use crate::failure::RuleFailure;
use crate::model::{
    Condition, ContextDefinition, EditableCondition, EditableRule, Rule, SetDefinition, Validator,
    ValidatorDefinition,
};
use crate::options::InitializationOptions;
use crate::registry::{CompiledBundle, RegistryState, compile_bundle};
use crate::stats::{ExecutionStats, InitializationStats, RuleExecutionStats, ValidatorStats};
use crate::validatable::{PathResolver, Validatable};

/// Lifecycle of a [`ValidationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    /// No rules are loaded.
    Uninitialized,
    /// `initialize` is compiling.
    Initializing,
    /// Rules are loaded and `validate` runs them.
    Initialized,
}

#[derive(Clone)]
struct EngineState {
    registry: RegistryState,
    compiler: BodyCompiler,
    options: InitializationOptions,
    initialization: InitializationStats,
    execution: Arc<ExecutionStats>,
}

impl EngineState {
    fn expressions(&self) -> &ExpressionEngine {
        self.compiler.expressions()
    }

    fn refresh_totals(&mut self) {
        let duration = self.initialization.duration;
        self.initialization
            .finish(self.options.pre_compiled_bodies_enabled, duration);
    }
}

/// Holds the rule registry and runs it against records.
pub struct ValidationEngine {
    state: ArcSwapOption<EngineState>,
    writer: Mutex<()>,
    status: RwLock<EngineStatus>,
    resolver: Option<Arc<dyn PathResolver>>,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load_full();
        f.debug_struct("ValidationEngine")
            .field("status", &self.status())
            .field("rules", &state.map(|s| s.registry.rule_count()))
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

impl ValidationEngine {
    /// Create an uninitialized engine.
    pub fn new() -> Self {
        Self {
            state: ArcSwapOption::empty(),
            writer: Mutex::new(()),
            status: RwLock::new(EngineStatus::Uninitialized),
            resolver: None,
        }
    }

    /// Create an uninitialized engine that maps record roots through
    /// `resolver`.
    pub fn with_resolver(resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::new()
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> EngineStatus {
        *self.status.read()
    }

    /// Whether `validate` runs rules.
    pub fn is_initialized(&self) -> bool {
        self.status() == EngineStatus::Initialized
    }

    // ----- lifecycle ---------------------------------------------------

    /// Compile and publish `validators`. Replaces anything loaded before.
    ///
    /// On error nothing is published and the engine is left uninitialized.
    #[instrument(skip_all, fields(validators = validators.len()))]
    pub fn initialize(
        &self,
        options: InitializationOptions,
        validators: Vec<ValidatorDefinition>,
    ) -> Result<InitializationStats, EngineError> {
        let _writer = self.writer.lock();
        *self.status.write() = EngineStatus::Initializing;
        self.state.store(None);

        match Self::build(options, &validators) {
            Ok(state) => {
                let stats = state.initialization.clone();
                self.state.store(Some(Arc::new(state)));
                *self.status.write() = EngineStatus::Initialized;
                info!(
                    rules = stats.rules_loaded,
                    conditions = stats.conditions_loaded,
                    pre_compiled = stats.pre_compiled_rules,
                    elapsed_ms = stats.duration.as_millis() as u64,
                    "validation engine initialized"
                );
                Ok(stats)
            }
            Err(error) => {
                *self.status.write() = EngineStatus::Uninitialized;
                warn!(%error, "validation engine initialization failed");
                Err(error)
            }
        }
    }

    fn build(
        options: InitializationOptions,
        validators: &[ValidatorDefinition],
    ) -> Result<EngineState, EngineError> {
        let started = Instant::now();
        let expressions = Arc::new(ExpressionEngine::with_cache_size(
            options.expression_cache_size,
        ));
        let compiler = BodyCompiler::new(
            expressions,
            options.native_bodies.clone(),
            options.pre_compiled_bodies_enabled,
        );

        let bundles: Vec<CompiledBundle> = if options.num_compilation_threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.num_compilation_threads)
                .thread_name(|i| format!("regula-compile-{i}"))
                .build()
                .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
            pool.install(|| {
                validators
                    .par_iter()
                    .map(|definition| compile_bundle(definition, &compiler, true))
                    .collect::<Result<_, _>>()
            })?
        } else {
            validators
                .iter()
                .map(|definition| compile_bundle(definition, &compiler, false))
                .collect::<Result<_, _>>()?
        };

        let mut initialization = InitializationStats::default();
        let mut registry = RegistryState::default();
        for (definition, bundle) in validators.iter().zip(bundles) {
            initialization
                .validators
                .insert(definition.id.clone(), bundle.stats.clone());
            registry.install(bundle)?;
        }
        registry.rebuild()?;
        initialization.finish(options.pre_compiled_bodies_enabled, started.elapsed());

        Ok(EngineState {
            registry,
            compiler,
            options,
            initialization,
            execution: Arc::new(ExecutionStats::new()),
        })
    }

    /// Drop every loaded item. Safe to call repeatedly.
    pub fn uninitialize(&self) {
        let _writer = self.writer.lock();
        if self.state.swap(None).is_some() {
            info!("validation engine uninitialized");
        }
        *self.status.write() = EngineStatus::Uninitialized;
    }

    fn load(&self) -> Result<Arc<EngineState>, EngineError> {
        self.state.load_full().ok_or(EngineError::NotInitialized)
    }

    /// Apply `change` to a copy of the state and publish it on success.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut EngineState) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let _writer = self.writer.lock();
        let current = self.load()?;
        let mut next = EngineState::clone(&current);
        let out = change(&mut next)?;
        self.state.store(Some(Arc::new(next)));
        Ok(out)
    }

    // ----- rules -------------------------------------------------------

    /// Register a new rule.
    pub fn add_rule(&self, rule: EditableRule) -> Result<Arc<Rule>, EngineError> {
        let added = self.mutate(|state| state.registry.add_rule(rule, &state.compiler))?;
        info!(rule = added.id(), "rule added");
        Ok(added)
    }

    /// Replace a rule with an edited snapshot.
    pub fn update_rule(&self, rule: EditableRule) -> Result<Arc<Rule>, EngineError> {
        let updated = self.mutate(|state| state.registry.update_rule(rule, &state.compiler))?;
        info!(rule = updated.id(), "rule updated");
        Ok(updated)
    }

    /// Remove a rule. Fails while an active rule depends on it.
    pub fn delete_rule(&self, id: &str) -> Result<Arc<Rule>, EngineError> {
        let deleted = self.mutate(|state| state.registry.delete_rule(id))?;
        info!(rule = id, "rule deleted");
        Ok(deleted)
    }

    /// Soft-delete a rule. Fails while an active rule depends on it.
    pub fn ignore_rule(&self, id: &str) -> Result<(), EngineError> {
        self.mass_update_ignore_flags(&[id.to_string()], &[])
    }

    /// Reactivate a soft-deleted rule. Its dependencies must be active.
    pub fn unignore_rule(&self, id: &str) -> Result<(), EngineError> {
        self.mass_update_ignore_flags(&[], &[id.to_string()])
    }

    /// Ignore and reactivate many rules at once; all or nothing.
    pub fn mass_update_ignore_flags(
        &self,
        to_ignore: &[String],
        to_unignore: &[String],
    ) -> Result<(), EngineError> {
        self.mutate(|state| {
            state
                .registry
                .mass_update_ignore_flags(to_ignore, to_unignore)
        })?;
        info!(
            ignored = to_ignore.len(),
            unignored = to_unignore.len(),
            "ignore flags updated"
        );
        Ok(())
    }

    // ----- conditions --------------------------------------------------

    /// Register a new condition.
    pub fn add_condition(&self, condition: EditableCondition) -> Result<Arc<Condition>, EngineError> {
        let added = self.mutate(|state| state.registry.add_condition(condition, &state.compiler))?;
        info!(condition = added.id(), "condition added");
        Ok(added)
    }

    /// Replace a condition with an edited snapshot.
    pub fn update_condition(
        &self,
        condition: EditableCondition,
    ) -> Result<Arc<Condition>, EngineError> {
        let updated =
            self.mutate(|state| state.registry.update_condition(condition, &state.compiler))?;
        info!(condition = updated.id(), "condition updated");
        Ok(updated)
    }

    /// Remove a condition. Fails while any rule references it.
    pub fn delete_condition(&self, id: &str) -> Result<Arc<Condition>, EngineError> {
        let deleted = self.mutate(|state| state.registry.delete_condition(id))?;
        info!(condition = id, "condition deleted");
        Ok(deleted)
    }

    // ----- validators --------------------------------------------------

    /// Compile and register a whole bundle.
    pub fn add_validator(
        &self,
        definition: &ValidatorDefinition,
    ) -> Result<ValidatorStats, EngineError> {
        let stats = self.mutate(|state| {
            let stats = state.registry.add_validator(definition, &state.compiler)?;
            state
                .initialization
                .validators
                .insert(definition.id.clone(), stats.clone());
            state.refresh_totals();
            Ok(stats)
        })?;
        info!(validator = %definition.id, rules = stats.rules, "validator added");
        Ok(stats)
    }

    /// Remove a bundle with all its rules and conditions.
    pub fn delete_validator(&self, id: &str) -> Result<Arc<Validator>, EngineError> {
        let deleted = self.mutate(|state| {
            let deleted = state.registry.delete_validator(id)?;
            state.initialization.validators.remove(id);
            state.refresh_totals();
            Ok(deleted)
        })?;
        info!(validator = id, "validator deleted");
        Ok(deleted)
    }

    // ----- contexts ----------------------------------------------------

    /// Add a named context to a validator and return its value.
    pub fn add_context(
        &self,
        validator_id: &str,
        key: impl Into<String>,
        expression: impl Into<String>,
    ) -> Result<Value, EngineError> {
        let definition = ContextDefinition {
            key: key.into(),
            expression: expression.into(),
        };
        self.mutate(|state| {
            state
                .registry
                .add_context(validator_id, definition, state.compiler.expressions())
        })
    }

    /// Change a context's expression and return its new value.
    pub fn update_context(
        &self,
        validator_id: &str,
        key: impl Into<String>,
        expression: impl Into<String>,
    ) -> Result<Value, EngineError> {
        let definition = ContextDefinition {
            key: key.into(),
            expression: expression.into(),
        };
        self.mutate(|state| {
            state
                .registry
                .update_context(validator_id, definition, state.compiler.expressions())
        })
    }

    /// Remove a context. Fails while a body of the validator reads it.
    pub fn delete_context(&self, validator_id: &str, key: &str) -> Result<(), EngineError> {
        self.mutate(|state| {
            state
                .registry
                .delete_context(validator_id, key, state.compiler.expressions())
        })
    }

    // ----- sets --------------------------------------------------------

    /// Add a named rule set to a validator.
    pub fn add_set(&self, validator_id: &str, set: SetDefinition) -> Result<(), EngineError> {
        self.mutate(|state| state.registry.add_set(validator_id, set))
    }

    /// Remove a rule set.
    pub fn delete_set(&self, validator_id: &str, set_id: &str) -> Result<(), EngineError> {
        self.mutate(|state| state.registry.delete_set(validator_id, set_id))
    }

    /// Rule ids a set resolves to.
    pub fn rules_in_set(
        &self,
        validator_id: &str,
        set_id: &str,
    ) -> Result<BTreeSet<String>, EngineError> {
        self.load()?.registry.rules_in_set(validator_id, set_id)
    }

    // ----- queries -----------------------------------------------------

    /// A rule by id.
    pub fn rule(&self, id: &str) -> Option<Arc<Rule>> {
        self.state.load_full()?.registry.rule(id)
    }

    /// An editable snapshot of a rule.
    pub fn editable_rule(&self, id: &str) -> Option<EditableRule> {
        self.rule(id).map(|rule| rule.to_editable())
    }

    /// A condition by id.
    pub fn condition(&self, id: &str) -> Option<Arc<Condition>> {
        self.state.load_full()?.registry.condition(id)
    }

    /// A validator by id.
    pub fn validator(&self, id: &str) -> Option<Arc<Validator>> {
        self.state.load_full()?.registry.validator(id)
    }

    /// Ids of every validator.
    pub fn validator_ids(&self) -> Vec<String> {
        self.state.load_full().map_or_else(Vec::new, |state| {
            state
                .registry
                .validators()
                .map(|v| v.id().to_string())
                .collect()
        })
    }

    /// Ids of every rule, ignored ones included.
    pub fn rule_ids(&self) -> Vec<String> {
        self.state.load_full().map_or_else(Vec::new, |state| {
            state
                .registry
                .rules()
                .map(|rule| rule.id().to_string())
                .collect()
        })
    }

    /// Direct dependencies of a rule.
    pub fn dependencies_of(&self, id: &str) -> Result<BTreeSet<String>, EngineError> {
        self.load()?
            .registry
            .rule(id)
            .map(|rule| rule.dependencies().clone())
            .ok_or_else(|| EngineError::unknown(ItemKind::Rule, id))
    }

    /// Active rules that list `id` as a dependency.
    pub fn dependents_of(&self, id: &str) -> Result<BTreeSet<String>, EngineError> {
        self.load()?
            .registry
            .rule(id)
            .map(|rule| rule.inverted_dependencies().clone())
            .ok_or_else(|| EngineError::unknown(ItemKind::Rule, id))
    }

    /// Every rule `id` depends on, directly or transitively.
    pub fn all_dependencies_of(&self, id: &str) -> Result<BTreeSet<String>, EngineError> {
        self.load()?
            .registry
            .all_dependencies_of(id)
            .ok_or_else(|| EngineError::unknown(ItemKind::Rule, id))
    }

    /// Record roots `validate` accepts.
    pub fn supported_path_roots(&self) -> BTreeSet<String> {
        if let Some(resolver) = &self.resolver {
            return resolver.supported_roots();
        }
        self.state
            .load_full()
            .map(|state| state.registry.path_index().roots().clone())
            .unwrap_or_default()
    }

    /// JSON snapshot of the registry, options and statistics.
    pub fn dump_internal_state(&self) -> Result<Value, EngineError> {
        let state = self.load()?;
        Ok(json!({
            "status": format!("{:?}", self.status()),
            "options": state.options,
            "initialization": state.initialization,
            "registry": state.registry.dump(),
            "execution": state.execution.snapshot(),
        }))
    }

    /// Statistics from the last `initialize`, updated by validator
    /// mutations.
    pub fn initialization_stats(&self) -> Option<InitializationStats> {
        Some(self.state.load_full()?.initialization.clone())
    }

    /// Per-rule execution counters, when enabled in the options.
    pub fn execution_stats(&self) -> Option<BTreeMap<String, RuleExecutionStats>> {
        let state = self.state.load_full()?;
        state
            .options
            .compute_execution_stats
            .then(|| state.execution.snapshot())
    }

    /// Zero the execution counters.
    pub fn reset_execution_stats(&self) {
        if let Some(state) = self.state.load_full() {
            state.execution.reset();
        }
    }

    // ----- validation --------------------------------------------------

    /// Run every active rule against `record` with a fresh context.
    pub fn validate(&self, record: &dyn Validatable) -> Vec<RuleFailure> {
        let mut context = DefaultValidatingContext::new();
        self.validate_with_filter(record, &RunFilter::All, &mut context)
    }

    /// Run every active rule against `record`, recording into `context`.
    pub fn validate_in(
        &self,
        record: &dyn Validatable,
        context: &mut dyn ValidatingContext,
    ) -> Vec<RuleFailure> {
        self.validate_with_filter(record, &RunFilter::All, context)
    }

    /// Run a single registered rule.
    pub fn validate_rule(
        &self,
        record: &dyn Validatable,
        rule_id: &str,
        context: &mut dyn ValidatingContext,
    ) -> Vec<RuleFailure> {
        self.validate_with_filter(record, &RunFilter::include([rule_id]), context)
    }

    /// Run the active rules `filter` admits.
    #[instrument(skip_all, fields(root = record.root_name()))]
    pub fn validate_with_filter(
        &self,
        record: &dyn Validatable,
        filter: &RunFilter,
        context: &mut dyn ValidatingContext,
    ) -> Vec<RuleFailure> {
        let Some(state) = self.state.load_full() else {
            return Vec::new();
        };
        if !self.root_supported(&state, record.root_name()) {
            return Vec::new();
        }
        let alias = self.root_alias(record.root_name());
        self.run(&state, record, alias.as_deref())
            .execute(filter, context)
    }

    /// Run an unregistered rule definition once.
    ///
    /// Registered rules it depends on run first; only its own failures are
    /// returned.
    #[instrument(skip_all, fields(root = record.root_name(), rule = %rule.id))]
    pub fn validate_forced(
        &self,
        record: &dyn Validatable,
        rule: EditableRule,
        context: &mut dyn ValidatingContext,
    ) -> Result<Vec<RuleFailure>, ValidationError> {
        let state = self.load()?;
        let (forced, dependencies) = state.registry.prepare_forced(rule, &state.compiler)?;
        // without a resolver the forced rule's own path decides reachability
        if self
            .resolver
            .as_ref()
            .is_some_and(|resolver| !resolver.supported_roots().contains(record.root_name()))
        {
            return Err(ValidationError::UnreachablePath {
                rule_id: forced.id().to_string(),
                path: forced.entity_path().to_string(),
            });
        }
        let alias = self.root_alias(record.root_name());
        self.run(&state, record, alias.as_deref())
            .execute_forced(&forced, &dependencies, context)
    }

    fn root_supported(&self, state: &EngineState, root: &str) -> bool {
        match &self.resolver {
            Some(resolver) => resolver.supported_roots().contains(root),
            None => state.registry.path_index().supports_root(root),
        }
    }

    fn root_alias(&self, root: &str) -> Option<String> {
        self.resolver
            .as_ref()
            .and_then(|resolver| resolver.alias_for_path(root))
    }

    fn run<'a>(
        &self,
        state: &'a EngineState,
        record: &'a dyn Validatable,
        root_alias: Option<&'a str>,
    ) -> Run<'a> {
        Run {
            registry: &state.registry,
            expressions: state.expressions(),
            record,
            root_alias,
            stats: state
                .options
                .compute_execution_stats
                .then_some(state.execution.as_ref()),
        }
    }
}
