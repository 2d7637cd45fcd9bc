//! Initialization and execution statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::body::BodyKind;

/// Why a rule runs interpreted instead of natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreCompilationSkipReason {
    /// Native bodies were turned off in the options.
    Disabled,
    /// No native body was provided for the rule.
    NotProvided,
}

/// How one rule's body was compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCompilation {
    /// Variant used.
    pub kind: BodyKind,
    /// Set when the rule runs interpreted.
    pub skip_reason: Option<PreCompilationSkipReason>,
}

/// Per-validator breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStats {
    /// Rules loaded.
    pub rules: usize,
    /// Conditions loaded.
    pub conditions: usize,
    /// Rules running a native body.
    pub pre_compiled_rules: usize,
    /// Rules running an interpreted body.
    pub compiled_rules: usize,
    /// Per-rule compilation details.
    pub rule_bodies: BTreeMap<String, RuleCompilation>,
}

impl ValidatorStats {
    pub(crate) fn record_rule(&mut self, rule_id: &str, compilation: RuleCompilation) {
        self.rules += 1;
        match compilation.kind {
            BodyKind::Native => self.pre_compiled_rules += 1,
            BodyKind::Interpreted => self.compiled_rules += 1,
        }
        self.rule_bodies.insert(rule_id.to_string(), compilation);
    }
}

/// Produced by `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationStats {
    /// Rules loaded across all validators.
    pub rules_loaded: usize,
    /// Conditions loaded across all validators.
    pub conditions_loaded: usize,
    /// Rules running a native body.
    pub pre_compiled_rules: usize,
    /// Rules running an interpreted body.
    pub compiled_rules: usize,
    /// Why native bodies were not used, when no rule used one.
    pub pre_compilation_skip_reason: Option<PreCompilationSkipReason>,
    /// Per-validator breakdown, keyed by validator id.
    pub validators: BTreeMap<String, ValidatorStats>,
    /// Wall-clock time spent initializing.
    pub duration: Duration,
}

impl InitializationStats {
    pub(crate) fn finish(&mut self, native_enabled: bool, duration: Duration) {
        self.rules_loaded = self.validators.values().map(|v| v.rules).sum();
        self.conditions_loaded = self.validators.values().map(|v| v.conditions).sum();
        self.pre_compiled_rules = self.validators.values().map(|v| v.pre_compiled_rules).sum();
        self.compiled_rules = self.validators.values().map(|v| v.compiled_rules).sum();
        self.pre_compilation_skip_reason = if !native_enabled {
            Some(PreCompilationSkipReason::Disabled)
        } else if self.pre_compiled_rules == 0 {
            Some(PreCompilationSkipReason::NotProvided)
        } else {
            None
        };
        self.duration = duration;
    }
}

/// Counters for one rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExecutionStats {
    /// Times the body ran.
    pub evaluations: u64,
    /// Times it failed.
    pub failures: u64,
    /// Times it was skipped.
    pub skips: u64,
    /// Cumulative body time.
    pub total_duration: Duration,
}

/// Per-rule counters, safe to update from concurrent `validate` calls.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    rules: DashMap<String, RuleExecutionStats>,
}

impl ExecutionStats {
    /// Create empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_evaluation(&self, rule_id: &str, elapsed: Duration, failed: bool) {
        let mut entry = self.rules.entry(rule_id.to_string()).or_default();
        entry.evaluations += 1;
        entry.total_duration += elapsed;
        if failed {
            entry.failures += 1;
        }
    }

    pub(crate) fn record_skip(&self, rule_id: &str) {
        self.rules.entry(rule_id.to_string()).or_default().skips += 1;
    }

    /// Counters for one rule.
    pub fn get(&self, rule_id: &str) -> Option<RuleExecutionStats> {
        self.rules.get(rule_id).map(|entry| *entry)
    }

    /// Copy of all counters, sorted by rule id.
    pub fn snapshot(&self) -> BTreeMap<String, RuleExecutionStats> {
        self.rules
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Drop all counters.
    pub fn reset(&self) {
        self.rules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_stats_accumulate_and_reset() {
        let stats = ExecutionStats::new();
        stats.record_evaluation("R1", Duration::from_millis(2), false);
        stats.record_evaluation("R1", Duration::from_millis(3), true);
        stats.record_skip("R2");

        let r1 = stats.get("R1").unwrap();
        assert_eq!(r1.evaluations, 2);
        assert_eq!(r1.failures, 1);
        assert_eq!(r1.total_duration, Duration::from_millis(5));
        assert_eq!(stats.get("R2").unwrap().skips, 1);
        assert_eq!(stats.snapshot().len(), 2);

        stats.reset();
        assert!(stats.get("R1").is_none());
    }

    #[test]
    fn skip_reason_summarizes_validators() {
        let mut stats = InitializationStats::default();
        let mut validator = ValidatorStats::default();
        validator.record_rule(
            "R1",
            RuleCompilation {
                kind: BodyKind::Interpreted,
                skip_reason: Some(PreCompilationSkipReason::NotProvided),
            },
        );
        stats.validators.insert("V1".into(), validator);

        stats.finish(true, Duration::ZERO);
        assert_eq!(stats.rules_loaded, 1);
        assert_eq!(stats.compiled_rules, 1);
        assert_eq!(
            stats.pre_compilation_skip_reason,
            Some(PreCompilationSkipReason::NotProvided)
        );

        stats.finish(false, Duration::ZERO);
        assert_eq!(
            stats.pre_compilation_skip_reason,
            Some(PreCompilationSkipReason::Disabled)
        );
    }
}
