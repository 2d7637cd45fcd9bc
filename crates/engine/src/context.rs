//! Caller-owned failure ledger consulted while rules run.

use std::collections::{BTreeSet, HashMap};

use crate::path::InstancePath;

/// Conditions and rules that failed, keyed by the instance path they
/// failed at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureLedger {
    failed_conditions: HashMap<InstancePath, BTreeSet<String>>,
    failed_rules: HashMap<InstancePath, BTreeSet<String>>,
}

impl FailureLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that condition `id` failed at `path`.
    pub fn record_condition_failure(&mut self, path: &InstancePath, id: &str) {
        self.failed_conditions
            .entry(path.clone())
            .or_default()
            .insert(id.to_string());
    }

    /// Record that rule `id` failed at `path`.
    pub fn record_rule_failure(&mut self, path: &InstancePath, id: &str) {
        self.failed_rules
            .entry(path.clone())
            .or_default()
            .insert(id.to_string());
    }

    /// Conditions that failed exactly at `path`.
    pub fn failed_conditions_at(&self, path: &InstancePath) -> Option<&BTreeSet<String>> {
        self.failed_conditions.get(path)
    }

    /// Rules that failed exactly at `path`.
    pub fn failed_rules_at(&self, path: &InstancePath) -> Option<&BTreeSet<String>> {
        self.failed_rules.get(path)
    }

    /// Whether nothing has failed.
    pub fn is_empty(&self) -> bool {
        self.failed_conditions.is_empty() && self.failed_rules.is_empty()
    }

    /// Forget every failure.
    pub fn clear(&mut self) {
        self.failed_conditions.clear();
        self.failed_rules.clear();
    }
}

/// State shared by the rules of one `validate` call.
///
/// The default lookups consult exactly the ancestor chain they are given.
/// Implementations may override them, e.g. to treat failures under two
/// different roots as equivalent.
pub trait ValidatingContext {
    /// The ledger.
    fn ledger(&self) -> &FailureLedger;

    /// The ledger, mutably.
    fn ledger_mut(&mut self) -> &mut FailureLedger;

    /// Whether condition `id` failed at any path of `chain`.
    fn condition_failed(&self, chain: &[InstancePath], id: &str) -> bool {
        chain.iter().any(|path| {
            self.ledger()
                .failed_conditions_at(path)
                .is_some_and(|failed| failed.contains(id))
        })
    }

    /// Whether any of `dependencies` failed at any path of `chain`.
    fn at_least_one_dependency_failed(
        &self,
        chain: &[InstancePath],
        dependencies: &BTreeSet<String>,
    ) -> bool {
        if dependencies.is_empty() {
            return false;
        }
        chain.iter().any(|path| {
            self.ledger()
                .failed_rules_at(path)
                .is_some_and(|failed| !failed.is_disjoint(dependencies))
        })
    }

    /// Forget every recorded failure.
    fn reset(&mut self) {
        self.ledger_mut().clear();
    }
}

/// The context `validate` creates when the caller passes none.
#[derive(Debug, Clone, Default)]
pub struct DefaultValidatingContext {
    ledger: FailureLedger,
}

impl DefaultValidatingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValidatingContext for DefaultValidatingContext {
    fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut FailureLedger {
        &mut self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> InstancePath {
        InstancePath::parse(text).unwrap()
    }

    #[test]
    fn condition_lookup_follows_the_chain() {
        let mut ctx = DefaultValidatingContext::new();
        ctx.ledger_mut()
            .record_condition_failure(&path("root.items[1]"), "C1");

        let first = [path("root"), path("root.items[0]")];
        let second = [path("root"), path("root.items[1]")];
        assert!(!ctx.condition_failed(&first, "C1"));
        assert!(ctx.condition_failed(&second, "C1"));
    }

    #[test]
    fn ancestor_failures_reach_descendants() {
        let mut ctx = DefaultValidatingContext::new();
        ctx.ledger_mut().record_rule_failure(&path("root"), "R1");

        let deps = BTreeSet::from(["R1".to_string()]);
        let chain = [path("root"), path("root.items[3]")];
        assert!(ctx.at_least_one_dependency_failed(&chain, &deps));
        assert!(!ctx.at_least_one_dependency_failed(&chain, &BTreeSet::new()));
    }

    #[test]
    fn reset_clears_everything() {
        let mut ctx = DefaultValidatingContext::new();
        ctx.ledger_mut().record_rule_failure(&path("root"), "R1");
        ctx.ledger_mut().record_condition_failure(&path("root"), "C1");
        assert!(!ctx.ledger().is_empty());
        ctx.reset();
        assert!(ctx.ledger().is_empty());
    }

    #[test]
    fn lookups_can_be_overridden() {
        /// Treats a failure under any root as a failure under every root.
        struct CrossRoot(FailureLedger);

        impl ValidatingContext for CrossRoot {
            fn ledger(&self) -> &FailureLedger {
                &self.0
            }
            fn ledger_mut(&mut self) -> &mut FailureLedger {
                &mut self.0
            }
            fn condition_failed(&self, _chain: &[InstancePath], id: &str) -> bool {
                self.0
                    .failed_conditions
                    .values()
                    .any(|failed| failed.contains(id))
            }
        }

        let mut ctx = CrossRoot(FailureLedger::new());
        ctx.ledger_mut().record_condition_failure(&path("other"), "C1");
        assert!(ctx.condition_failed(&[path("root")], "C1"));
    }
}
