//! Rule failures and failure message rendering.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use regula_expression::VariableResolver;
use regula_expression::value_utils::display_string;

use crate::error::BodyError;
use crate::model::{Rule, Severity};
use crate::path::InstancePath;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}")
        .expect("valid regex")
});

/// Substitute `${name}` and `${name.field}` placeholders. Placeholders that
/// do not resolve are left as written.
pub fn render_message(template: &str, resolver: &dyn VariableResolver) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let mut parts = caps[1].split('.');
            let value = parts
                .next()
                .and_then(|head| resolver.resolve(head))
                .and_then(|value| parts.try_fold(value, |node, key| node.get(key).cloned()));
            match value {
                Some(value) => display_string(&value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// One failed rule at one instance path.
#[derive(Debug, Clone)]
pub struct RuleFailure {
    pub(crate) rule: Arc<Rule>,
    pub(crate) message: String,
    pub(crate) properties: BTreeSet<String>,
    pub(crate) entity_identifier: Option<String>,
    pub(crate) instance_path: InstancePath,
    pub(crate) errors: Vec<String>,
    pub(crate) warnings: Vec<String>,
    pub(crate) information: Vec<String>,
    pub(crate) body_error: Option<BodyError>,
}

impl RuleFailure {
    /// The failing rule.
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    /// Id of the failing rule.
    pub fn rule_id(&self) -> &str {
        self.rule.id()
    }

    /// Severity of the failing rule.
    pub fn severity(&self) -> Severity {
        self.rule.severity()
    }

    /// Rendered message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Record properties the rule reads.
    pub fn properties(&self) -> &BTreeSet<String> {
        &self.properties
    }

    /// Identifier of the entity the failing node belongs to.
    pub fn entity_identifier(&self) -> Option<&str> {
        self.entity_identifier.as_deref()
    }

    /// Where the rule failed.
    pub fn instance_path(&self) -> &InstancePath {
        &self.instance_path
    }

    /// Extra error messages written by the body.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Extra warning messages written by the body.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Extra informational messages written by the body.
    pub fn information(&self) -> &[String] {
        &self.information
    }

    /// The body error, when the failure came from one.
    pub fn body_error(&self) -> Option<&BodyError> {
        self.body_error.as_ref()
    }
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule.id(), self.instance_path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn resolver(name: &str) -> Option<Value> {
        match name {
            "prop" => Some(json!("1")),
            "count" => Some(json!(3)),
            "patient" => Some(json!({"name": {"last": "Doe"}})),
            _ => None,
        }
    }

    #[test]
    fn renders_simple_and_nested_placeholders() {
        assert_eq!(
            render_message("prop is ${prop}, count ${ count }", &resolver),
            "prop is 1, count 3"
        );
        assert_eq!(render_message("${patient.name.last}", &resolver), "Doe");
    }

    #[test]
    fn unresolved_placeholders_are_kept() {
        assert_eq!(
            render_message("${missing} and ${patient.age}", &resolver),
            "${missing} and ${patient.age}"
        );
        assert_eq!(render_message("no placeholders", &resolver), "no placeholders");
    }
}
