//! Detection rule types and result aggregation.
//!
//! Rules are decoded once at fetch time into a tagged union; evaluation
//! itself lives in the application layer because it needs read-only access
//! to machine state through a port.

use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────────

/// One declarative, side-effect-free presence check.
///
/// A rule set evaluates as a logical AND across all rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionRule {
    /// The platform package registry lists this package id.
    Package { id: String },
    /// A key in a node-local configuration store holds a value.
    ConfigValue {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected: Option<String>,
    },
    /// A file exists, optionally at or above a minimum version.
    File {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_version: Option<semver::Version>,
    },
    /// A service is registered with the service manager.
    Service { name: String },
}

impl DetectionRule {
    /// Short human-readable label used in per-rule diagnostics.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Package { id } => format!("package '{id}'"),
            Self::ConfigValue {
                path, value_name, ..
            } => match value_name {
                Some(name) => format!("config value '{name}' in '{path}'"),
                None => format!("config entry '{path}'"),
            },
            Self::File { path, min_version } => match min_version {
                Some(v) => format!("file '{path}' >= {v}"),
                None => format!("file '{path}'"),
            },
            Self::Service { name } => format!("service '{name}'"),
        }
    }
}

/// Outcome of evaluating a single rule, kept even when the rule failed so
/// operators can see exactly which check broke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: String,
    pub passed: bool,
    pub detail: String,
}

/// Aggregate outcome of a rule-set evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionOutcome {
    pub installed: bool,
    pub results: Vec<RuleResult>,
    /// Set when no per-rule evaluation happened (empty rule set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DetectionOutcome {
    /// Outcome for an empty rule set: never "assume installed".
    #[must_use]
    pub fn no_rules() -> Self {
        Self {
            installed: false,
            results: Vec::new(),
            note: Some("no detection rules declared; treating as not installed".to_string()),
        }
    }

    /// Aggregate individual rule results: AND across all rules.
    #[must_use]
    pub fn from_results(results: Vec<RuleResult>) -> Self {
        let installed = !results.is_empty() && results.iter().all(|r| r.passed);
        Self {
            installed,
            results,
            note: None,
        }
    }

    /// Labels of the rules that failed, for diagnostics.
    #[must_use]
    pub fn failed_rules(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.rule.as_str())
            .collect()
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn passed(rule: &str) -> RuleResult {
        RuleResult {
            rule: rule.to_string(),
            passed: true,
            detail: "ok".to_string(),
        }
    }

    fn failed(rule: &str) -> RuleResult {
        RuleResult {
            rule: rule.to_string(),
            passed: false,
            detail: "missing".to_string(),
        }
    }

    #[test]
    fn test_no_rules_is_not_installed_with_note() {
        let outcome = DetectionOutcome::no_rules();
        assert!(!outcome.installed);
        assert!(outcome.note.expect("note").contains("not installed"));
    }

    #[test]
    fn test_all_rules_passing_is_installed() {
        let outcome = DetectionOutcome::from_results(vec![passed("a"), passed("b")]);
        assert!(outcome.installed);
    }

    #[test]
    fn test_one_failing_rule_is_not_installed_but_all_results_kept() {
        let outcome = DetectionOutcome::from_results(vec![passed("a"), failed("b"), passed("c")]);
        assert!(!outcome.installed);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed_rules(), vec!["b"]);
    }

    #[test]
    fn test_rule_decodes_from_tagged_json() {
        let json = r#"{"type":"file","path":"/opt/tool/bin/tool","min_version":"2.1.0"}"#;
        let rule: DetectionRule = serde_json::from_str(json).expect("decode");
        let DetectionRule::File { path, min_version } = rule else {
            panic!("expected file rule");
        };
        assert_eq!(path, "/opt/tool/bin/tool");
        assert_eq!(min_version, Some(semver::Version::new(2, 1, 0)));
    }

    #[test]
    fn test_config_rule_decodes_without_optional_fields() {
        let json = r#"{"type":"config_value","path":"/etc/tool/tool.conf"}"#;
        let rule: DetectionRule = serde_json::from_str(json).expect("decode");
        assert!(matches!(
            rule,
            DetectionRule::ConfigValue {
                value_name: None,
                expected: None,
                ..
            }
        ));
    }

    #[test]
    fn test_labels_name_the_checked_state() {
        assert_eq!(
            DetectionRule::Package {
                id: "steward-probe".to_string()
            }
            .label(),
            "package 'steward-probe'"
        );
        assert_eq!(
            DetectionRule::Service {
                name: "probe".to_string()
            }
            .label(),
            "service 'probe'"
        );
    }
}
