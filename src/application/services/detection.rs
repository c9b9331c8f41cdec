//! Detection engine: evaluate a declarative rule set against machine state.
//!
//! Evaluation is strictly read-only. Every rule is evaluated and reported
//! even after one fails; an inaccessible machine state is a clean `false`,
//! never an error that aborts the whole check.

use crate::application::ports::SystemInspector;
use crate::domain::detection::{DetectionOutcome, DetectionRule, RuleResult};

/// Evaluate `rules` as a logical AND.
///
/// An empty rule set is reported as not installed with an explanation.
pub async fn evaluate(
    inspector: &impl SystemInspector,
    rules: &[DetectionRule],
) -> DetectionOutcome {
    if rules.is_empty() {
        return DetectionOutcome::no_rules();
    }
    let mut results = Vec::with_capacity(rules.len());
    for rule in rules {
        results.push(evaluate_rule(inspector, rule).await);
    }
    DetectionOutcome::from_results(results)
}

async fn evaluate_rule(inspector: &impl SystemInspector, rule: &DetectionRule) -> RuleResult {
    let label = rule.label();
    let (passed, detail) = match rule {
        DetectionRule::Package { id } => match inspector.package_version(id).await {
            Ok(Some(version)) => (true, format!("installed version {version}")),
            Ok(None) => (false, "not present in package registry".to_string()),
            Err(e) => (false, format!("package registry inaccessible: {e}")),
        },
        DetectionRule::ConfigValue {
            path,
            value_name,
            expected,
        } => match inspector.config_value(path, value_name.as_deref()).await {
            Ok(Some(actual)) => match expected {
                Some(want) if *want != actual => {
                    (false, format!("value is '{actual}', expected '{want}'"))
                }
                _ => (true, format!("value is '{actual}'")),
            },
            Ok(None) => (false, "config entry not found".to_string()),
            Err(e) => (false, format!("config store inaccessible: {e}")),
        },
        DetectionRule::File { path, min_version } => evaluate_file(inspector, path, min_version.as_ref()).await,
        DetectionRule::Service { name } => match inspector.service_registered(name).await {
            Ok(true) => (true, "registered with service manager".to_string()),
            Ok(false) => (false, "not registered with service manager".to_string()),
            Err(e) => (false, format!("service manager inaccessible: {e}")),
        },
    };
    RuleResult {
        rule: label,
        passed,
        detail,
    }
}

async fn evaluate_file(
    inspector: &impl SystemInspector,
    path: &str,
    min_version: Option<&semver::Version>,
) -> (bool, String) {
    match inspector.file_exists(path).await {
        Ok(false) => (false, "file not found".to_string()),
        Err(e) => (false, format!("file inaccessible: {e}")),
        Ok(true) => {
            let Some(min) = min_version else {
                return (true, "file present".to_string());
            };
            match inspector.file_version(path).await {
                Ok(Some(found)) if found >= *min => {
                    (true, format!("file present at version {found}"))
                }
                Ok(Some(found)) => (
                    false,
                    format!("file version {found} is below required {min}"),
                ),
                Ok(None) => (
                    false,
                    format!("file present but version metadata unavailable (need >= {min})"),
                ),
                Err(e) => (false, format!("version metadata inaccessible: {e}")),
            }
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use anyhow::Result;

    use super::*;

    /// Inspector stub backed by in-memory maps. Entries absent from a map
    /// report as not present; an id listed in `broken` errors on access.
    #[derive(Default)]
    struct InspectorStub {
        packages: HashMap<String, String>,
        config: HashMap<String, String>,
        files: HashMap<String, Option<semver::Version>>,
        services: Vec<String>,
        broken: Vec<String>,
    }

    impl InspectorStub {
        fn check_broken(&self, key: &str) -> Result<()> {
            if self.broken.iter().any(|b| b == key) {
                anyhow::bail!("permission denied");
            }
            Ok(())
        }
    }

    impl SystemInspector for InspectorStub {
        async fn package_version(&self, id: &str) -> Result<Option<String>> {
            self.check_broken(id)?;
            Ok(self.packages.get(id).cloned())
        }
        async fn config_value(
            &self,
            path: &str,
            _value_name: Option<&str>,
        ) -> Result<Option<String>> {
            self.check_broken(path)?;
            Ok(self.config.get(path).cloned())
        }
        async fn file_exists(&self, path: &str) -> Result<bool> {
            self.check_broken(path)?;
            Ok(self.files.contains_key(path))
        }
        async fn file_version(&self, path: &str) -> Result<Option<semver::Version>> {
            self.check_broken(path)?;
            Ok(self.files.get(path).cloned().flatten())
        }
        async fn service_registered(&self, name: &str) -> Result<bool> {
            self.check_broken(name)?;
            Ok(self.services.iter().any(|s| s == name))
        }
    }

    fn package_rule(id: &str) -> DetectionRule {
        DetectionRule::Package { id: id.to_string() }
    }

    #[tokio::test]
    async fn empty_rule_set_is_not_installed_with_explanation() {
        let outcome = evaluate(&InspectorStub::default(), &[]).await;
        assert!(!outcome.installed);
        assert!(outcome.note.expect("note").contains("no detection rules"));
    }

    #[tokio::test]
    async fn all_rules_passing_reports_installed() {
        let mut stub = InspectorStub::default();
        stub.packages
            .insert("relay".to_string(), "2.0.0".to_string());
        stub.services.push("relay".to_string());

        let rules = vec![
            package_rule("relay"),
            DetectionRule::Service {
                name: "relay".to_string(),
            },
        ];
        let outcome = evaluate(&stub, &rules).await;
        assert!(outcome.installed);
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn failing_rule_still_evaluates_remaining_rules() {
        let mut stub = InspectorStub::default();
        stub.services.push("relay".to_string());

        let rules = vec![
            package_rule("missing-pkg"),
            DetectionRule::Service {
                name: "relay".to_string(),
            },
        ];
        let outcome = evaluate(&stub, &rules).await;
        assert!(!outcome.installed);
        assert_eq!(outcome.results.len(), 2, "both rules must be reported");
        assert!(!outcome.results[0].passed);
        assert!(outcome.results[1].passed);
    }

    #[tokio::test]
    async fn inaccessible_state_is_clean_false_not_error() {
        let stub = InspectorStub {
            broken: vec!["locked-pkg".to_string()],
            ..InspectorStub::default()
        };
        let outcome = evaluate(&stub, &[package_rule("locked-pkg")]).await;
        assert!(!outcome.installed);
        assert!(
            outcome.results[0].detail.contains("permission denied"),
            "got: {}",
            outcome.results[0].detail
        );
    }

    #[tokio::test]
    async fn file_rule_passes_without_version_constraint() {
        let mut stub = InspectorStub::default();
        stub.files.insert("/opt/relay/bin/relay".to_string(), None);
        let rules = vec![DetectionRule::File {
            path: "/opt/relay/bin/relay".to_string(),
            min_version: None,
        }];
        assert!(evaluate(&stub, &rules).await.installed);
    }

    #[tokio::test]
    async fn file_rule_fails_below_min_version() {
        let mut stub = InspectorStub::default();
        stub.files.insert(
            "/opt/relay/bin/relay".to_string(),
            Some(semver::Version::new(1, 9, 0)),
        );
        let rules = vec![DetectionRule::File {
            path: "/opt/relay/bin/relay".to_string(),
            min_version: Some(semver::Version::new(2, 0, 0)),
        }];
        let outcome = evaluate(&stub, &rules).await;
        assert!(!outcome.installed);
        assert!(outcome.results[0].detail.contains("below required"));
    }

    #[tokio::test]
    async fn file_rule_passes_at_exact_min_version() {
        let mut stub = InspectorStub::default();
        stub.files.insert(
            "/opt/relay/bin/relay".to_string(),
            Some(semver::Version::new(2, 0, 0)),
        );
        let rules = vec![DetectionRule::File {
            path: "/opt/relay/bin/relay".to_string(),
            min_version: Some(semver::Version::new(2, 0, 0)),
        }];
        assert!(evaluate(&stub, &rules).await.installed);
    }

    #[tokio::test]
    async fn file_rule_with_constraint_fails_when_version_unknown() {
        let mut stub = InspectorStub::default();
        stub.files.insert("/opt/relay/bin/relay".to_string(), None);
        let rules = vec![DetectionRule::File {
            path: "/opt/relay/bin/relay".to_string(),
            min_version: Some(semver::Version::new(2, 0, 0)),
        }];
        let outcome = evaluate(&stub, &rules).await;
        assert!(!outcome.installed);
        assert!(outcome.results[0].detail.contains("metadata unavailable"));
    }

    #[tokio::test]
    async fn config_rule_compares_expected_value() {
        let mut stub = InspectorStub::default();
        stub.config
            .insert("/etc/relay/relay.conf".to_string(), "enabled".to_string());

        let pass = DetectionRule::ConfigValue {
            path: "/etc/relay/relay.conf".to_string(),
            value_name: None,
            expected: Some("enabled".to_string()),
        };
        assert!(evaluate(&stub, std::slice::from_ref(&pass)).await.installed);

        let fail = DetectionRule::ConfigValue {
            path: "/etc/relay/relay.conf".to_string(),
            value_name: None,
            expected: Some("disabled".to_string()),
        };
        let outcome = evaluate(&stub, &[fail]).await;
        assert!(!outcome.installed);
        assert!(outcome.results[0].detail.contains("expected 'disabled'"));
    }
}
