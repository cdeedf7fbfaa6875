//! Compliance rule types, TOML configuration and the rule engine.
//!
//! A `RuleSet` is deserialized from TOML and holds the full set of
//! `ComplianceRule`s. For every ingested event the engine evaluates each
//! enabled rule's applicability conditions (a conjunction of field-path
//! checks) and reports the rules that matched; the service turns matches
//! into derived compliance events.
//!
//! Rules are static configuration: created at initialization, editable via
//! `upsert`, never auto-deleted.

use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use custodia_contracts::{
    error::{AuditError, AuditResult},
    event::{AuditEvent, Severity},
};

use crate::check::{AutomatedCheck, ManualCheck};

/// The fixed vocabulary of supported compliance frameworks.
///
/// Extend only by adding entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceFramework {
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "CCPA")]
    Ccpa,
    #[serde(rename = "HIPAA")]
    Hipaa,
    #[serde(rename = "SOX")]
    Sox,
    #[serde(rename = "PCI_DSS")]
    PciDss,
    #[serde(rename = "ISO_27001")]
    Iso27001,
    #[serde(rename = "NIST")]
    Nist,
    #[serde(rename = "SOC2")]
    Soc2,
    #[serde(rename = "PIPEDA")]
    Pipeda,
    #[serde(rename = "LGPD")]
    Lgpd,
}

impl ComplianceFramework {
    /// Canonical framework name as used in config and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gdpr => "GDPR",
            Self::Ccpa => "CCPA",
            Self::Hipaa => "HIPAA",
            Self::Sox => "SOX",
            Self::PciDss => "PCI_DSS",
            Self::Iso27001 => "ISO_27001",
            Self::Nist => "NIST",
            Self::Soc2 => "SOC2",
            Self::Pipeda => "PIPEDA",
            Self::Lgpd => "LGPD",
        }
    }

    /// All supported frameworks.
    pub fn all() -> &'static [ComplianceFramework] {
        &[
            Self::Gdpr,
            Self::Ccpa,
            Self::Hipaa,
            Self::Sox,
            Self::PciDss,
            Self::Iso27001,
            Self::Nist,
            Self::Soc2,
            Self::Pipeda,
            Self::Lgpd,
        ]
    }
}

impl std::fmt::Display for ComplianceFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparison operator for one applicability condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
}

/// One field-path condition against a serialized event.
///
/// `field` is a dot-notation path into the event JSON (e.g.
/// `"actor.id"`, `"details.risk_score"`, `"resource.classification"`).
/// Non-string values are compared through their JSON rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicabilityCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: String,
}

impl ApplicabilityCondition {
    /// Evaluate this condition against an event's JSON form.
    ///
    /// A missing field satisfies only the negated operators: an absent value
    /// cannot equal or contain anything.
    pub fn matches(&self, event_json: &serde_json::Value) -> bool {
        let resolved = resolve_path(event_json, &self.field).map(value_as_string);

        match (&self.operator, resolved) {
            (ConditionOperator::Equals, Some(actual)) => actual == self.value,
            (ConditionOperator::NotEquals, Some(actual)) => actual != self.value,
            (ConditionOperator::Contains, Some(actual)) => actual.contains(&self.value),
            (ConditionOperator::NotContains, Some(actual)) => !actual.contains(&self.value),
            (ConditionOperator::Equals | ConditionOperator::Contains, None) => false,
            (ConditionOperator::NotEquals | ConditionOperator::NotContains, None) => true,
        }
    }
}

/// Resolve a dot-notation field path against a JSON value.
///
/// Returns `None` when any segment is missing or the value is JSON `null`.
fn resolve_path<'v>(value: &'v serde_json::Value, path: &str) -> Option<&'v serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) if !v.is_null() => current = v,
            _ => return None,
        }
    }
    Some(current)
}

/// Render a resolved JSON value for comparison: strings verbatim, everything
/// else in compact JSON form.
fn value_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A single compliance rule.
///
/// `applicability` is a conjunction: the rule matches an event only when
/// every condition holds. A rule with no conditions never auto-triggers on
/// events; it still participates in assessments through its checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    /// Stable identifier used in derived events, findings and reports.
    pub id: String,

    pub framework: ComplianceFramework,

    /// The framework section this rule implements (e.g. "Art. 32").
    pub section: String,

    /// Human-readable statement of the requirement.
    pub requirement: String,

    /// Severity assigned to derived events when this rule triggers.
    pub priority: Severity,

    #[serde(default)]
    pub applicability: Vec<ApplicabilityCondition>,

    #[serde(default)]
    pub automated_checks: Vec<AutomatedCheck>,

    #[serde(default)]
    pub manual_checks: Vec<ManualCheck>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The top-level structure deserialized from a TOML rule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// All configured rules, in declaration order.
    #[serde(default)]
    pub rules: Vec<ComplianceRule>,
}

impl RuleSet {
    /// Parse `s` as a TOML rule document.
    ///
    /// Returns `AuditError::ConfigError` if the TOML is malformed or does not
    /// match the rule schema.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        toml::from_str(s).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to parse compliance rule TOML: {e}"),
        })
    }

    /// Read the file at `path` and parse it as a TOML rule document.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to read rule file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Replace the rule with the same id, or append if new.
    pub fn upsert(&mut self, rule: ComplianceRule) {
        match self.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    /// All enabled rules scoped to `framework`.
    pub fn for_framework(&self, framework: ComplianceFramework) -> Vec<&ComplianceRule> {
        self.rules
            .iter()
            .filter(|r| r.enabled && r.framework == framework)
            .collect()
    }
}

/// A rule that matched an ingested event.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule_id: String,
    pub priority: Severity,
    pub requirement: String,
}

/// Evaluates every ingested event against the configured rule set.
///
/// Owns the rules behind a mutex: evaluation, editing, the check scheduler
/// and assessments all go through this one owner.
pub struct ComplianceRuleEngine {
    rules: Mutex<RuleSet>,
}

impl ComplianceRuleEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }

    /// Evaluate `event` against every enabled rule.
    ///
    /// Synthetic events are never evaluated: they are the engine's own
    /// derived output, and re-evaluating them could loop a rule onto its own
    /// consequences. One rule's failure to serialize or match never prevents
    /// evaluation of the others.
    pub fn evaluate(&self, event: &AuditEvent) -> Vec<RuleMatch> {
        if event.synthetic {
            return Vec::new();
        }

        let event_json = match serde_json::to_value(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "cannot serialize event for rule evaluation");
                return Vec::new();
            }
        };

        let rules = self.rules.lock().expect("rule set lock poisoned");
        let mut matches = Vec::new();

        for rule in rules.rules.iter().filter(|r| r.enabled) {
            // A rule with no conditions would vacuously match every event.
            if rule.applicability.is_empty() {
                continue;
            }

            if rule.applicability.iter().all(|c| c.matches(&event_json)) {
                debug!(rule_id = %rule.id, event_id = %event.id, "compliance rule matched");
                matches.push(RuleMatch {
                    rule_id: rule.id.clone(),
                    priority: rule.priority,
                    requirement: rule.requirement.clone(),
                });
            }
        }

        matches
    }

    /// Replace or add one rule.
    pub fn upsert_rule(&self, rule: ComplianceRule) {
        let mut rules = self.rules.lock().expect("rule set lock poisoned");
        rules.upsert(rule);
    }

    /// Snapshot of the current rule set.
    pub fn snapshot(&self) -> RuleSet {
        self.rules.lock().expect("rule set lock poisoned").clone()
    }

    /// Run `f` with mutable access to the rule set.
    ///
    /// Used by the check scheduler and assessments to write back execution
    /// state (counters, `next_execution`). Keep `f` short: evaluation of
    /// ingested events shares this lock.
    pub fn with_rules_mut<R>(&self, f: impl FnOnce(&mut RuleSet) -> R) -> R {
        let mut rules = self.rules.lock().expect("rule set lock poisoned");
        f(&mut rules)
    }

    /// Serialize the rule set for persistence.
    pub fn to_persisted_bytes(&self) -> AuditResult<Vec<u8>> {
        let rules = self.rules.lock().expect("rule set lock poisoned");
        serde_json::to_vec(&*rules).map_err(|e| AuditError::PersistenceFailed {
            reason: format!("cannot serialize rule set: {e}"),
        })
    }
}
