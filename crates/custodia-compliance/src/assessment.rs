//! Framework-scoped compliance assessments.
//!
//! An assessment selects every enabled rule for one framework, executes the
//! rules' automated checks immediately (without waiting for the scheduler),
//! converts failures into severity-tagged findings, schedules the manual
//! checks as tasks due in seven days, and produces a weighted score with a
//! status band.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use custodia_contracts::event::Severity;
use custodia_core::traits::{Clock, IdGenerator};

use crate::{
    check::CheckExecutor,
    rule::{ComplianceFramework, ComplianceRuleEngine},
};

/// Resolution state of a finding.
///
/// Transitions: `Open → InProgress → Resolved | AcceptedRisk |
/// FalsePositive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    InProgress,
    Resolved,
    AcceptedRisk,
    FalsePositive,
}

impl FindingStatus {
    /// True while the finding still needs work.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

/// A recorded deviation from a compliance rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceFinding {
    pub id: String,
    pub rule_id: String,
    pub check_id: String,
    pub severity: Severity,
    pub description: String,
    pub status: FindingStatus,
    pub detected_at: DateTime<Utc>,
}

/// A manual verification scheduled as part of an assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualTask {
    pub id: String,
    pub rule_id: String,
    pub description: String,
    pub assigned_to: String,
    pub due_date: DateTime<Utc>,
    pub completed: bool,
}

/// Remediation state of an action plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Open,
    InProgress,
    Completed,
}

/// One remediation item in an assessment's action plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub finding_id: String,
    pub description: String,
    pub owner: String,
    pub due_date: DateTime<Utc>,
    pub status: ActionStatus,
}

/// Overall status band derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Compliant,
    PartiallyCompliant,
    RemediationRequired,
    NonCompliant,
}

impl AssessmentStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::PartiallyCompliant => "partially_compliant",
            Self::RemediationRequired => "remediation_required",
            Self::NonCompliant => "non_compliant",
        }
    }
}

/// A point-in-time compliance evaluation scoped to one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub id: String,
    pub framework: ComplianceFramework,
    /// What was assessed (application, subsystem, deployment).
    pub scope: String,
    pub assessor: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    pub findings: Vec<ComplianceFinding>,
    pub manual_tasks: Vec<ManualTask>,
    pub action_plan: Vec<ActionItem>,

    /// Weighted score in [0, 100].
    pub score: u8,
    pub status: AssessmentStatus,
}

/// Deduction weight of one finding.
fn weight(severity: Severity) -> i64 {
    match severity {
        Severity::Critical => 25,
        Severity::High => 15,
        Severity::Medium => 10,
        Severity::Low => 5,
        Severity::Info => 0,
    }
}

/// Weighted score over open findings: `100 − 25·crit − 15·high − 10·med −
/// 5·low`, clamped to [0, 100].
///
/// Findings resolved or dismissed no longer deduct, so resolving a finding
/// can only raise the score and adding one can only lower it.
pub fn score(findings: &[ComplianceFinding]) -> u8 {
    let deductions: i64 = findings
        .iter()
        .filter(|f| f.status.is_open())
        .map(|f| weight(f.severity))
        .sum();
    (100 - deductions).clamp(0, 100) as u8
}

/// Map a score onto its status band.
pub fn status_for(score: u8) -> AssessmentStatus {
    match score {
        95..=100 => AssessmentStatus::Compliant,
        80..=94 => AssessmentStatus::PartiallyCompliant,
        60..=79 => AssessmentStatus::RemediationRequired,
        _ => AssessmentStatus::NonCompliant,
    }
}

/// Remediation deadline for a finding of the given severity.
fn action_due_days(severity: Severity) -> i64 {
    match severity {
        Severity::Critical => 7,
        Severity::High => 14,
        Severity::Medium => 30,
        Severity::Low => 60,
        Severity::Info => 90,
    }
}

/// Runs assessments against the configured rules.
pub struct AssessmentEngine {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl AssessmentEngine {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    /// Run one assessment.
    ///
    /// Executes every enabled automated check of every enabled rule for
    /// `framework` immediately, updating check state as the scheduler would.
    /// Check failures become findings; manual checks become tasks due in
    /// seven days; every finding gets an action plan item with a
    /// severity-scaled deadline.
    pub fn run(
        &self,
        framework: ComplianceFramework,
        scope: &str,
        assessor: &str,
        rule_engine: &ComplianceRuleEngine,
        executor: &CheckExecutor,
    ) -> ComplianceAssessment {
        let started_at = self.clock.now();
        let rules = rule_engine.snapshot();
        let scoped: Vec<_> = rules
            .for_framework(framework)
            .into_iter()
            .cloned()
            .collect();

        info!(
            framework = %framework,
            scope = %scope,
            rules = scoped.len(),
            "running compliance assessment"
        );

        let mut findings = Vec::new();
        let mut manual_tasks = Vec::new();

        for rule in &scoped {
            for check in rule.automated_checks.iter().filter(|c| c.enabled) {
                let outcome = executor.execute(check);
                let executed_at = self.clock.now();

                rule_engine.with_rules_mut(|rules| {
                    let found = rules
                        .rules
                        .iter_mut()
                        .find(|r| r.id == rule.id)
                        .and_then(|r| r.automated_checks.iter_mut().find(|c| c.id == check.id));
                    if let Some(check) = found {
                        check.mark_result(outcome.passed, executed_at);
                    }
                });

                if !outcome.passed {
                    findings.push(ComplianceFinding {
                        id: self.ids.next_id().to_string(),
                        rule_id: rule.id.clone(),
                        check_id: check.id.clone(),
                        severity: check.alert_thresholds.severity_for_failure(),
                        description: format!(
                            "{} ({}): {}",
                            rule.requirement, check.name, outcome.message
                        ),
                        status: FindingStatus::Open,
                        detected_at: executed_at,
                    });
                }
            }

            for manual in &rule.manual_checks {
                manual_tasks.push(ManualTask {
                    id: self.ids.next_id().to_string(),
                    rule_id: rule.id.clone(),
                    description: manual.description.clone(),
                    assigned_to: manual.assignee_role.clone(),
                    due_date: started_at + Duration::days(7),
                    completed: false,
                });
            }
        }

        let action_plan = findings
            .iter()
            .map(|finding| ActionItem {
                id: self.ids.next_id().to_string(),
                finding_id: finding.id.clone(),
                description: format!("Remediate: {}", finding.description),
                owner: assessor.to_string(),
                due_date: started_at + Duration::days(action_due_days(finding.severity)),
                status: ActionStatus::Open,
            })
            .collect();

        let score = score(&findings);
        let status = status_for(score);
        let completed_at = self.clock.now();

        info!(
            framework = %framework,
            findings = findings.len(),
            score,
            status = %status.name(),
            "assessment complete"
        );

        ComplianceAssessment {
            id: self.ids.next_id().to_string(),
            framework,
            scope: scope.to_string(),
            assessor: assessor.to_string(),
            started_at,
            completed_at,
            findings,
            manual_tasks,
            action_plan,
            score,
            status,
        }
    }
}
