//! # custodia-compliance
//!
//! Rule-driven compliance evaluation for the CUSTODIA engine.
//!
//! ## Overview
//!
//! [`ComplianceRuleEngine`] evaluates every ingested event against TOML-
//! configured rules and reports matches for derived compliance events.
//! [`CheckExecutor`] runs the rules' automated checks (built-in query,
//! log-analysis and metric-threshold handlers, plus registered script/API
//! handlers), [`sweep_due_checks`] drives them on schedule, and
//! [`AssessmentEngine`] turns check failures into scored, reportable
//! framework assessments.

pub mod assessment;
pub mod check;
pub mod report;
pub mod rule;
pub mod scheduler;

pub use assessment::{
    ActionItem, ActionStatus, AssessmentEngine, AssessmentStatus, ComplianceAssessment,
    ComplianceFinding, FindingStatus, ManualTask,
};
pub use check::{
    AlertThresholds, AutomatedCheck, CheckExecutor, CheckOutcome, CheckRegistry, CheckSchedule,
    CheckType, ManualCheck, MetricsSource,
};
pub use report::{render as render_report, ReportFormat};
pub use rule::{
    ApplicabilityCondition, ComplianceFramework, ComplianceRule, ComplianceRuleEngine,
    ConditionOperator, RuleMatch, RuleSet,
};
pub use scheduler::{sweep_due_checks, CheckFailure, SweepReport};

// ── Tests ─────────────────────────────────────────────────────────────────────
