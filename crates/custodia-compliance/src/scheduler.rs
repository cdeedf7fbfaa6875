//! The automated-check sweep.
//!
//! `sweep_due_checks` finds every enabled check whose `next_execution` has
//! passed, executes it, and writes counters and the next execution time back
//! into the rule set. The periodic cadence (default hourly) is owned by the
//! engine's sweep worker; this module is the single sweep pass, which keeps
//! it directly drivable under test with a manual clock.
//!
//! A failing check is reported in the `SweepReport` so the engine can log a
//! high-severity compliance event; it never halts the sweep.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use custodia_contracts::event::Severity;

use crate::{
    check::{AutomatedCheck, CheckExecutor},
    rule::ComplianceRuleEngine,
};

/// One failed check execution from a sweep.
#[derive(Debug, Clone)]
pub struct CheckFailure {
    pub rule_id: String,
    pub check_id: String,
    pub check_name: String,
    /// Derived from the check's alert thresholds; a scheduled failure is
    /// reported to the audit log at least at High.
    pub severity: Severity,
    pub message: String,
}

/// Counters and failures from one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub executed: usize,
    pub failures: Vec<CheckFailure>,
}

/// Execute every due check once.
///
/// Due checks are collected and cloned under the rule lock, executed without
/// it (executions may take up to their timeout), and their results written
/// back afterwards. Checks edited or removed mid-sweep simply miss this
/// pass's write-back.
pub fn sweep_due_checks(
    rule_engine: &ComplianceRuleEngine,
    executor: &CheckExecutor,
    now: DateTime<Utc>,
) -> SweepReport {
    let due: Vec<(String, AutomatedCheck)> = rule_engine.with_rules_mut(|rules| {
        rules
            .rules
            .iter()
            .filter(|r| r.enabled)
            .flat_map(|rule| {
                rule.automated_checks
                    .iter()
                    .filter(|c| c.is_due(now))
                    .map(|c| (rule.id.clone(), c.clone()))
            })
            .collect()
    });

    if due.is_empty() {
        debug!("no automated checks due");
        return SweepReport::default();
    }

    info!(due = due.len(), "running automated check sweep");

    let mut report = SweepReport::default();
    let mut results: Vec<(String, String, bool)> = Vec::new();

    for (rule_id, check) in &due {
        let outcome = executor.execute(check);
        report.executed += 1;

        if !outcome.passed {
            report.failures.push(CheckFailure {
                rule_id: rule_id.clone(),
                check_id: check.id.clone(),
                check_name: check.name.clone(),
                severity: check.alert_thresholds.severity_for_failure().max(Severity::High),
                message: outcome.message.clone(),
            });
        }

        results.push((rule_id.clone(), check.id.clone(), outcome.passed));
    }

    rule_engine.with_rules_mut(|rules| {
        for (rule_id, check_id, passed) in results {
            let check = rules
                .rules
                .iter_mut()
                .find(|r| r.id == rule_id)
                .and_then(|r| r.automated_checks.iter_mut().find(|c| c.id == check_id));
            if let Some(check) = check {
                check.mark_result(passed, now);
            }
        }
    });

    report
}
