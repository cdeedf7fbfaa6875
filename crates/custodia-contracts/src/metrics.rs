//! Aggregate engine metrics.
//!
//! A point-in-time snapshot of the engine's counters, returned by
//! `AuditService::metrics()` and persisted as a single blob.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counters describing the engine's observable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditMetrics {
    /// Events accepted by `log_event` since startup.
    pub total_events: u64,
    /// Events keyed by `AuditEventType::name()`.
    pub events_by_type: BTreeMap<String, u64>,
    /// Events keyed by `Severity::name()`.
    pub events_by_severity: BTreeMap<String, u64>,

    /// Score of the most recent compliance assessment, if any has run.
    pub compliance_score: Option<u8>,
    /// Findings still in `Open` or `InProgress` across all assessments.
    pub open_findings: u64,
    /// Action plan items past their due date and not completed.
    pub overdue_actions: u64,

    /// Flushes whose persistence failed and were requeued. A steadily
    /// climbing value is the degraded-health signal.
    pub flush_failures: u64,
    pub events_forwarded: u64,
    pub forwarding_failures: u64,
    pub purged_events: u64,
}
