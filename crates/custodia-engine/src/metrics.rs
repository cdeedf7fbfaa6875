//! Engine metric counters.
//!
//! `MetricsRegistry` holds the hot-path counters as atomics so `log_event`
//! never contends on a metrics lock. `EngineMetricsSource` adapts the
//! registry plus the assessment map into the `MetricsSource` snapshot the
//! automated checks and the public `metrics()` call consume; finding and
//! action-item counters are recomputed from the assessments at snapshot time
//! so they stay honest as deadlines pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use custodia_contracts::{
    event::{AuditEventType, Severity},
    metrics::AuditMetrics,
};
use custodia_compliance::{ActionStatus, ComplianceAssessment, MetricsSource};
use custodia_core::traits::Clock;

/// Lock-free event and flush counters.
#[derive(Default)]
pub struct MetricsRegistry {
    total_events: AtomicU64,
    by_type: Mutex<BTreeMap<String, u64>>,
    by_severity: Mutex<BTreeMap<String, u64>>,
    latest_score: Mutex<Option<u8>>,
    flush_failures: AtomicU64,
    events_forwarded: AtomicU64,
    forwarding_failures: AtomicU64,
    purged_events: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, event_type: AuditEventType, severity: Severity) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let mut by_type = self.by_type.lock().expect("metrics lock poisoned");
        *by_type.entry(event_type.name().to_string()).or_insert(0) += 1;
        drop(by_type);
        let mut by_severity = self.by_severity.lock().expect("metrics lock poisoned");
        *by_severity.entry(severity.name().to_string()).or_insert(0) += 1;
    }

    pub fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_forwarded(&self, n: u64) {
        self.events_forwarded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_forwarding_failures(&self, n: u64) {
        self.forwarding_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_purged(&self, n: u64) {
        self.purged_events.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_latest_score(&self, score: u8) {
        *self.latest_score.lock().expect("metrics lock poisoned") = Some(score);
    }

    /// Snapshot of the counter state, without assessment-derived fields.
    pub fn counters(&self) -> AuditMetrics {
        AuditMetrics {
            total_events: self.total_events.load(Ordering::Relaxed),
            events_by_type: self.by_type.lock().expect("metrics lock poisoned").clone(),
            events_by_severity: self.by_severity.lock().expect("metrics lock poisoned").clone(),
            compliance_score: *self.latest_score.lock().expect("metrics lock poisoned"),
            open_findings: 0,
            overdue_actions: 0,
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            forwarding_failures: self.forwarding_failures.load(Ordering::Relaxed),
            purged_events: self.purged_events.load(Ordering::Relaxed),
        }
    }
}

/// Full metrics snapshot: registry counters plus finding and action-item
/// state derived from the stored assessments.
pub struct EngineMetricsSource {
    registry: Arc<MetricsRegistry>,
    assessments: Arc<Mutex<HashMap<String, ComplianceAssessment>>>,
    clock: Arc<dyn Clock>,
}

impl EngineMetricsSource {
    pub fn new(
        registry: Arc<MetricsRegistry>,
        assessments: Arc<Mutex<HashMap<String, ComplianceAssessment>>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            assessments,
            clock,
        }
    }
}

impl MetricsSource for EngineMetricsSource {
    fn snapshot(&self) -> AuditMetrics {
        let mut metrics = self.registry.counters();

        let now = self.clock.now();
        let assessments = self.assessments.lock().expect("assessment map lock poisoned");
        for assessment in assessments.values() {
            metrics.open_findings += assessment
                .findings
                .iter()
                .filter(|f| f.status.is_open())
                .count() as u64;
            metrics.overdue_actions += assessment
                .action_plan
                .iter()
                .filter(|a| a.status != ActionStatus::Completed && a.due_date < now)
                .count() as u64;
        }

        metrics
    }
}
