//! Automated and manual compliance checks.
//!
//! An `AutomatedCheck` is the schedulable unit attached to a compliance
//! rule. Built-in handlers cover the query, log-analysis and
//! metric-threshold check types directly against the trail store and the
//! metrics source; script and API-call checks delegate to named handlers the
//! hosting application registers in a `CheckRegistry`. An unregistered name
//! is a failed check, so misconfigured rules surface immediately.
//!
//! Every execution runs on a helper thread bounded by the check's
//! `timeout_secs`; a check that exceeds its timeout is treated as a failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use custodia_contracts::{
    event::{AuditEventType, Severity},
    metrics::AuditMetrics,
    trail::SearchFilters,
};
use custodia_core::traits::Clock;
use custodia_trail::AuditTrailStore;

/// How an automated check is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Query,
    Script,
    ApiCall,
    LogAnalysis,
    MetricThreshold,
}

/// Failure-severity thresholds for a check.
///
/// When a check fails, the first defined threshold wins, in the order
/// critical, high, medium, low. A check with no thresholds fails at medium.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub critical: Option<f64>,
    pub high: Option<f64>,
    pub medium: Option<f64>,
    pub low: Option<f64>,
}

impl AlertThresholds {
    /// Severity of a finding produced by this check's failure.
    pub fn severity_for_failure(&self) -> Severity {
        if self.critical.is_some() {
            Severity::Critical
        } else if self.high.is_some() {
            Severity::High
        } else if self.medium.is_some() {
            Severity::Medium
        } else if self.low.is_some() {
            Severity::Low
        } else {
            Severity::Medium
        }
    }
}

/// Execution cadence of an automated check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CheckSchedule {
    pub interval_hours: i64,
}

impl Default for CheckSchedule {
    fn default() -> Self {
        Self { interval_hours: 24 }
    }
}

/// A scheduled, programmatic verification tied to a compliance rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatedCheck {
    pub id: String,
    pub name: String,
    pub check_type: CheckType,

    /// For script/api_call checks, the registered handler name. For built-in
    /// types, a descriptive label.
    pub implementation: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub schedule: CheckSchedule,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub alert_thresholds: AlertThresholds,

    #[serde(default = "default_check_enabled")]
    pub enabled: bool,

    pub last_executed: Option<DateTime<Utc>>,
    pub next_execution: DateTime<Utc>,

    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_check_enabled() -> bool {
    true
}

impl AutomatedCheck {
    /// True when this check is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_execution <= now
    }

    /// Record one execution result and advance the schedule.
    pub fn mark_result(&mut self, passed: bool, now: DateTime<Utc>) {
        if passed {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_executed = Some(now);
        self.next_execution = now + Duration::hours(self.schedule.interval_hours.max(1));
    }
}

/// A verification that requires a human, scheduled as an assessment task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualCheck {
    pub id: String,
    pub description: String,
    /// Role expected to perform the check (e.g. "dpo", "security_officer").
    pub assignee_role: String,
}

/// The result of one check execution.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub passed: bool,
    /// The measured value, when the check produces one (match counts,
    /// metric readings).
    pub observed: Option<f64>,
    pub message: String,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            observed: None,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            observed: None,
            message: message.into(),
        }
    }
}

/// A caller-supplied check handler.
///
/// Receives the check's parameters. Returns the outcome, or `Err` with a
/// human-readable reason when the handler itself could not run.
pub type CheckHandlerFn =
    dyn Fn(&BTreeMap<String, String>) -> Result<CheckOutcome, String> + Send + Sync;

/// Named handlers for script and API-call checks.
///
/// Registered at startup by the hosting application; the engine core stays
/// free of deployment-specific integrations.
#[derive(Default)]
pub struct CheckRegistry {
    handlers: HashMap<String, Arc<CheckHandlerFn>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`. Registering the same name twice
    /// replaces the previous handler.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&BTreeMap<String, String>) -> Result<CheckOutcome, String>
            + Send
            + Sync
            + 'static,
    ) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    fn get(&self, name: &str) -> Option<Arc<CheckHandlerFn>> {
        self.handlers.get(name).cloned()
    }
}

/// Read access to the engine's current metric counters.
pub trait MetricsSource: Send + Sync {
    fn snapshot(&self) -> AuditMetrics;
}

/// Executes automated checks against the store, metrics and registry.
pub struct CheckExecutor {
    registry: Arc<CheckRegistry>,
    store: Arc<AuditTrailStore>,
    metrics: Arc<dyn MetricsSource>,
    clock: Arc<dyn Clock>,
}

impl CheckExecutor {
    pub fn new(
        registry: Arc<CheckRegistry>,
        store: Arc<AuditTrailStore>,
        metrics: Arc<dyn MetricsSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            metrics,
            clock,
        }
    }

    /// Execute one check, bounded by its timeout.
    ///
    /// Never returns an error: every failure mode (handler error, missing
    /// handler, timeout, bad parameters) is folded into a failed
    /// `CheckOutcome` so one broken check cannot halt a sweep or an
    /// assessment.
    pub fn execute(&self, check: &AutomatedCheck) -> CheckOutcome {
        debug!(check_id = %check.id, check_type = ?check.check_type, "executing automated check");

        let (tx, rx) = mpsc::channel();
        let task = self.build_task(check);

        std::thread::spawn(move || {
            // The receiver may have timed out and gone; a send failure is fine.
            let _ = tx.send(task());
        });

        match rx.recv_timeout(StdDuration::from_secs(check.timeout_secs.max(1))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(reason)) => {
                warn!(check_id = %check.id, reason = %reason, "check handler failed");
                CheckOutcome::fail(reason)
            }
            Err(_) => {
                warn!(check_id = %check.id, timeout_secs = check.timeout_secs, "check timed out");
                CheckOutcome::fail(format!(
                    "check '{}' timed out after {}s",
                    check.id, check.timeout_secs
                ))
            }
        }
    }

    /// Build the closure that runs on the helper thread.
    fn build_task(
        &self,
        check: &AutomatedCheck,
    ) -> Box<dyn FnOnce() -> Result<CheckOutcome, String> + Send> {
        let params = check.parameters.clone();

        match check.check_type {
            CheckType::Query | CheckType::LogAnalysis => {
                let store = Arc::clone(&self.store);
                let clock = Arc::clone(&self.clock);
                // Query checks assert evidence exists (default min_matches
                // 1); log-analysis checks assert bad patterns do not
                // (default max_matches 0).
                let default_min = if check.check_type == CheckType::Query { 1 } else { 0 };
                let default_max =
                    if check.check_type == CheckType::LogAnalysis { Some(0) } else { None };
                Box::new(move || run_search_check(&store, &clock, &params, default_min, default_max))
            }

            CheckType::MetricThreshold => {
                let metrics = Arc::clone(&self.metrics);
                Box::new(move || run_metric_check(&metrics.snapshot(), &params))
            }

            CheckType::Script | CheckType::ApiCall => {
                let implementation = check.implementation.clone();
                match self.registry.get(&implementation) {
                    Some(handler) => Box::new(move || handler(&params)),
                    None => Box::new(move || {
                        Err(format!(
                            "no check handler registered for implementation '{implementation}'"
                        ))
                    }),
                }
            }
        }
    }
}

/// Shared engine for query and log-analysis checks: count matching events
/// and compare against the configured bounds.
///
/// Recognized parameters: `query` (substring), `trail_id`, `event_type`,
/// `severity`, `window_hours`, `min_matches`, `max_matches`.
fn run_search_check(
    store: &AuditTrailStore,
    clock: &Arc<dyn Clock>,
    params: &BTreeMap<String, String>,
    default_min: u64,
    default_max: Option<u64>,
) -> Result<CheckOutcome, String> {
    let query = params.get("query").map(String::as_str).unwrap_or("");

    let mut filters = SearchFilters {
        trail_id: params.get("trail_id").cloned(),
        ..Default::default()
    };

    if let Some(type_name) = params.get("event_type") {
        filters.event_type = Some(parse_event_type(type_name)?);
    }
    if let Some(severity) = params.get("severity") {
        filters.severity = Some(parse_severity(severity)?);
    }
    if let Some(window) = params.get("window_hours") {
        let hours: i64 = window
            .parse()
            .map_err(|_| format!("invalid window_hours '{window}'"))?;
        filters.start = Some(clock.now() - Duration::hours(hours));
    }

    let min_matches = parse_bound(params, "min_matches")?.unwrap_or(default_min);
    let max_matches = parse_bound(params, "max_matches")?.or(default_max);

    let count = store
        .search(query, &filters)
        .map_err(|e| format!("search failed: {e}"))?
        .len() as u64;

    let passed =
        count >= min_matches && max_matches.map(|max| count <= max).unwrap_or(true);

    Ok(CheckOutcome {
        passed,
        observed: Some(count as f64),
        message: if passed {
            format!("{count} matching events within bounds")
        } else {
            format!(
                "{count} matching events outside bounds (min {min_matches}, max {})",
                max_matches.map(|m| m.to_string()).unwrap_or_else(|| "none".to_string())
            )
        },
    })
}

/// Compare one metric from the snapshot against `max` and/or `min` bounds.
fn run_metric_check(
    metrics: &AuditMetrics,
    params: &BTreeMap<String, String>,
) -> Result<CheckOutcome, String> {
    let metric = params
        .get("metric")
        .ok_or_else(|| "metric_threshold check requires a 'metric' parameter".to_string())?;

    let value = lookup_metric(metrics, metric)
        .ok_or_else(|| format!("unknown metric '{metric}'"))?;

    let max = parse_f64(params, "max")?;
    let min = parse_f64(params, "min")?;
    if max.is_none() && min.is_none() {
        return Err("metric_threshold check requires a 'max' or 'min' parameter".to_string());
    }

    let passed = max.map(|m| value <= m).unwrap_or(true) && min.map(|m| value >= m).unwrap_or(true);

    Ok(CheckOutcome {
        passed,
        observed: Some(value),
        message: format!("metric '{metric}' = {value}"),
    })
}

/// Resolve a metric name against the snapshot.
///
/// Plain counter names resolve directly; `events_by_type.<name>` and
/// `events_by_severity.<name>` index into the keyed counters.
fn lookup_metric(metrics: &AuditMetrics, name: &str) -> Option<f64> {
    if let Some(key) = name.strip_prefix("events_by_type.") {
        return Some(*metrics.events_by_type.get(key).unwrap_or(&0) as f64);
    }
    if let Some(key) = name.strip_prefix("events_by_severity.") {
        return Some(*metrics.events_by_severity.get(key).unwrap_or(&0) as f64);
    }

    match name {
        "total_events" => Some(metrics.total_events as f64),
        "open_findings" => Some(metrics.open_findings as f64),
        "overdue_actions" => Some(metrics.overdue_actions as f64),
        "flush_failures" => Some(metrics.flush_failures as f64),
        "events_forwarded" => Some(metrics.events_forwarded as f64),
        "forwarding_failures" => Some(metrics.forwarding_failures as f64),
        "purged_events" => Some(metrics.purged_events as f64),
        _ => None,
    }
}

fn parse_bound(params: &BTreeMap<String, String>, key: &str) -> Result<Option<u64>, String> {
    params
        .get(key)
        .map(|raw| raw.parse().map_err(|_| format!("invalid {key} '{raw}'")))
        .transpose()
}

fn parse_f64(params: &BTreeMap<String, String>, key: &str) -> Result<Option<f64>, String> {
    params
        .get(key)
        .map(|raw| raw.parse().map_err(|_| format!("invalid {key} '{raw}'")))
        .transpose()
}

fn parse_event_type(name: &str) -> Result<AuditEventType, String> {
    match name {
        "security" => Ok(AuditEventType::Security),
        "compliance" => Ok(AuditEventType::Compliance),
        "system" => Ok(AuditEventType::System),
        "user_action" => Ok(AuditEventType::UserAction),
        "data_access" => Ok(AuditEventType::DataAccess),
        "authentication" => Ok(AuditEventType::Authentication),
        other => Err(format!("unknown event_type '{other}'")),
    }
}

fn parse_severity(name: &str) -> Result<Severity, String> {
    match name {
        "info" => Ok(Severity::Info),
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        "critical" => Ok(Severity::Critical),
        other => Err(format!("unknown severity '{other}'")),
    }
}
