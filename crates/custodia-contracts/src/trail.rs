//! Trail-level configuration value objects.
//!
//! Retention windows, forwarding rules and access controls are owned by each
//! `AuditTrail` and applied on every ingestion. The types here are plain
//! serde-derived configuration; the behavior lives in custodia-trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AuditEventType, Severity};

/// Per-event-type retention windows, in days.
///
/// Events older than the window for their type are purged on the next
/// retention pass. A trail under legal hold keeps everything for
/// `legal_hold_days` regardless of type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub security_days: i64,
    pub compliance_days: i64,
    pub system_days: i64,
    pub user_days: i64,
    /// Applied to event types without a dedicated window.
    pub default_days: i64,
    pub legal_hold_days: i64,
    /// When set, purged events are archived to the blob store before being
    /// dropped from the trail.
    pub archive_expired: bool,
}

impl Default for RetentionPolicy {
    /// Regulatory defaults: security and compliance events for 7 years,
    /// system events for 1 year, user events for 2 years, legal hold 10 years.
    fn default() -> Self {
        Self {
            security_days: 2555,
            compliance_days: 2555,
            system_days: 365,
            user_days: 730,
            default_days: 730,
            legal_hold_days: 3650,
            archive_expired: false,
        }
    }
}

impl RetentionPolicy {
    /// The retention window, in days, for an event of the given type.
    pub fn window_days(&self, event_type: AuditEventType) -> i64 {
        match event_type {
            AuditEventType::Security => self.security_days,
            AuditEventType::Compliance => self.compliance_days,
            AuditEventType::System => self.system_days,
            AuditEventType::UserAction => self.user_days,
            _ => self.default_days,
        }
    }
}

/// Permission level granted on a trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

/// A role-to-permission grant on a trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControl {
    pub role: String,
    pub permission: Permission,
}

/// Serialization format for trail exports and forwarded batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
    Xml,
}

impl ExportFormat {
    /// File extension used for export blob keys.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
        }
    }
}

/// Retry schedule for a forwarding destination.
///
/// `max_retries` bounds the total delivery attempts per batch; the delay
/// grows by `backoff_multiplier` after each failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            backoff_multiplier: 2.0,
        }
    }
}

/// Selects which events a forwarding rule relays.
///
/// Empty lists match everything; `min_severity` drops events below the bound.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardingFilter {
    #[serde(default)]
    pub event_types: Vec<AuditEventType>,
    pub min_severity: Option<Severity>,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl ForwardingFilter {
    /// True when an event of the given type, severity and action passes.
    pub fn matches(&self, event_type: AuditEventType, severity: Severity, action: &str) -> bool {
        if !self.event_types.is_empty() && !self.event_types.contains(&event_type) {
            return false;
        }
        if let Some(min) = self.min_severity {
            if severity < min {
                return false;
            }
        }
        if !self.actions.is_empty() && !self.actions.iter().any(|a| a == action) {
            return false;
        }
        true
    }
}

/// A configured external sink for a subset of a trail's events.
///
/// Delivery is best-effort: failures are retried per `retry` and counted,
/// and never block ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub id: String,
    /// Opaque destination handle interpreted by the transport (URL, topic).
    pub destination: String,
    #[serde(default)]
    pub filter: ForwardingFilter,
    pub format: ExportFormat,
    /// Events per delivery attempt.
    pub batch_size: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub enabled: bool,

    /// Total events successfully delivered through this rule.
    #[serde(default)]
    pub events_forwarded: u64,
    /// Total failed delivery attempts.
    #[serde(default)]
    pub failure_count: u64,
    pub last_forwarded: Option<DateTime<Utc>>,
}

/// Options accepted by `create_audit_trail`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrailOptions {
    /// Overrides the default retention policy when set.
    pub retention: Option<RetentionPolicy>,
    #[serde(default)]
    pub forwarding_rules: Vec<ForwardingRule>,
    #[serde(default)]
    pub access_controls: Vec<AccessControl>,
    #[serde(default)]
    pub legal_hold: bool,
}

/// Filters accepted by `search_events` and `export_audit_trail`.
///
/// All fields are conjunctive; `None`/empty means "no constraint". Actor and
/// resource are substring matches against the actor id and resource id.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub trail_id: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub severity: Option<Severity>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub actor: Option<String>,
    pub resource: Option<String>,
}
