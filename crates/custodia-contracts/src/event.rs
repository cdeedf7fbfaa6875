//! Audit event types.
//!
//! `AuditEvent` is a single entry in a trail's SHA-256 hash chain. It records
//! an action taken by an actor on a resource, wraps a typed details payload,
//! and carries the hashes that make tampering detectable. Events are immutable
//! once stamped: mutating any hashed field invalidates the entire downstream
//! chain.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a single audit event.
///
/// Appears in derived compliance events and forwarding payloads, and is the
/// key for idempotent ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub uuid::Uuid);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The category of an audit event.
///
/// Drives default severity, retention windows and compliance rule
/// applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Security,
    Compliance,
    System,
    UserAction,
    DataAccess,
    Authentication,
}

impl AuditEventType {
    /// Stable name used in metrics keys and rendered exports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Compliance => "compliance",
            Self::System => "system",
            Self::UserAction => "user_action",
            Self::DataAccess => "data_access",
            Self::Authentication => "authentication",
        }
    }
}

/// Event severity, ordered from least to most severe.
///
/// The derived ordering is relied on by forwarding filters
/// (`min_severity`) and finding triage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable name used in metrics keys and rendered exports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// The result of the recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Denied,
}

/// What kind of principal performed the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    User,
    Service,
    System,
}

/// The principal that performed the audited action.
///
/// A descriptive value object with no independent lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditActor {
    /// Stable identifier (user id, service name, "system").
    pub id: String,
    pub kind: ActorKind,
    /// Display name, if known.
    pub name: Option<String>,
    /// Roles held at the time of the action.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Source address for network-originated actions.
    pub ip_address: Option<String>,
}

impl AuditActor {
    /// Shorthand for a plain user actor with no roles or address.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ActorKind::User,
            name: None,
            roles: Vec::new(),
            ip_address: None,
        }
    }

    /// Shorthand for the engine itself acting (derived events, check sweeps).
    pub fn system(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ActorKind::System,
            name: None,
            roles: Vec::new(),
            ip_address: None,
        }
    }
}

/// Sensitivity classification of the resource an action touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// The object the audited action targeted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResource {
    /// Stable identifier (record id, stream id, setting key).
    pub id: String,
    /// Resource category (e.g. "stream", "privacy_setting", "user_profile").
    pub kind: String,
    /// Display name, if known.
    pub name: Option<String>,
    pub classification: DataClassification,
    /// Owning principal, if the resource has one.
    pub owner: Option<String>,
}

impl AuditResource {
    /// Shorthand for an internal resource with only an id and kind.
    pub fn internal(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: None,
            classification: DataClassification::Internal,
            owner: None,
        }
    }
}

/// Typed event payload, keyed by the kind of event being recorded.
///
/// Each variant has a known, checkable shape; `Custom` is the escape hatch
/// for callers whose payload fits no built-in shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetails {
    /// Output of the threat-detection scorer or other security producers.
    Security {
        /// Risk score in [0, 100] as reported by the producer.
        risk_score: u8,
        #[serde(default)]
        indicators: Vec<String>,
        description: String,
    },

    /// A compliance-related occurrence, including engine-derived rule hits.
    Compliance {
        rule_id: String,
        /// The event that triggered the rule, when derived.
        triggering_event: Option<EventId>,
        note: String,
    },

    /// Internal component lifecycle and operational messages.
    System { component: String, message: String },

    /// A user-initiated change, with the touched fields and their new values.
    UserAction {
        description: String,
        #[serde(default)]
        changes: BTreeMap<String, String>,
    },

    /// A read of classified data.
    DataAccess {
        #[serde(default)]
        fields: Vec<String>,
        purpose: String,
    },

    /// Free-form payload for callers outside the built-in shapes.
    Custom(BTreeMap<String, serde_json::Value>),

    /// No payload.
    Empty,
}

/// Request-scoped correlation attached to an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    /// Logical origin of the event (subsystem or client surface).
    pub source: Option<String>,
}

/// A single hash-chained audit record.
///
/// The hash commits to `(id, timestamp, event_type, actor, resource, action,
/// outcome, details, prev_hash)`. Fields outside that set (severity, context,
/// metadata, tags) are descriptive and do not participate in the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,

    /// The trail this event belongs to. Also selects the chain head used to
    /// stamp it.
    pub trail_id: String,

    /// Monotonically increasing position within the trail's chain.
    pub sequence: u64,

    /// Wall-clock time (UTC) the event was created.
    pub timestamp: DateTime<Utc>,

    pub event_type: AuditEventType,
    pub severity: Severity,
    pub actor: AuditActor,
    pub resource: AuditResource,

    /// The action taken (e.g. "privacy_setting_changed", "rule_triggered").
    pub action: String,

    pub outcome: Outcome,
    pub details: EventDetails,

    #[serde(default)]
    pub context: EventContext,

    /// Free-form string annotations. Never hashed.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Compliance framework tags supplied by the caller.
    #[serde(default)]
    pub compliance_tags: Vec<String>,

    /// True for events the engine generated itself (derived compliance
    /// events, check-failure events). Synthetic events are never re-evaluated
    /// by the rule engine.
    #[serde(default)]
    pub synthetic: bool,

    /// SHA-256 hash (hex) of the previous event in this trail's chain, or the
    /// genesis sentinel for the first event.
    pub prev_hash: String,

    /// SHA-256 hash (hex) of this event's canonical content.
    pub this_hash: String,

    /// Hex ed25519 signature over `this_hash`, when signing was requested.
    pub signature: Option<String>,
}
