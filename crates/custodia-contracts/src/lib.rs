//! # custodia-contracts
//!
//! Shared types and error contracts for the CUSTODIA audit engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod error;
pub mod event;
pub mod metrics;
pub mod trail;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use error::AuditError;
    use event::{AuditEventType, EventDetails, EventId, Severity};
    use trail::{ForwardingFilter, RetentionPolicy};

    // ── Severity ordering ────────────────────────────────────────────────────

    #[test]
    fn severity_orders_from_info_to_critical() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    // ── RetentionPolicy windows ──────────────────────────────────────────────

    #[test]
    fn retention_windows_match_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.window_days(AuditEventType::Security), 2555);
        assert_eq!(policy.window_days(AuditEventType::Compliance), 2555);
        assert_eq!(policy.window_days(AuditEventType::System), 365);
        assert_eq!(policy.window_days(AuditEventType::UserAction), 730);
        // Types without a dedicated window fall back to the default.
        assert_eq!(policy.window_days(AuditEventType::DataAccess), 730);
        assert_eq!(policy.window_days(AuditEventType::Authentication), 730);
    }

    // ── ForwardingFilter matching ────────────────────────────────────────────

    #[test]
    fn forwarding_filter_empty_matches_everything() {
        let filter = ForwardingFilter::default();
        assert!(filter.matches(AuditEventType::System, Severity::Info, "anything"));
    }

    #[test]
    fn forwarding_filter_min_severity_drops_below_bound() {
        let filter = ForwardingFilter {
            min_severity: Some(Severity::High),
            ..Default::default()
        };
        assert!(!filter.matches(AuditEventType::Security, Severity::Medium, "login"));
        assert!(filter.matches(AuditEventType::Security, Severity::High, "login"));
        assert!(filter.matches(AuditEventType::Security, Severity::Critical, "login"));
    }

    #[test]
    fn forwarding_filter_event_types_and_actions_are_conjunctive() {
        let filter = ForwardingFilter {
            event_types: vec![AuditEventType::Security],
            min_severity: None,
            actions: vec!["login_failed".to_string()],
        };
        assert!(filter.matches(AuditEventType::Security, Severity::Low, "login_failed"));
        assert!(!filter.matches(AuditEventType::System, Severity::Low, "login_failed"));
        assert!(!filter.matches(AuditEventType::Security, Severity::Low, "login_ok"));
    }

    // ── EventDetails serde round-trips ───────────────────────────────────────

    #[test]
    fn event_details_compliance_round_trips() {
        let details = EventDetails::Compliance {
            rule_id: "gdpr-32".to_string(),
            triggering_event: Some(EventId(uuid::Uuid::new_v4())),
            note: "rule matched".to_string(),
        };
        let json = serde_json::to_string(&details).unwrap();
        assert!(json.contains("\"kind\":\"compliance\""));
        let decoded: EventDetails = serde_json::from_str(&json).unwrap();
        match decoded {
            EventDetails::Compliance { rule_id, .. } => assert_eq!(rule_id, "gdpr-32"),
            other => panic!("expected Compliance, got {:?}", other),
        }
    }

    #[test]
    fn event_details_custom_round_trips() {
        let mut map = BTreeMap::new();
        map.insert("plan".to_string(), serde_json::json!("premium"));
        let details = EventDetails::Custom(map);
        let json = serde_json::to_string(&details).unwrap();
        let decoded: EventDetails = serde_json::from_str(&json).unwrap();
        match decoded {
            EventDetails::Custom(m) => assert_eq!(m["plan"], serde_json::json!("premium")),
            other => panic!("expected Custom, got {:?}", other),
        }
    }

    // ── Error display messages ───────────────────────────────────────────────

    #[test]
    fn error_duplicate_trail_display() {
        let err = AuditError::DuplicateTrail {
            trail_id: "default".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("already exists"));
        assert!(msg.contains("default"));
    }

    #[test]
    fn error_trail_not_found_display() {
        let err = AuditError::TrailNotFound {
            trail_id: "missing".to_string(),
        };
        assert!(err.to_string().contains("'missing' not found"));
    }

    #[test]
    fn error_assessment_not_found_display() {
        let err = AuditError::AssessmentNotFound {
            assessment_id: "a-1".to_string(),
        };
        assert!(err.to_string().contains("'a-1' not found"));
    }

    #[test]
    fn error_not_initialized_display() {
        assert!(AuditError::NotInitialized
            .to_string()
            .contains("not initialized"));
    }
}
