//! Retention enforcement for audit trails.
//!
//! Applied on every ingestion: events whose age exceeds the policy window
//! for their type are dropped from the trail. A trail under legal hold keeps
//! everything for the legal-hold window instead. Policies that request it
//! archive the purged events to the blob store before dropping them.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use custodia_contracts::{
    error::{AuditError, AuditResult},
    event::AuditEvent,
    trail::RetentionPolicy,
};
use custodia_core::traits::BlobStore;

/// Split `events` into (kept, purged) according to `policy` at `now`.
///
/// Under legal hold the effective window for every type is the larger of the
/// type window and `legal_hold_days`, so a hold can only extend retention.
pub fn split_expired(
    events: Vec<AuditEvent>,
    policy: &RetentionPolicy,
    legal_hold: bool,
    now: DateTime<Utc>,
) -> (Vec<AuditEvent>, Vec<AuditEvent>) {
    let mut kept = Vec::with_capacity(events.len());
    let mut purged = Vec::new();

    for event in events {
        let mut window_days = policy.window_days(event.event_type);
        if legal_hold {
            window_days = window_days.max(policy.legal_hold_days);
        }

        let age = now.signed_duration_since(event.timestamp);
        if age > Duration::days(window_days) {
            purged.push(event);
        } else {
            kept.push(event);
        }
    }

    (kept, purged)
}

/// Write a batch of purged events to the archive area of the blob store.
///
/// Keyed by trail and purge instant so successive purges never overwrite
/// each other.
pub fn archive_purged(
    blobs: &dyn BlobStore,
    trail_id: &str,
    purged: &[AuditEvent],
    now: DateTime<Utc>,
) -> AuditResult<()> {
    if purged.is_empty() {
        return Ok(());
    }

    let key = format!("archive/{trail_id}/{}", now.timestamp_millis());
    let bytes = serde_json::to_vec(purged).map_err(|e| AuditError::PersistenceFailed {
        reason: format!("cannot serialize archive batch: {e}"),
    })?;
    blobs.put(&key, &bytes)?;

    info!(trail_id = %trail_id, archived = purged.len(), key = %key, "archived expired events");
    Ok(())
}
