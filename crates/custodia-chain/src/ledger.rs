//! Hash-chain primitives: event hashing, chain heads, integrity verification.
//!
//! Every field that contributes to an event's hash is fed to SHA-256
//! explicitly so nothing is accidentally omitted.
//!
//! Hash input layout (bytes, in order):
//!   1. id as 16 raw UUID bytes
//!   2. timestamp as RFC 3339 UTF-8 bytes
//!   3. event type name as UTF-8 bytes
//!   4. canonical JSON of actor
//!   5. canonical JSON of resource
//!   6. action as UTF-8 bytes
//!   7. canonical JSON of outcome
//!   8. canonical JSON of details
//!   9. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!
//! Severity, context, metadata and tags are descriptive and deliberately
//! excluded from the hash.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use custodia_contracts::{
    error::{AuditError, AuditResult},
    event::AuditEvent,
};

/// The sentinel `prev_hash` for the first event in every trail's chain.
///
/// 64 hex zeros, a value that can never be the SHA-256 of real data, making
/// genesis detection unambiguous.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the SHA-256 hash for a single audit event.
///
/// The hash commits to the event's identity, its position via `prev_hash`,
/// and every semantic field of the record. Returns a lowercase 64-character
/// hex string.
///
/// Returns `AuditError::HashingFailed` if any field cannot be serialized;
/// in that case nothing has been mutated and the caller must retry the whole
/// `log_event`.
pub fn hash_event(event: &AuditEvent, prev_hash: &str) -> AuditResult<String> {
    let actor_json = canonical("actor", &event.actor)?;
    let resource_json = canonical("resource", &event.resource)?;
    let outcome_json = canonical("outcome", &event.outcome)?;
    let details_json = canonical("details", &event.details)?;

    let mut hasher = Sha256::new();
    hasher.update(event.id.0.as_bytes());
    hasher.update(event.timestamp.to_rfc3339().as_bytes());
    hasher.update(event.event_type.name().as_bytes());
    hasher.update(&actor_json);
    hasher.update(&resource_json);
    hasher.update(event.action.as_bytes());
    hasher.update(&outcome_json);
    hasher.update(&details_json);
    hasher.update(prev_hash.as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

/// Canonical JSON for one hashed field.
///
/// serde_json::to_vec produces deterministic JSON with no pretty printing;
/// struct fields keep declaration order across calls on the same value.
fn canonical<T: serde::Serialize>(label: &str, value: &T) -> AuditResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AuditError::HashingFailed {
        reason: format!("cannot serialize {label}: {e}"),
    })
}

/// Verify the integrity of one trail's hash chain.
///
/// Returns `true` when both rules hold for every event:
///
/// 1. **Prev-hash linkage** — each event's `prev_hash` equals the `this_hash`
///    of the preceding event (or `GENESIS_HASH` for the first event).
/// 2. **Hash correctness** — each event's `this_hash` matches the value
///    recomputed from its own fields.
///
/// Returns `false` the moment any mismatch is detected. An empty chain is
/// defined as valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut expected_prev = GENESIS_HASH.to_string();

    for event in events {
        if event.prev_hash != expected_prev {
            return false;
        }

        match hash_event(event, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }

        expected_prev = event.this_hash.clone();
    }

    true
}

// ── Chain heads ───────────────────────────────────────────────────────────────

/// The running head of one trail's chain.
struct ChainHead {
    /// The next sequence number to assign.
    sequence: u64,
    /// The `this_hash` of the last stamped event, or `GENESIS_HASH`.
    last_hash: String,
}

/// Maintains the chain head for every trail and stamps events into place.
///
/// # Concurrency
///
/// All heads live behind a single `Mutex`: the read-head, compute-hash,
/// advance-head sequence is one critical section. Two concurrent `log_event`
/// calls can therefore never claim the same `prev_hash`, which would silently
/// corrupt the chain.
#[derive(Default)]
pub struct HashChainLedger {
    heads: Mutex<HashMap<String, ChainHead>>,
}

impl HashChainLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `event` into its trail's chain.
    ///
    /// Assigns `sequence`, `prev_hash` and `this_hash`, then advances the
    /// trail's head. If hashing fails the event and the head are left
    /// untouched.
    pub fn stamp(&self, event: &mut AuditEvent) -> AuditResult<()> {
        let mut heads = self.heads.lock().map_err(|e| AuditError::HashingFailed {
            reason: format!("chain head lock poisoned: {e}"),
        })?;

        let head = heads
            .entry(event.trail_id.clone())
            .or_insert_with(|| ChainHead {
                sequence: 0,
                last_hash: GENESIS_HASH.to_string(),
            });

        // Compute the hash before touching the event or the head, so a
        // serialization failure leaves both exactly as they were.
        let this_hash = hash_event(event, &head.last_hash)?;

        event.sequence = head.sequence;
        event.prev_hash = head.last_hash.clone();
        event.this_hash = this_hash.clone();

        head.sequence += 1;
        head.last_hash = this_hash;

        debug!(
            trail_id = %event.trail_id,
            sequence = event.sequence,
            hash = %event.this_hash,
            "event stamped into chain"
        );

        Ok(())
    }

    /// The current `(next_sequence, last_hash)` for a trail, if any event has
    /// been stamped into it.
    pub fn head(&self, trail_id: &str) -> Option<(u64, String)> {
        let heads = self.heads.lock().expect("chain head lock poisoned");
        heads
            .get(trail_id)
            .map(|h| (h.sequence, h.last_hash.clone()))
    }

    /// Restore a trail's head from persisted state.
    ///
    /// Called when a persisted trail is loaded at startup so new events
    /// continue the existing chain instead of restarting at genesis.
    pub fn restore(&self, trail_id: &str, next_sequence: u64, last_hash: String) {
        let mut heads = self.heads.lock().expect("chain head lock poisoned");
        heads.insert(
            trail_id.to_string(),
            ChainHead {
                sequence: next_sequence,
                last_hash,
            },
        );
    }
}
