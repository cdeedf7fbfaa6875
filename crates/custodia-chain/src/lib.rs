//! # custodia-chain
//!
//! Immutable, append-only, SHA-256 hash-chained event stamping for the
//! CUSTODIA audit engine.
//!
//! ## Overview
//!
//! Every event accepted by `log_event` is stamped by the [`HashChainLedger`]:
//! it receives a sequence number, the current chain head as `prev_hash`, and
//! a `this_hash` computed over its canonical content. Tampering with any
//! stamped event, even a single byte, breaks the chain and is detected by
//! [`verify_chain`].
//!
//! Stamped events accumulate in the [`EventBuffer`] until the flush worker
//! drains them into the trail store. Events logged with signing requested are
//! additionally signed by the [`EventSigner`].

pub mod buffer;
pub mod ledger;
pub mod signer;

pub use buffer::EventBuffer;
pub use ledger::{hash_event, verify_chain, HashChainLedger, GENESIS_HASH};
pub use signer::EventSigner;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use custodia_contracts::event::{
        AuditActor, AuditEvent, AuditEventType, AuditResource, EventDetails, EventId, Outcome,
        Severity,
    };

    use super::{verify_chain, EventBuffer, EventSigner, HashChainLedger, GENESIS_HASH};

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Build a minimal unstamped event with a distinguishable action.
    fn make_event(trail_id: &str, action: &str, n: u128) -> AuditEvent {
        AuditEvent {
            id: EventId(uuid::Uuid::from_u128(n)),
            trail_id: trail_id.to_string(),
            sequence: 0,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            event_type: AuditEventType::UserAction,
            severity: Severity::Low,
            actor: AuditActor::user("u1"),
            resource: AuditResource::internal("s1", "stream"),
            action: action.to_string(),
            outcome: Outcome::Success,
            details: EventDetails::Empty,
            context: Default::default(),
            metadata: Default::default(),
            compliance_tags: Vec::new(),
            synthetic: false,
            prev_hash: String::new(),
            this_hash: String::new(),
            signature: None,
        }
    }

    fn stamped(ledger: &HashChainLedger, trail_id: &str, action: &str, n: u128) -> AuditEvent {
        let mut event = make_event(trail_id, action, n);
        ledger.stamp(&mut event).unwrap();
        event
    }

    // ── Ledger ────────────────────────────────────────────────────────────────

    /// Stamping three events produces a valid chain.
    #[test]
    fn test_hash_chain_integrity() {
        let ledger = HashChainLedger::new();
        let events = vec![
            stamped(&ledger, "default", "first", 1),
            stamped(&ledger, "default", "second", 2),
            stamped(&ledger, "default", "third", 3),
        ];

        assert!(verify_chain(&events), "chain must be valid after sequential stamps");
    }

    /// Each event's prev_hash equals the previous event's this_hash.
    #[test]
    fn test_prev_hash_linkage() {
        let ledger = HashChainLedger::new();
        let first = stamped(&ledger, "default", "privacy_setting_changed", 1);
        let second = stamped(&ledger, "default", "privacy_setting_changed", 2);

        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.this_hash);
    }

    /// Mutating any hashed field breaks the chain.
    #[test]
    fn test_tamper_detection() {
        let ledger = HashChainLedger::new();
        let mut events = vec![
            stamped(&ledger, "default", "step-a", 1),
            stamped(&ledger, "default", "step-b", 2),
            stamped(&ledger, "default", "step-c", 3),
        ];

        events[0].action = "TAMPERED".to_string();

        assert!(
            !verify_chain(&events),
            "chain must detect tampering with a stamped event"
        );
    }

    /// A forged linkage (consistent hashes, broken prev pointer) is detected.
    #[test]
    fn test_broken_linkage_detection() {
        let ledger = HashChainLedger::new();
        let mut events = vec![
            stamped(&ledger, "default", "a", 1),
            stamped(&ledger, "default", "b", 2),
        ];

        events[1].prev_hash = GENESIS_HASH.to_string();

        assert!(!verify_chain(&events), "broken prev-hash linkage must fail");
    }

    /// Sequence numbers are 0, 1, 2, ... with no gaps.
    #[test]
    fn test_sequence_monotonic() {
        let ledger = HashChainLedger::new();
        for expected in 0..5u64 {
            let event = stamped(&ledger, "default", "tick", expected as u128 + 1);
            assert_eq!(event.sequence, expected);
        }
    }

    /// Chains in different trails are independent: each starts at genesis and
    /// advances its own head.
    #[test]
    fn test_per_trail_heads_are_independent() {
        let ledger = HashChainLedger::new();
        let a1 = stamped(&ledger, "trail-a", "x", 1);
        let b1 = stamped(&ledger, "trail-b", "x", 2);
        let a2 = stamped(&ledger, "trail-a", "y", 3);

        assert_eq!(a1.prev_hash, GENESIS_HASH);
        assert_eq!(b1.prev_hash, GENESIS_HASH);
        assert_eq!(a2.prev_hash, a1.this_hash);
        assert_eq!(a2.sequence, 1);
        assert_eq!(b1.sequence, 0);
    }

    /// Concurrent stamping never hands out the same prev_hash twice: the
    /// read-hash-advance sequence is a single critical section.
    #[test]
    fn test_concurrent_stamping_is_serialized() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let ledger = Arc::new(HashChainLedger::new());
        let mut handles = Vec::new();
        for t in 0..8u128 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                let mut stamped = Vec::new();
                for i in 0..25u128 {
                    let mut event = make_event("default", "concurrent", t * 1000 + i + 1);
                    ledger.stamp(&mut event).unwrap();
                    stamped.push(event);
                }
                stamped
            }));
        }

        let mut all: Vec<AuditEvent> = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }

        let prev_hashes: HashSet<&str> = all.iter().map(|e| e.prev_hash.as_str()).collect();
        assert_eq!(
            prev_hashes.len(),
            all.len(),
            "every stamped event must claim a distinct prev_hash"
        );

        // Reassembled in sequence order, the chain verifies end to end.
        all.sort_by_key(|e| e.sequence);
        assert!(verify_chain(&all));
    }

    /// Restoring a head continues an existing chain instead of restarting.
    #[test]
    fn test_restore_continues_chain() {
        let ledger = HashChainLedger::new();
        let first = stamped(&ledger, "default", "before-restart", 1);

        let restored = HashChainLedger::new();
        restored.restore("default", 1, first.this_hash.clone());
        let second = stamped(&restored, "default", "after-restart", 2);

        assert_eq!(second.sequence, 1);
        assert_eq!(second.prev_hash, first.this_hash);
        assert!(verify_chain(&[first, second]));
    }

    /// An empty chain is trivially valid.
    #[test]
    fn test_verify_empty() {
        assert!(verify_chain(&[]), "verify_chain on empty slice must return true");
    }

    // ── Buffer ────────────────────────────────────────────────────────────────

    /// Draining returns everything in append order and empties the buffer.
    #[test]
    fn test_buffer_drain_is_atomic() {
        let buffer = EventBuffer::new(100);
        buffer.append(make_event("default", "a", 1));
        buffer.append(make_event("default", "b", 2));
        let len = buffer.append(make_event("default", "c", 3));
        assert_eq!(len, 3);

        let batch = buffer.drain();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].action, "a");
        assert_eq!(batch[2].action, "c");
        assert!(buffer.is_empty());
    }

    /// Draining an empty buffer is a no-op.
    #[test]
    fn test_buffer_empty_drain_is_noop() {
        let buffer = EventBuffer::new(100);
        assert!(buffer.drain().is_empty());
        assert!(buffer.is_empty());
    }

    /// A requeued batch lands ahead of events logged during the failed flush.
    #[test]
    fn test_buffer_requeue_preserves_order() {
        let buffer = EventBuffer::new(100);
        buffer.append(make_event("default", "a", 1));
        buffer.append(make_event("default", "b", 2));

        let failed = buffer.drain();
        buffer.append(make_event("default", "c", 3));
        buffer.requeue_front(failed);

        let batch = buffer.drain();
        let actions: Vec<&str> = batch.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["a", "b", "c"]);
    }

    // ── Signer ────────────────────────────────────────────────────────────────

    /// A signature over an event hash verifies, and fails for any other hash.
    #[test]
    fn test_sign_and_verify_hash() {
        let signer = EventSigner::from_seed([7u8; 32]);
        let ledger = HashChainLedger::new();
        let event = stamped(&ledger, "default", "sensitive", 1);

        let signature = signer.sign_hash(&event.this_hash);
        assert!(signer.verify_hash(&event.this_hash, &signature));
        assert!(!signer.verify_hash(GENESIS_HASH, &signature));
        assert!(!signer.verify_hash(&event.this_hash, "not-hex"));
    }

    /// Seeds round-trip through the hex config form.
    #[test]
    fn test_signer_from_hex() {
        let seed_hex = hex::encode([9u8; 32]);
        let signer = EventSigner::from_hex(&seed_hex).unwrap();
        let signature = signer.sign_hash("abc123");
        assert!(signer.verify_hash("abc123", &signature));

        assert!(EventSigner::from_hex("zz").is_err());
        assert!(EventSigner::from_hex("0011").is_err());
    }
}
