//! # custodia-core
//!
//! Trait seams and default providers for the CUSTODIA audit engine.
//!
//! The engine's external dependencies (time, ids, persistence, forwarding
//! delivery) are all expressed as traits here and injected at construction,
//! so every time- or id-dependent behavior is deterministic under test.

pub mod providers;
pub mod traits;

pub use providers::{
    FailingBlobStore, InMemoryBlobStore, ManualClock, NullTransport, SequentialIds, SystemClock,
    UuidIds,
};
pub use traits::{BlobStore, Clock, ForwardingTransport, IdGenerator};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn manual_clock_advances_only_when_told() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), start + Duration::hours(3));
    }

    #[test]
    fn sequential_ids_count_up_from_one() {
        let ids = SequentialIds::default();
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(1));
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(2));
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(3));
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidIds;
        let generated: std::collections::HashSet<uuid::Uuid> =
            (0..100).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 100);
    }

    #[test]
    fn blob_store_put_get_delete_list() {
        let store = InMemoryBlobStore::new();
        store.put("trails/default", b"one").unwrap();
        store.put("trails/security", b"two").unwrap();
        store.put("metrics", b"three").unwrap();

        assert_eq!(store.get("trails/default").unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(store.get("missing").unwrap(), None);

        let mut trails = store.list("trails/").unwrap();
        trails.sort();
        assert_eq!(trails, vec!["trails/default", "trails/security"]);

        store.delete("trails/default").unwrap();
        assert_eq!(store.get("trails/default").unwrap(), None);
        // Deleting an absent key is not an error.
        store.delete("trails/default").unwrap();
    }

    #[test]
    fn failing_blob_store_refuses_writes() {
        let store = FailingBlobStore;
        let err = store.put("trails/default", b"x").unwrap_err();
        assert!(err.to_string().contains("persistence failed"));
    }
}
