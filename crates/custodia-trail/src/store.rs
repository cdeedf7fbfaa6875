//! The audit trail store: named partitions of chained events.
//!
//! Each `AuditTrail` owns its events exclusively. Ingestion is idempotent by
//! event id (flush is at-least-once), recomputes the trail checksum, enforces
//! the retention policy and then hands the surviving batch to the forwarding
//! dispatcher. Search is a linear scan, which is acceptable at expected trail
//! sizes; larger deployments would add a secondary index in front of this
//! store rather than inside it.
//!
//! The trails map lock is never held across forwarding delivery, so backoff
//! sleeps in the dispatcher cannot block `log_event` callers probing trail
//! existence.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use custodia_chain::verify_chain;
use custodia_contracts::{
    error::{AuditError, AuditResult},
    event::AuditEvent,
    trail::{AccessControl, ExportFormat, ForwardingRule, RetentionPolicy, SearchFilters, TrailOptions},
};
use custodia_core::traits::{BlobStore, Clock, ForwardingTransport};

use crate::{
    export,
    forward::{DispatchReport, ForwardingDispatcher},
    retention,
};

/// A named, ordered sequence of chained audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrail {
    pub id: String,
    pub name: String,
    pub description: String,

    /// All events in chain order (sequence 0 first).
    pub events: Vec<AuditEvent>,

    /// SHA-256 (hex) over the concatenated event hashes. Recomputed on every
    /// ingestion and purge.
    pub checksum: String,

    pub retention: RetentionPolicy,
    pub forwarding_rules: Vec<ForwardingRule>,
    pub access_controls: Vec<AccessControl>,
    pub legal_hold: bool,

    pub created_at: DateTime<Utc>,
    pub last_ingest: Option<DateTime<Utc>>,
}

/// Counters describing one ingestion pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    /// Events newly appended to the trail.
    pub ingested: usize,
    /// Events skipped because their id was already present.
    pub duplicates: usize,
    /// Events dropped by retention enforcement.
    pub purged: usize,
    pub forwarded: u64,
    pub forwarding_failures: u64,
}

/// Blob key for a persisted trail.
fn trail_key(trail_id: &str) -> String {
    format!("trails/{trail_id}")
}

/// Owns every audit trail and the forwarding dispatcher.
pub struct AuditTrailStore {
    trails: Mutex<HashMap<String, AuditTrail>>,
    clock: Arc<dyn Clock>,
    blobs: Arc<dyn BlobStore>,
    dispatcher: ForwardingDispatcher,
}

impl AuditTrailStore {
    pub fn new(
        clock: Arc<dyn Clock>,
        blobs: Arc<dyn BlobStore>,
        transport: Arc<dyn ForwardingTransport>,
    ) -> Self {
        Self {
            trails: Mutex::new(HashMap::new()),
            clock,
            blobs,
            dispatcher: ForwardingDispatcher::new(transport),
        }
    }

    fn lock_trails(&self) -> AuditResult<std::sync::MutexGuard<'_, HashMap<String, AuditTrail>>> {
        self.trails.lock().map_err(|e| AuditError::PersistenceFailed {
            reason: format!("trail store lock poisoned: {e}"),
        })
    }

    /// Create a new, empty trail.
    ///
    /// Fails with `DuplicateTrail` if the id exists. Retention defaults to
    /// the regulatory policy unless overridden in `options`.
    pub fn create_trail(
        &self,
        id: &str,
        name: &str,
        description: &str,
        options: TrailOptions,
    ) -> AuditResult<()> {
        let mut trails = self.lock_trails()?;
        if trails.contains_key(id) {
            return Err(AuditError::DuplicateTrail { trail_id: id.to_string() });
        }

        let trail = AuditTrail {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            events: Vec::new(),
            checksum: String::new(),
            retention: options.retention.unwrap_or_default(),
            forwarding_rules: options.forwarding_rules,
            access_controls: options.access_controls,
            legal_hold: options.legal_hold,
            created_at: self.clock.now(),
            last_ingest: None,
        };

        info!(trail_id = %id, name = %name, "audit trail created");
        trails.insert(id.to_string(), trail);
        Ok(())
    }

    /// True when a trail with this id exists.
    pub fn contains(&self, trail_id: &str) -> bool {
        self.trails
            .lock()
            .map(|trails| trails.contains_key(trail_id))
            .unwrap_or(false)
    }

    /// All trail ids, for persistence sweeps.
    pub fn trail_ids(&self) -> Vec<String> {
        self.trails
            .lock()
            .map(|trails| trails.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The current checksum of a trail.
    pub fn checksum(&self, trail_id: &str) -> AuditResult<String> {
        let trails = self.lock_trails()?;
        trails
            .get(trail_id)
            .map(|t| t.checksum.clone())
            .ok_or_else(|| AuditError::TrailNotFound { trail_id: trail_id.to_string() })
    }

    /// Ingest a batch into a trail.
    ///
    /// Pipeline: dedupe by id, append, enforce retention, recompute checksum,
    /// persist the trail blob, dispatch forwarding with the surviving new
    /// events. A persistence failure aborts before forwarding so the flush
    /// worker can requeue the batch; the retry dedupes cleanly.
    pub fn ingest(&self, trail_id: &str, batch: Vec<AuditEvent>) -> AuditResult<IngestReport> {
        let mut report = IngestReport::default();

        // Phase 1: mutate the trail under the lock, then snapshot what the
        // unlocked phases need.
        let (trail_bytes, mut rules, new_events) = {
            let mut trails = self.lock_trails()?;
            let trail = trails
                .get_mut(trail_id)
                .ok_or_else(|| AuditError::TrailNotFound { trail_id: trail_id.to_string() })?;

            let existing: HashSet<_> = trail.events.iter().map(|e| e.id.clone()).collect();
            let mut new_ids = HashSet::new();
            let mut accepted = Vec::new();
            for event in batch {
                if existing.contains(&event.id) || !new_ids.insert(event.id.clone()) {
                    report.duplicates += 1;
                } else {
                    accepted.push(event);
                }
            }
            report.ingested = accepted.len();
            trail.events.extend(accepted);

            let now = self.clock.now();
            let events = std::mem::take(&mut trail.events);
            let (kept, purged) = retention::split_expired(events, &trail.retention, trail.legal_hold, now);
            trail.events = kept;
            report.purged = purged.len();
            if trail.retention.archive_expired {
                retention::archive_purged(self.blobs.as_ref(), trail_id, &purged, now)?;
            }

            trail.checksum = compute_checksum(&trail.events);
            trail.last_ingest = Some(now);

            let purged_ids: HashSet<_> = purged.iter().map(|e| e.id.clone()).collect();
            let new_events: Vec<AuditEvent> = trail
                .events
                .iter()
                .filter(|e| new_ids.contains(&e.id) && !purged_ids.contains(&e.id))
                .cloned()
                .collect();

            let trail_bytes = serde_json::to_vec(trail).map_err(|e| {
                AuditError::PersistenceFailed { reason: format!("cannot serialize trail '{trail_id}': {e}") }
            })?;

            (trail_bytes, trail.forwarding_rules.clone(), new_events)
        };

        // Phase 2: persist. Failure here requeues the whole batch upstream.
        self.blobs.put(&trail_key(trail_id), &trail_bytes)?;

        // Phase 3: forward without holding the trails lock, then fold the
        // updated rule counters back in.
        if !new_events.is_empty() && !rules.is_empty() {
            let dispatch: DispatchReport =
                self.dispatcher.dispatch(self.clock.as_ref(), &mut rules, &new_events);
            report.forwarded = dispatch.forwarded;
            report.forwarding_failures = dispatch.failed_attempts;

            let mut trails = self.lock_trails()?;
            if let Some(trail) = trails.get_mut(trail_id) {
                for updated in rules {
                    if let Some(rule) = trail.forwarding_rules.iter_mut().find(|r| r.id == updated.id) {
                        rule.events_forwarded = updated.events_forwarded;
                        rule.failure_count = updated.failure_count;
                        rule.last_forwarded = updated.last_forwarded;
                    }
                }
            }
        }

        debug!(
            trail_id = %trail_id,
            ingested = report.ingested,
            duplicates = report.duplicates,
            purged = report.purged,
            "batch ingested"
        );

        Ok(report)
    }

    /// Search events across trails.
    ///
    /// Filters are conjunctive; a non-empty `query` is a plain substring
    /// match over the serialized event.
    pub fn search(&self, query: &str, filters: &SearchFilters) -> AuditResult<Vec<AuditEvent>> {
        let trails = self.lock_trails()?;
        let mut results = Vec::new();

        for trail in trails.values() {
            if let Some(wanted) = &filters.trail_id {
                if &trail.id != wanted {
                    continue;
                }
            }

            for event in &trail.events {
                if !event_matches(event, filters) {
                    continue;
                }
                if !query.is_empty() {
                    let serialized = serde_json::to_string(event).unwrap_or_default();
                    if !serialized.contains(query) {
                        continue;
                    }
                }
                results.push(event.clone());
            }
        }

        results.sort_by_key(|e| e.timestamp);
        Ok(results)
    }

    /// Export a single trail's (filtered) events in the requested format.
    pub fn export(
        &self,
        trail_id: &str,
        format: ExportFormat,
        filters: &SearchFilters,
    ) -> AuditResult<Vec<u8>> {
        let trails = self.lock_trails()?;
        let trail = trails
            .get(trail_id)
            .ok_or_else(|| AuditError::TrailNotFound { trail_id: trail_id.to_string() })?;

        let selected: Vec<AuditEvent> = trail
            .events
            .iter()
            .filter(|e| event_matches(e, filters))
            .cloned()
            .collect();

        export::render(&selected, format)
    }

    /// Verify a trail's chain: prev-hash linkage and hash correctness for
    /// every event.
    pub fn verify_trail(&self, trail_id: &str) -> AuditResult<bool> {
        let trails = self.lock_trails()?;
        let trail = trails
            .get(trail_id)
            .ok_or_else(|| AuditError::TrailNotFound { trail_id: trail_id.to_string() })?;
        Ok(verify_chain(&trail.events))
    }

    /// Snapshot of a trail's forwarding rules, with their delivery counters.
    pub fn forwarding_rules(&self, trail_id: &str) -> AuditResult<Vec<ForwardingRule>> {
        let trails = self.lock_trails()?;
        trails
            .get(trail_id)
            .map(|t| t.forwarding_rules.clone())
            .ok_or_else(|| AuditError::TrailNotFound { trail_id: trail_id.to_string() })
    }

    /// Persist every trail. Called by the shutdown barrier.
    pub fn persist_all(&self) -> AuditResult<()> {
        let trails = self.lock_trails()?;
        for trail in trails.values() {
            let bytes = serde_json::to_vec(trail).map_err(|e| AuditError::PersistenceFailed {
                reason: format!("cannot serialize trail '{}': {e}", trail.id),
            })?;
            self.blobs.put(&trail_key(&trail.id), &bytes)?;
        }
        Ok(())
    }

    /// Load all persisted trails from the blob store.
    ///
    /// Returns `(trail_id, next_sequence, last_hash)` per trail so the
    /// caller can restore the chain heads. Trails already registered in
    /// memory are not replaced.
    pub fn load_persisted(&self) -> AuditResult<Vec<(String, u64, String)>> {
        let keys = self.blobs.list("trails/")?;
        let mut heads = Vec::new();

        let mut trails = self.lock_trails()?;
        for key in keys {
            let Some(bytes) = self.blobs.get(&key)? else {
                continue;
            };
            let trail: AuditTrail =
                serde_json::from_slice(&bytes).map_err(|e| AuditError::PersistenceFailed {
                    reason: format!("cannot deserialize persisted trail at '{key}': {e}"),
                })?;

            if trails.contains_key(&trail.id) {
                continue;
            }

            if let Some(last) = trail.events.last() {
                heads.push((trail.id.clone(), last.sequence + 1, last.this_hash.clone()));
            }
            info!(trail_id = %trail.id, events = trail.events.len(), "restored persisted trail");
            trails.insert(trail.id.clone(), trail);
        }

        Ok(heads)
    }
}

/// SHA-256 (hex) over the concatenated event hashes.
fn compute_checksum(events: &[AuditEvent]) -> String {
    let mut hasher = Sha256::new();
    for event in events {
        hasher.update(event.this_hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Apply the non-trail filters to one event.
fn event_matches(event: &AuditEvent, filters: &SearchFilters) -> bool {
    if let Some(wanted) = filters.event_type {
        if event.event_type != wanted {
            return false;
        }
    }
    if let Some(wanted) = filters.severity {
        if event.severity != wanted {
            return false;
        }
    }
    if let Some(start) = filters.start {
        if event.timestamp < start {
            return false;
        }
    }
    if let Some(end) = filters.end {
        if event.timestamp > end {
            return false;
        }
    }
    if let Some(actor) = &filters.actor {
        if !event.actor.id.contains(actor.as_str()) {
            return false;
        }
    }
    if let Some(resource) = &filters.resource {
        if !event.resource.id.contains(resource.as_str()) {
            return false;
        }
    }
    true
}
