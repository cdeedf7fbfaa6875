//! Default and deterministic providers for the core traits.
//!
//! `SystemClock`, `UuidIds` and `InMemoryBlobStore` are the production
//! defaults. `ManualClock` and `SequentialIds` exist so tests can pin time
//! and ids; they live here rather than behind `cfg(test)` because every
//! downstream crate's tests need them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};

use custodia_contracts::error::{AuditError, AuditResult};

use crate::traits::{BlobStore, Clock, IdGenerator};

// ── Clocks ────────────────────────────────────────────────────────────────────

/// The production clock: `Utc::now()`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Start it at a known instant, log events, then `advance` past a retention
/// window or check schedule to make time-driven behavior deterministic.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("manual clock lock poisoned");
        *now = *now + delta;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("manual clock lock poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock lock poisoned")
    }
}

// ── Id generators ─────────────────────────────────────────────────────────────

/// The production id source: random v4 UUIDs.
#[derive(Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> uuid::Uuid {
        uuid::Uuid::new_v4()
    }
}

/// Deterministic ids: 00000000-0000-0000-0000-000000000001, ...000002, and
/// so on. Used by tests that assert on ids or need stable hashes.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> uuid::Uuid {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        uuid::Uuid::from_u128(n as u128)
    }
}

// ── Blob store ────────────────────────────────────────────────────────────────

/// A `HashMap`-backed blob store.
///
/// The reference implementation for tests and the demo binary. Hosts wire a
/// real key-value store in production.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs, for test assertions.
    pub fn len(&self) -> usize {
        self.blobs.lock().expect("blob store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> AuditResult<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| AuditError::PersistenceFailed { reason: format!("blob store lock poisoned: {e}") })?;
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> AuditResult<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| AuditError::PersistenceFailed { reason: format!("blob store lock poisoned: {e}") })?;
        Ok(blobs.get(key).cloned())
    }

    fn delete(&self, key: &str) -> AuditResult<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| AuditError::PersistenceFailed { reason: format!("blob store lock poisoned: {e}") })?;
        blobs.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> AuditResult<Vec<String>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| AuditError::PersistenceFailed { reason: format!("blob store lock poisoned: {e}") })?;
        Ok(blobs.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}

/// A forwarding transport that accepts and discards every delivery.
///
/// The default for deployments with no forwarding rules configured; hosts
/// wire a real transport when trails forward to external sinks.
#[derive(Debug, Default)]
pub struct NullTransport;

impl crate::traits::ForwardingTransport for NullTransport {
    fn deliver(
        &self,
        _destination: &str,
        _format: custodia_contracts::trail::ExportFormat,
        _payload: &[u8],
    ) -> Result<(), String> {
        Ok(())
    }
}

/// A blob store whose writes always fail.
///
/// Exists for tests exercising the requeue-on-persistence-failure path.
#[derive(Debug, Default)]
pub struct FailingBlobStore;

impl BlobStore for FailingBlobStore {
    fn put(&self, key: &str, _bytes: &[u8]) -> AuditResult<()> {
        Err(AuditError::PersistenceFailed { reason: format!("write to '{key}' refused") })
    }

    fn get(&self, _key: &str) -> AuditResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn delete(&self, _key: &str) -> AuditResult<()> {
        Ok(())
    }

    fn list(&self, _prefix: &str) -> AuditResult<Vec<String>> {
        Ok(Vec::new())
    }
}
