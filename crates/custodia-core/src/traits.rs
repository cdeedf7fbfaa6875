//! Core trait definitions for the CUSTODIA engine.
//!
//! These traits are the engine's seams to the outside world:
//!
//! - `Clock`               — the only source of wall-clock time
//! - `IdGenerator`         — the only source of event/assessment ids
//! - `BlobStore`           — key-to-blob persistence (an external collaborator)
//! - `ForwardingTransport` — delivery to external audit sinks
//!
//! Every seam is injected at construction. Production code uses the providers
//! in [`crate::providers`]; tests substitute deterministic implementations so
//! hashing, retention and scheduling are reproducible.

use chrono::{DateTime, Utc};

use custodia_contracts::{error::AuditResult, trail::ExportFormat};

/// The engine's only source of time.
///
/// Retention windows, check schedules and report timestamps all read through
/// this trait, which keeps time advanceable under test.
pub trait Clock: Send + Sync {
    /// Current wall-clock time (UTC).
    fn now(&self) -> DateTime<Utc>;
}

/// The engine's only source of unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh, unique id.
    fn next_id(&self) -> uuid::Uuid;
}

/// Key-to-blob persistence.
///
/// The storage mechanism itself is an external collaborator; the engine only
/// assumes atomic whole-blob reads and writes. Keys are slash-separated paths
/// such as `trails/default` or `reports/<id>.json`.
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any previous value.
    fn put(&self, key: &str, bytes: &[u8]) -> AuditResult<()>;

    /// Read the blob under `key`, or `None` if absent.
    fn get(&self, key: &str) -> AuditResult<Option<Vec<u8>>>;

    /// Remove the blob under `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> AuditResult<()>;

    /// All keys starting with `prefix`, in unspecified order.
    fn list(&self, prefix: &str) -> AuditResult<Vec<String>>;
}

/// Delivery of rendered event batches to an external destination.
///
/// Implementations must not retry internally: the dispatcher owns the retry
/// schedule and failure accounting. Returning `Err` marks one failed attempt.
pub trait ForwardingTransport: Send + Sync {
    /// Deliver one rendered batch to `destination`.
    fn deliver(&self, destination: &str, format: ExportFormat, payload: &[u8])
        -> Result<(), String>;
}
