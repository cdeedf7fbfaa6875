//! Error types for the CUSTODIA audit engine.
//!
//! All fallible operations across the CUSTODIA crates return `AuditResult<T>`.
//! Error variants carry enough context to produce actionable log entries.

use thiserror::Error;

/// The unified error type for the CUSTODIA engine.
#[derive(Debug, Error)]
pub enum AuditError {
    /// An operation was called before the service was started.
    ///
    /// Fatal to the call, not to the process. Start the service and retry.
    #[error("audit service is not initialized")]
    NotInitialized,

    /// `create_audit_trail` was called with an id that already exists.
    #[error("audit trail '{trail_id}' already exists")]
    DuplicateTrail { trail_id: String },

    /// The referenced audit trail does not exist.
    #[error("audit trail '{trail_id}' not found")]
    TrailNotFound { trail_id: String },

    /// The referenced compliance assessment does not exist.
    #[error("compliance assessment '{assessment_id}' not found")]
    AssessmentNotFound { assessment_id: String },

    /// The referenced finding does not exist in its assessment.
    #[error("compliance finding '{finding_id}' not found")]
    FindingNotFound { finding_id: String },

    /// Event hash computation failed.
    ///
    /// Fatal to that `log_event` call: the event is never buffered partially
    /// hashed. The caller must retry the whole operation.
    #[error("event hash computation failed: {reason}")]
    HashingFailed { reason: String },

    /// The event signer could not produce a signature.
    #[error("event signing failed: {reason}")]
    SigningFailed { reason: String },

    /// The blob store rejected a read or write.
    ///
    /// During flush this requeues the batch; repeated failures surface as the
    /// `flush_failures` metric rather than crashing the process.
    #[error("persistence failed: {reason}")]
    PersistenceFailed { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// Serialization of an export or report failed.
    #[error("export failed: {reason}")]
    ExportFailed { reason: String },
}

/// Convenience alias used throughout the CUSTODIA crates.
pub type AuditResult<T> = Result<T, AuditError>;
