//! # custodia-engine
//!
//! The composed CUSTODIA audit service.
//!
//! ## Overview
//!
//! [`AuditService`] is the single entry point callers hold: it owns the hash
//! chain ledger, the event buffer, the trail store, the compliance rule
//! engine, the check executor and the assessment engine, plus the two
//! background workers (buffer flush, check sweep) and the engine metrics.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use custodia_engine::{AuditService, LogOptions};
//!
//! let service = AuditService::builder().build()?;
//! service.start()?;
//!
//! service.log_event(
//!     AuditEventType::UserAction,
//!     "privacy_setting_changed",
//!     AuditActor::user("u1"),
//!     AuditResource::internal("s1", "privacy_setting"),
//!     Outcome::Success,
//!     EventDetails::Empty,
//!     LogOptions::default(),
//! )?;
//!
//! service.shutdown()?;
//! ```

pub mod config;
pub mod metrics;
pub mod service;
pub mod worker;

pub use config::EngineConfig;
pub use metrics::{EngineMetricsSource, MetricsRegistry};
pub use service::{AuditService, AuditServiceBuilder, LogOptions};
pub use worker::WorkerGate;

// ── Tests ─────────────────────────────────────────────────────────────────────
