//! The composed audit service.
//!
//! `AuditService` wires the chain ledger, event buffer, trail store, rule
//! engine, check executor and assessment engine together and owns the two
//! background workers (buffer flush, check sweep).
//!
//! The `log_event` pipeline:
//!
//!   build event → stamp (chain mutex) → sign? → count → buffer →
//!   evaluate rules → derived synthetic events re-enter the pipeline
//!
//! Stamping is the single serialization point; buffering and rule
//! evaluation run outside the chain lock. Derived events are flagged
//! synthetic and skip rule evaluation, which bounds the recursion at one
//! level. Flush and sweep run on their own workers and never block
//! `log_event` callers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use tracing::{debug, info, warn};

use custodia_chain::{EventBuffer, EventSigner, HashChainLedger};
use custodia_compliance::{
    sweep_due_checks, AssessmentEngine, CheckExecutor, CheckFailure, CheckRegistry,
    ComplianceAssessment, ComplianceFramework, ComplianceRule, ComplianceRuleEngine,
    FindingStatus, MetricsSource, ReportFormat, RuleSet,
};
use custodia_contracts::{
    error::{AuditError, AuditResult},
    event::{
        AuditActor, AuditEvent, AuditEventType, AuditResource, EventContext, EventDetails,
        EventId, Outcome, Severity,
    },
    metrics::AuditMetrics,
    trail::{ExportFormat, SearchFilters, TrailOptions},
};
use custodia_core::{
    providers::{InMemoryBlobStore, NullTransport, SystemClock, UuidIds},
    traits::{BlobStore, Clock, ForwardingTransport, IdGenerator},
};
use custodia_trail::AuditTrailStore;

use crate::{
    config::EngineConfig,
    metrics::{EngineMetricsSource, MetricsRegistry},
    worker::WorkerGate,
};

const RULES_KEY: &str = "compliance/rules";
const METRICS_KEY: &str = "metrics";

/// Per-call options for `log_event`.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Overrides the type-derived default severity.
    pub severity: Option<Severity>,
    /// Target trail; the configured default trail when absent.
    pub trail_id: Option<String>,
    /// Request an ed25519 signature over the event hash. Fails when the
    /// service has no signing key.
    pub sign: bool,
    pub compliance_tags: Vec<String>,
    pub context: EventContext,
    pub metadata: BTreeMap<String, String>,
}

/// Builder for [`AuditService`].
///
/// Every external seam (clock, ids, blob store, transport, check handlers)
/// is injectable; production defaults are the system clock, random UUIDs, an
/// in-memory blob store and a discarding transport.
pub struct AuditServiceBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    blobs: Arc<dyn BlobStore>,
    transport: Arc<dyn ForwardingTransport>,
    registry: CheckRegistry,
    rules: RuleSet,
}

impl AuditServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIds),
            blobs: Arc::new(InMemoryBlobStore::new()),
            transport: Arc::new(NullTransport),
            registry: CheckRegistry::new(),
            rules: RuleSet::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ForwardingTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Register a named handler for script and API-call checks.
    pub fn register_check_handler(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(
                &BTreeMap<String, String>,
            ) -> Result<custodia_compliance::CheckOutcome, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.registry.register(name, handler);
        self
    }

    /// Assemble the service. It must still be `start()`ed before use.
    pub fn build(self) -> AuditResult<AuditService> {
        let signer = self
            .config
            .signing_key_hex
            .as_deref()
            .map(EventSigner::from_hex)
            .transpose()?;

        let store = Arc::new(AuditTrailStore::new(
            Arc::clone(&self.clock),
            Arc::clone(&self.blobs),
            self.transport,
        ));

        let metrics = Arc::new(MetricsRegistry::new());
        let assessments = Arc::new(Mutex::new(HashMap::new()));
        let metrics_source = Arc::new(EngineMetricsSource::new(
            Arc::clone(&metrics),
            Arc::clone(&assessments),
            Arc::clone(&self.clock),
        ));

        let check_executor = CheckExecutor::new(
            Arc::new(self.registry),
            Arc::clone(&store),
            Arc::clone(&metrics_source) as Arc<dyn MetricsSource>,
            Arc::clone(&self.clock),
        );

        let assessment_engine =
            AssessmentEngine::new(Arc::clone(&self.clock), Arc::clone(&self.ids));

        let buffer = EventBuffer::new(self.config.max_buffer_size);

        let inner = Arc::new(ServiceInner {
            config: self.config,
            clock: self.clock,
            ids: self.ids,
            blobs: self.blobs,
            ledger: HashChainLedger::new(),
            buffer,
            store,
            rule_engine: ComplianceRuleEngine::new(self.rules),
            check_executor,
            assessment_engine,
            assessments,
            metrics,
            metrics_source,
            signer,
            flush_gate: Arc::new(WorkerGate::new()),
            sweep_gate: Arc::new(WorkerGate::new()),
            initialized: AtomicBool::new(false),
        });

        Ok(AuditService {
            inner,
            workers: Mutex::new(Vec::new()),
        })
    }
}

impl Default for AuditServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ServiceInner {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    blobs: Arc<dyn BlobStore>,

    ledger: HashChainLedger,
    buffer: EventBuffer,
    store: Arc<AuditTrailStore>,
    rule_engine: ComplianceRuleEngine,
    check_executor: CheckExecutor,
    assessment_engine: AssessmentEngine,
    assessments: Arc<Mutex<HashMap<String, ComplianceAssessment>>>,
    metrics: Arc<MetricsRegistry>,
    metrics_source: Arc<EngineMetricsSource>,
    signer: Option<EventSigner>,

    flush_gate: Arc<WorkerGate>,
    sweep_gate: Arc<WorkerGate>,
    initialized: AtomicBool,
}

impl ServiceInner {
    fn ensure_initialized(&self) -> AuditResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuditError::NotInitialized)
        }
    }

    /// Stamp, optionally sign, count, buffer and rule-evaluate one event.
    ///
    /// Derived events produced by rule matches re-enter this pipeline with
    /// `synthetic = true`; the rule engine skips synthetic events, so the
    /// recursion is bounded at one level.
    fn log_pipeline(&self, mut event: AuditEvent, sign: bool) -> AuditResult<EventId> {
        // Resolve the signer before stamping: once the chain head advances,
        // the event must be buffered, or the trail would carry a permanent
        // gap.
        let signer = if sign {
            Some(self.signer.as_ref().ok_or_else(|| AuditError::SigningFailed {
                reason: "signing requested but no signing key is configured".to_string(),
            })?)
        } else {
            None
        };

        self.ledger.stamp(&mut event)?;

        if let Some(signer) = signer {
            event.signature = Some(signer.sign_hash(&event.this_hash));
        }

        self.metrics.record_event(event.event_type, event.severity);

        let id = event.id.clone();
        let buffered = self.buffer.append(event.clone());
        if buffered >= self.config.max_buffer_size {
            self.flush_gate.signal();
        }

        for matched in self.rule_engine.evaluate(&event) {
            debug!(
                rule_id = %matched.rule_id,
                triggering_event = %event.id,
                "emitting derived compliance event"
            );
            let derived = AuditEvent {
                id: EventId(self.ids.next_id()),
                trail_id: event.trail_id.clone(),
                sequence: 0,
                timestamp: self.clock.now(),
                event_type: AuditEventType::Compliance,
                severity: matched.priority,
                actor: AuditActor::system("compliance-engine"),
                resource: AuditResource::internal(matched.rule_id.clone(), "compliance_rule"),
                action: "rule_triggered".to_string(),
                outcome: Outcome::Success,
                details: EventDetails::Compliance {
                    rule_id: matched.rule_id.clone(),
                    triggering_event: Some(event.id.clone()),
                    note: matched.requirement.clone(),
                },
                context: EventContext::default(),
                metadata: BTreeMap::new(),
                compliance_tags: Vec::new(),
                synthetic: true,
                prev_hash: String::new(),
                this_hash: String::new(),
                signature: None,
            };

            // One failing rule's derived event must not fail the original
            // log_event call.
            if let Err(e) = self.log_pipeline(derived, false) {
                warn!(rule_id = %matched.rule_id, error = %e, "failed to log derived compliance event");
            }
        }

        Ok(id)
    }

    /// Drain the buffer and ingest each trail's slice of the batch.
    ///
    /// A failed ingestion requeues that slice and bumps the flush-failure
    /// metric; the remaining trails still ingest.
    fn flush_once(&self) {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return;
        }

        let mut by_trail: BTreeMap<String, Vec<AuditEvent>> = BTreeMap::new();
        for event in batch {
            by_trail.entry(event.trail_id.clone()).or_default().push(event);
        }

        for (trail_id, events) in by_trail {
            match self.store.ingest(&trail_id, events.clone()) {
                Ok(report) => {
                    self.metrics.add_purged(report.purged as u64);
                    self.metrics.add_forwarded(report.forwarded);
                    self.metrics.add_forwarding_failures(report.forwarding_failures);
                }
                Err(e) => {
                    warn!(trail_id = %trail_id, error = %e, "flush ingestion failed, requeueing batch");
                    self.metrics.record_flush_failure();
                    self.buffer.requeue_front(events);
                }
            }
        }
    }

    /// Run one check sweep and log each failure as a compliance event.
    fn sweep_once(&self) -> usize {
        let report = sweep_due_checks(&self.rule_engine, &self.check_executor, self.clock.now());

        for failure in &report.failures {
            if let Err(e) = self.log_check_failure(failure) {
                warn!(check_id = %failure.check_id, error = %e, "failed to log check failure");
            }
        }

        report.executed
    }

    fn log_check_failure(&self, failure: &CheckFailure) -> AuditResult<EventId> {
        let event = AuditEvent {
            id: EventId(self.ids.next_id()),
            trail_id: self.config.default_trail.clone(),
            sequence: 0,
            timestamp: self.clock.now(),
            event_type: AuditEventType::Compliance,
            severity: failure.severity,
            actor: AuditActor::system("check-scheduler"),
            resource: AuditResource::internal(failure.check_id.clone(), "automated_check"),
            action: "check_failed".to_string(),
            outcome: Outcome::Failure,
            details: EventDetails::Compliance {
                rule_id: failure.rule_id.clone(),
                triggering_event: None,
                note: format!("{}: {}", failure.check_name, failure.message),
            },
            context: EventContext::default(),
            metadata: BTreeMap::new(),
            compliance_tags: Vec::new(),
            synthetic: true,
            prev_hash: String::new(),
            this_hash: String::new(),
            signature: None,
        };
        self.log_pipeline(event, false)
    }

    fn persist_assessment(&self, assessment: &ComplianceAssessment) -> AuditResult<()> {
        let bytes = serde_json::to_vec(assessment).map_err(|e| AuditError::PersistenceFailed {
            reason: format!("cannot serialize assessment '{}': {e}", assessment.id),
        })?;
        self.blobs.put(&format!("assessments/{}", assessment.id), &bytes)
    }
}

/// The default severity for an event of the given type, used when the
/// caller does not override it.
fn default_severity(event_type: AuditEventType) -> Severity {
    match event_type {
        AuditEventType::Security => Severity::High,
        AuditEventType::Compliance
        | AuditEventType::DataAccess
        | AuditEventType::Authentication => Severity::Medium,
        AuditEventType::System | AuditEventType::UserAction => Severity::Low,
    }
}

/// The tamper-evident audit trail and compliance engine.
///
/// Construct via [`AuditService::builder`], then call [`AuditService::start`]
/// once at process startup; every operation before that fails with
/// `NotInitialized`. Call [`AuditService::shutdown`] to drain and persist
/// before exit.
pub struct AuditService {
    inner: Arc<ServiceInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AuditService {
    pub fn builder() -> AuditServiceBuilder {
        AuditServiceBuilder::new()
    }

    /// Initialize the service: restore persisted state, ensure the default
    /// trail, and start the flush and sweep workers.
    pub fn start(&self) -> AuditResult<()> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Restore persisted trails and continue their chains.
        let heads = self.inner.store.load_persisted()?;
        for (trail_id, next_sequence, last_hash) in heads {
            self.inner.ledger.restore(&trail_id, next_sequence, last_hash);
        }

        if !self.inner.store.contains(&self.inner.config.default_trail) {
            self.inner.store.create_trail(
                &self.inner.config.default_trail,
                "Default audit trail",
                "Events logged without an explicit trail",
                TrailOptions::default(),
            )?;
        }

        // Restore persisted rules unless the builder supplied a rule set.
        if self.inner.rule_engine.snapshot().rules.is_empty() {
            if let Some(bytes) = self.inner.blobs.get(RULES_KEY)? {
                let rules: RuleSet =
                    serde_json::from_slice(&bytes).map_err(|e| AuditError::PersistenceFailed {
                        reason: format!("cannot deserialize persisted rules: {e}"),
                    })?;
                info!(rules = rules.rules.len(), "restored persisted compliance rules");
                self.inner.rule_engine.with_rules_mut(|r| *r = rules);
            }
        }

        self.inner.initialized.store(true, Ordering::SeqCst);

        // Flush worker: interval timeout or early signal from the buffer
        // threshold.
        let flush_inner = Arc::clone(&self.inner);
        let flush_gate = Arc::clone(&self.inner.flush_gate);
        let flush_interval = StdDuration::from_secs(self.inner.config.flush_interval_secs.max(1));
        let flush_handle = std::thread::spawn(move || {
            while flush_gate.wait(flush_interval) {
                flush_inner.flush_once();
            }
            debug!("flush worker stopped");
        });

        // Sweep worker: hourly by default.
        let sweep_inner = Arc::clone(&self.inner);
        let sweep_gate = Arc::clone(&self.inner.sweep_gate);
        let sweep_interval = StdDuration::from_secs(self.inner.config.sweep_interval_secs.max(1));
        let sweep_handle = std::thread::spawn(move || {
            while sweep_gate.wait(sweep_interval) {
                sweep_inner.sweep_once();
            }
            debug!("sweep worker stopped");
        });

        self.workers
            .lock()
            .expect("worker handle lock poisoned")
            .extend([flush_handle, sweep_handle]);

        info!(
            default_trail = %self.inner.config.default_trail,
            flush_interval_secs = self.inner.config.flush_interval_secs,
            sweep_interval_secs = self.inner.config.sweep_interval_secs,
            "audit service started"
        );

        Ok(())
    }

    /// Record one audit event.
    ///
    /// Returns the event id once the event is hashed into its trail's chain
    /// and buffered. A hashing failure means nothing was buffered; the
    /// caller retries the whole call.
    #[allow(clippy::too_many_arguments)]
    pub fn log_event(
        &self,
        event_type: AuditEventType,
        action: &str,
        actor: AuditActor,
        resource: AuditResource,
        outcome: Outcome,
        details: EventDetails,
        options: LogOptions,
    ) -> AuditResult<EventId> {
        self.inner.ensure_initialized()?;

        let trail_id = options
            .trail_id
            .unwrap_or_else(|| self.inner.config.default_trail.clone());
        if !self.inner.store.contains(&trail_id) {
            return Err(AuditError::TrailNotFound { trail_id });
        }

        let event = AuditEvent {
            id: EventId(self.inner.ids.next_id()),
            trail_id,
            sequence: 0,
            timestamp: self.inner.clock.now(),
            event_type,
            severity: options.severity.unwrap_or_else(|| default_severity(event_type)),
            actor,
            resource,
            action: action.to_string(),
            outcome,
            details,
            context: options.context,
            metadata: options.metadata,
            compliance_tags: options.compliance_tags,
            synthetic: false,
            prev_hash: String::new(),
            this_hash: String::new(),
            signature: None,
        };

        self.inner.log_pipeline(event, options.sign)
    }

    /// Create a named audit trail.
    pub fn create_audit_trail(
        &self,
        id: &str,
        name: &str,
        description: &str,
        options: TrailOptions,
    ) -> AuditResult<()> {
        self.inner.ensure_initialized()?;
        self.inner.store.create_trail(id, name, description, options)
    }

    /// Search events across all trails (or one, via the filter).
    pub fn search_events(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> AuditResult<Vec<AuditEvent>> {
        self.inner.ensure_initialized()?;
        self.inner.store.search(query, filters)
    }

    /// Export one trail and return the blob key of the rendered artifact.
    pub fn export_audit_trail(
        &self,
        trail_id: &str,
        format: ExportFormat,
        filters: &SearchFilters,
    ) -> AuditResult<String> {
        self.inner.ensure_initialized()?;
        let rendered = self.inner.store.export(trail_id, format, filters)?;
        let key = format!("exports/{trail_id}.{}", format.extension());
        self.inner.blobs.put(&key, &rendered)?;
        Ok(key)
    }

    /// Verify one trail's hash chain.
    pub fn verify_audit_trail(&self, trail_id: &str) -> AuditResult<bool> {
        self.inner.ensure_initialized()?;
        self.inner.store.verify_trail(trail_id)
    }

    /// Run a framework assessment and return its id.
    pub fn run_compliance_assessment(
        &self,
        framework: ComplianceFramework,
        scope: &str,
        assessor: &str,
    ) -> AuditResult<String> {
        self.inner.ensure_initialized()?;

        let assessment = self.inner.assessment_engine.run(
            framework,
            scope,
            assessor,
            &self.inner.rule_engine,
            &self.inner.check_executor,
        );

        self.inner.metrics.set_latest_score(assessment.score);
        self.inner.persist_assessment(&assessment)?;

        let assessment_id = assessment.id.clone();
        let summary = EventDetails::Custom(BTreeMap::from([
            ("assessment_id".to_string(), serde_json::json!(assessment_id)),
            ("framework".to_string(), serde_json::json!(framework.name())),
            ("score".to_string(), serde_json::json!(assessment.score)),
            ("status".to_string(), serde_json::json!(assessment.status.name())),
        ]));

        self.inner
            .assessments
            .lock()
            .expect("assessment map lock poisoned")
            .insert(assessment_id.clone(), assessment);

        let record = AuditEvent {
            id: EventId(self.inner.ids.next_id()),
            trail_id: self.inner.config.default_trail.clone(),
            sequence: 0,
            timestamp: self.inner.clock.now(),
            event_type: AuditEventType::Compliance,
            severity: Severity::Info,
            actor: AuditActor::user(assessor),
            resource: AuditResource::internal(assessment_id.clone(), "compliance_assessment"),
            action: "assessment_completed".to_string(),
            outcome: Outcome::Success,
            details: summary,
            context: EventContext::default(),
            metadata: BTreeMap::new(),
            compliance_tags: vec![framework.name().to_string()],
            synthetic: true,
            prev_hash: String::new(),
            this_hash: String::new(),
            signature: None,
        };
        if let Err(e) = self.inner.log_pipeline(record, false) {
            warn!(assessment_id = %assessment_id, error = %e, "failed to log assessment record");
        }

        Ok(assessment_id)
    }

    /// A copy of one stored assessment.
    pub fn assessment(&self, assessment_id: &str) -> AuditResult<ComplianceAssessment> {
        self.inner.ensure_initialized()?;
        self.inner
            .assessments
            .lock()
            .expect("assessment map lock poisoned")
            .get(assessment_id)
            .cloned()
            .ok_or_else(|| AuditError::AssessmentNotFound {
                assessment_id: assessment_id.to_string(),
            })
    }

    /// Render a stored assessment and return the blob key of the report.
    pub fn generate_compliance_report(
        &self,
        assessment_id: &str,
        format: ReportFormat,
    ) -> AuditResult<String> {
        self.inner.ensure_initialized()?;

        let assessment = self.assessment(assessment_id)?;
        let rendered = custodia_compliance::render_report(&assessment, format)?;
        let key = format!("reports/{assessment_id}.{}", format.extension());
        self.inner.blobs.put(&key, &rendered)?;
        Ok(key)
    }

    /// Transition one finding's status and return the assessment's new
    /// score. The score and status band are recomputed from the remaining
    /// open findings.
    pub fn update_finding_status(
        &self,
        assessment_id: &str,
        finding_id: &str,
        status: FindingStatus,
    ) -> AuditResult<u8> {
        self.inner.ensure_initialized()?;

        let mut assessments = self
            .inner
            .assessments
            .lock()
            .expect("assessment map lock poisoned");
        let assessment =
            assessments
                .get_mut(assessment_id)
                .ok_or_else(|| AuditError::AssessmentNotFound {
                    assessment_id: assessment_id.to_string(),
                })?;

        let finding = assessment
            .findings
            .iter_mut()
            .find(|f| f.id == finding_id)
            .ok_or_else(|| AuditError::FindingNotFound {
                finding_id: finding_id.to_string(),
            })?;
        finding.status = status;

        assessment.score = custodia_compliance::assessment::score(&assessment.findings);
        assessment.status = custodia_compliance::assessment::status_for(assessment.score);
        let score = assessment.score;

        self.inner.metrics.set_latest_score(score);
        let snapshot = assessment.clone();
        drop(assessments);
        self.inner.persist_assessment(&snapshot)?;

        Ok(score)
    }

    /// Replace or add one compliance rule.
    pub fn upsert_compliance_rule(&self, rule: ComplianceRule) -> AuditResult<()> {
        self.inner.ensure_initialized()?;
        self.inner.rule_engine.upsert_rule(rule);
        Ok(())
    }

    /// Snapshot of the configured rules, including check execution state.
    pub fn compliance_rules(&self) -> AuditResult<RuleSet> {
        self.inner.ensure_initialized()?;
        Ok(self.inner.rule_engine.snapshot())
    }

    /// Current engine metrics.
    pub fn metrics(&self) -> AuditResult<AuditMetrics> {
        self.inner.ensure_initialized()?;
        Ok(self.inner.metrics_source.snapshot())
    }

    /// Drain and ingest the buffer synchronously.
    ///
    /// The flush worker calls the same path on its interval; tests and
    /// shutdown use this to make ingestion deterministic.
    pub fn flush_now(&self) -> AuditResult<()> {
        self.inner.ensure_initialized()?;
        self.inner.flush_once();
        Ok(())
    }

    /// Run one automated-check sweep synchronously; returns the number of
    /// checks executed.
    pub fn sweep_now(&self) -> AuditResult<usize> {
        self.inner.ensure_initialized()?;
        Ok(self.inner.sweep_once())
    }

    /// Drain-and-persist shutdown barrier.
    ///
    /// Stops both workers, flushes the buffer, persists every trail, the
    /// rule set, all assessments and the metrics snapshot, then marks the
    /// service uninitialized. Subsequent calls fail with `NotInitialized`.
    pub fn shutdown(&self) -> AuditResult<()> {
        self.inner.ensure_initialized()?;

        self.inner.flush_gate.stop();
        self.inner.sweep_gate.stop();
        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .expect("worker handle lock poisoned")
            .drain(..)
            .collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("audit worker panicked before shutdown");
            }
        }

        self.inner.flush_once();
        self.inner.store.persist_all()?;

        let rules = self.inner.rule_engine.to_persisted_bytes()?;
        self.inner.blobs.put(RULES_KEY, &rules)?;

        {
            let assessments = self
                .inner
                .assessments
                .lock()
                .expect("assessment map lock poisoned");
            for assessment in assessments.values() {
                self.inner.persist_assessment(assessment)?;
            }
        }

        let metrics = self.inner.metrics_source.snapshot();
        let metrics_bytes =
            serde_json::to_vec(&metrics).map_err(|e| AuditError::PersistenceFailed {
                reason: format!("cannot serialize metrics snapshot: {e}"),
            })?;
        self.inner.blobs.put(METRICS_KEY, &metrics_bytes)?;

        self.inner.initialized.store(false, Ordering::SeqCst);
        info!("audit service stopped");
        Ok(())
    }
}
