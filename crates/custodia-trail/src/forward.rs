//! Forwarding of ingested batches to configured external sinks.
//!
//! Each trail owns zero or more `ForwardingRule`s. After every ingestion the
//! dispatcher applies each enabled rule's filter, renders matching events in
//! the rule's format and delivers them through the injected transport,
//! retrying with exponential backoff per the rule's retry policy.
//!
//! Delivery is best-effort: failures are counted on the rule and reported in
//! the `DispatchReport`, and ingestion never sees an error from here. The
//! dispatcher runs on the flush worker, so backoff sleeps never delay
//! `log_event` callers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use custodia_contracts::{
    event::AuditEvent,
    trail::{ForwardingRule, RetryPolicy},
};
use custodia_core::traits::{Clock, ForwardingTransport};

use crate::export;

/// Counters describing one dispatch pass over a batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchReport {
    /// Events delivered across all rules.
    pub forwarded: u64,
    /// Failed delivery attempts across all rules.
    pub failed_attempts: u64,
}

/// Pushes ingested batches through each trail's forwarding rules.
pub struct ForwardingDispatcher {
    transport: Arc<dyn ForwardingTransport>,
}

impl ForwardingDispatcher {
    pub fn new(transport: Arc<dyn ForwardingTransport>) -> Self {
        Self { transport }
    }

    /// Apply every enabled rule to `batch`, mutating the rules' delivery
    /// counters in place.
    pub fn dispatch(
        &self,
        clock: &dyn Clock,
        rules: &mut [ForwardingRule],
        batch: &[AuditEvent],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for rule in rules.iter_mut().filter(|r| r.enabled) {
            let matching: Vec<AuditEvent> = batch
                .iter()
                .filter(|e| rule.filter.matches(e.event_type, e.severity, &e.action))
                .cloned()
                .collect();

            if matching.is_empty() {
                continue;
            }

            debug!(
                rule_id = %rule.id,
                destination = %rule.destination,
                matching = matching.len(),
                "dispatching forwarded batch"
            );

            for chunk in matching.chunks(rule.batch_size.max(1)) {
                let payload = match export::render(chunk, rule.format) {
                    Ok(payload) => payload,
                    Err(e) => {
                        // A rendering failure counts against the rule but can
                        // never fail ingestion.
                        warn!(rule_id = %rule.id, error = %e, "failed to render forwarded batch");
                        rule.failure_count += 1;
                        report.failed_attempts += 1;
                        continue;
                    }
                };

                let attempts_failed = self.deliver_with_retry(rule, &payload);
                rule.failure_count += attempts_failed;
                report.failed_attempts += attempts_failed;

                if attempts_failed < u64::from(rule.retry.max_retries.max(1)) {
                    rule.events_forwarded += chunk.len() as u64;
                    rule.last_forwarded = Some(clock.now());
                    report.forwarded += chunk.len() as u64;
                }
            }
        }

        report
    }

    /// Try to deliver `payload`, retrying per the rule's policy.
    ///
    /// Returns the number of failed attempts: a value equal to `max_retries`
    /// means the payload was never delivered.
    fn deliver_with_retry(&self, rule: &ForwardingRule, payload: &[u8]) -> u64 {
        let RetryPolicy {
            max_retries,
            initial_delay_ms,
            backoff_multiplier,
        } = rule.retry.clone();

        let max_attempts = max_retries.max(1);
        let mut delay_ms = initial_delay_ms;
        let mut failed = 0u64;

        for attempt in 1..=max_attempts {
            match self
                .transport
                .deliver(&rule.destination, rule.format, payload)
            {
                Ok(()) => return failed,
                Err(reason) => {
                    failed += 1;
                    warn!(
                        rule_id = %rule.id,
                        destination = %rule.destination,
                        attempt,
                        max_attempts,
                        reason = %reason,
                        "forwarding delivery failed"
                    );

                    if attempt < max_attempts {
                        std::thread::sleep(Duration::from_millis(delay_ms));
                        delay_ms = ((delay_ms as f64) * backoff_multiplier).round() as u64;
                    }
                }
            }
        }

        failed
    }
}
