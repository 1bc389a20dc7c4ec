//! Call-event processing pipeline.
//!
//! One call event goes through: extraction → normalization → idempotency gate
//! → directory lookup → disambiguation → outcome mapping → description →
//! activity write → ledger commit. Every step may stop the pipeline; every stop
//! is reported as a [`ProcessOutcome::Failed`] value, never as a fault.
//!
//! The dedup key is `callId-<customer E.164>-<start time>`, so the gate runs
//! after normalization. Concurrent deliveries of one key are serialized by an
//! in-flight reservation; the ledger entry is written only after the activity
//! write succeeds, so failed events stay retryable.

use chrono::{SecondsFormat, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use crate::directory::ContactDirectory;
use crate::error::ProcessingFailure;
use crate::ledger::DedupLedger;
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{
    ActivityRecord, ActivityType, CallDirection, CallEvent, CallOutcome, Contact, EventResult,
    ProcessOutcome,
};
use crate::phone::{self, NormalizedPhone};

/// Dedup key for an event whose customer number normalized to `customer`.
#[must_use]
pub fn dedup_key(event: &CallEvent, customer: &NormalizedPhone) -> String {
    format!(
        "{}-{}-{}",
        event.call_id,
        customer.e164,
        event.start_time.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Activity description: direction and customer number always, then the
/// business number and the full recording link when known.
#[must_use]
pub fn describe_call(event: &CallEvent, customer: &NormalizedPhone) -> String {
    let direction = event.direction.map_or("Unknown", |d| d.label());
    let mut description = match event.direction {
        Some(CallDirection::Outbound) => {
            format!("{direction} call to {}", customer.e164)
        },
        _ => format!("{direction} call from {}", customer.e164),
    };

    if let Some(business) = phone::extract_business_number(event) {
        let business = phone::normalize(business).map_or_else(|| business.to_string(), |p| p.e164);
        let joiner = match event.direction {
            Some(CallDirection::Outbound) => "from",
            _ => "to",
        };
        description.push_str(&format!(" {joiner} {business}"));
    }

    if let Some(url) = event.recording_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        description.push_str(&format!(" - [Listen to Recording]({url})"));
    }

    description
}

/// Deterministic tie-break: first candidate in directory order.
fn select_contact(candidates: Vec<Contact>, e164: &str) -> Result<Contact, ProcessingFailure> {
    let count = candidates.len();
    let mut candidates = candidates.into_iter();
    let Some(first) = candidates.next() else {
        return Err(ProcessingFailure::ContactNotFound(e164.to_string()));
    };

    if count > 1 {
        let ids: Vec<String> = std::iter::once(&first)
            .chain(candidates.as_slice())
            .map(|c| c.id.clone())
            .collect();
        warn!(
            matches = count,
            candidates = ?ids,
            selected = %first.id,
            "Multiple clients match phone number, using first match"
        );
    }

    Ok(first)
}

/// Removes the in-flight reservation on every exit path.
struct Reservation<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Orchestrates one call event at a time against a contact directory.
pub struct EventProcessor {
    directory: Arc<dyn ContactDirectory>,
    ledger: Arc<dyn DedupLedger>,
    in_flight: Mutex<HashSet<String>>,
    auth_token: String,
    metrics: MetricsCollector,
}

impl EventProcessor {
    /// `auth_token` is copied unmodified into every activity record.
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        ledger: Arc<dyn DedupLedger>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            ledger,
            in_flight: Mutex::new(HashSet::new()),
            auth_token: auth_token.into(),
            metrics: MetricsCollector::default(),
        }
    }

    /// Ledger backing the dedup gate
    pub fn ledger(&self) -> &Arc<dyn DedupLedger> {
        &self.ledger
    }

    /// Number of committed dedup keys
    pub fn ledger_size(&self) -> usize {
        self.ledger.len()
    }

    /// Administrative reset of the dedup ledger
    pub fn clear_ledger(&self) {
        self.ledger.clear();
        self.metrics.update_ledger_size(0);
        info!("Dedup ledger cleared");
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, key: &str) -> Option<Reservation<'_>> {
        if self.in_flight().insert(key.to_string()) {
            Some(Reservation {
                in_flight: &self.in_flight,
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    /// Process one call event. Never fails; failures are in the outcome.
    #[instrument(name = "process_call_event", skip_all, fields(call_id = %event.call_id))]
    pub async fn process_call_event(&self, event: &CallEvent) -> ProcessOutcome {
        let timer = OperationTimer::new("process_call_event");

        let outcome = match self.run(event).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!(reason = failure.code(), error = %failure, "Call event not recorded");
                ProcessOutcome::Failed(failure)
            },
        };

        self.metrics.record_event(&outcome, timer.finish());
        outcome
    }

    /// Process events sequentially; a failure never stops its siblings.
    pub async fn process_batch(&self, events: &[CallEvent]) -> Vec<EventResult> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            let outcome = self.process_call_event(event).await;
            results.push(EventResult {
                call_id: event.call_id.clone(),
                direction: event.direction,
                result: outcome.to_result(),
            });
        }
        results
    }

    async fn run(&self, event: &CallEvent) -> Result<ProcessOutcome, ProcessingFailure> {
        let raw = phone::extract_customer_number(event).ok_or(ProcessingFailure::ExtractionFailed)?;
        let customer = phone::normalize(raw)
            .ok_or_else(|| ProcessingFailure::InvalidPhoneFormat(raw.to_string()))?;
        debug!(raw, e164 = %customer.e164, "Customer phone normalized");

        let key = dedup_key(event, &customer);
        if self.ledger.contains(&key) {
            info!(%key, "Call already processed, skipping");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        let Some(_reservation) = self.reserve(&key) else {
            return Err(ProcessingFailure::DuplicateInFlight(event.call_id.clone()));
        };
        // A concurrent delivery may have committed between the check and the reservation
        if self.ledger.contains(&key) {
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        let candidates = self
            .directory
            .find_by_phone(&customer.e164, &customer.last10)
            .await
            .map_err(|e| ProcessingFailure::LookupFailed(e.to_string()))?;

        let contact = select_contact(candidates, &customer.e164)?;
        let opportunity_id = contact
            .opportunity_id
            .ok_or_else(|| ProcessingFailure::MissingOpportunityId(contact.id.clone()))?;

        let outcome = CallOutcome::from_provider_status(&event.status);
        let record = ActivityRecord {
            opportunity_id,
            occurred_at: Utc::now(),
            activity_type: ActivityType::Call,
            outcome,
            description: describe_call(event, &customer),
            auth_token: self.auth_token.clone(),
        };

        self.directory
            .create_activity(&record)
            .await
            .map_err(|e| ProcessingFailure::WriteFailed(e.to_string()))?;

        self.ledger.insert(&key);
        self.metrics.update_ledger_size(self.ledger.len());
        info!(opportunity_id, %outcome, "Call activity recorded");

        Ok(ProcessOutcome::Recorded {
            opportunity_id,
            outcome,
        })
    }
}
