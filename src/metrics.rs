use anyhow::Result;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::error::ErrorKind;
use crate::models::ProcessOutcome;

/// Metrics collection and management
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // Pipeline metrics
    /// Events by result status
    pub events_processed_total: &'static str,
    /// Pipeline latency
    pub event_processing_duration: &'static str,
    /// Activities by outcome
    pub activities_written_total: &'static str,
    /// Ledger hits
    pub events_deduplicated_total: &'static str,

    // Directory metrics
    /// Lookups and writes by result
    pub directory_operations_total: &'static str,
    /// Directory call latency
    pub directory_operation_duration: &'static str,

    // Ingress metrics
    /// Verifications by result
    pub signature_checks_total: &'static str,
    /// Ledger entries
    pub ledger_size: &'static str,

    // Error metrics
    /// Errors by kind
    pub errors_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            events_processed_total: "call_bridge_events_processed_total",
            event_processing_duration: "call_bridge_event_processing_duration_seconds",
            activities_written_total: "call_bridge_activities_written_total",
            events_deduplicated_total: "call_bridge_events_deduplicated_total",

            directory_operations_total: "call_bridge_directory_operations_total",
            directory_operation_duration: "call_bridge_directory_operation_duration_seconds",

            signature_checks_total: "call_bridge_signature_checks_total",
            ledger_size: "call_bridge_ledger_size",

            errors_total: "call_bridge_errors_total",
        }
    }
}

impl MetricsCollector {
    /// Initialize metrics collection
    pub fn init() -> Result<()> {
        metrics::set_global_recorder(metrics::NoopRecorder)
            .map_err(|e| anyhow::anyhow!("Failed to initialize metrics recorder: {}", e))?;

        Ok(())
    }

    /// Record the outcome of one call event
    pub fn record_event(&self, outcome: &ProcessOutcome, duration: Duration) {
        let status = match outcome {
            ProcessOutcome::Recorded { .. } => "recorded",
            ProcessOutcome::AlreadyProcessed => "already_processed",
            ProcessOutcome::Failed(_) => "failed",
        };

        counter!(self.events_processed_total, "status" => status).increment(1);
        histogram!(self.event_processing_duration, "status" => status)
            .record(duration.as_secs_f64());

        match outcome {
            ProcessOutcome::Recorded { outcome, .. } => {
                counter!(self.activities_written_total, "outcome" => outcome.as_str()).increment(1);
            },
            ProcessOutcome::AlreadyProcessed => {
                counter!(self.events_deduplicated_total).increment(1);
            },
            ProcessOutcome::Failed(failure) => {
                self.record_error(failure.kind(), "process_call_event");
            },
        }
    }

    /// Record a directory round trip
    pub fn record_directory_operation(&self, operation: &'static str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };

        counter!(self.directory_operations_total, "operation" => operation, "status" => status).increment(1);
        histogram!(self.directory_operation_duration, "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Record a webhook signature verification
    pub fn record_signature_check(&self, scheme: &'static str, valid: bool) {
        let result = if valid { "valid" } else { "invalid" };
        counter!(self.signature_checks_total, "scheme" => scheme, "result" => result).increment(1);

        if !valid {
            self.record_error(ErrorKind::AuthFailure, "verify_signature");
        }
    }

    /// Update the dedup ledger size
    pub fn update_ledger_size(&self, size: usize) {
        gauge!(self.ledger_size).set(size as f64);
    }

    /// Record error metrics
    pub fn record_error(&self, kind: ErrorKind, operation: &'static str) {
        counter!(self.errors_total, "type" => kind.as_str(), "operation" => operation).increment(1);
    }
}
