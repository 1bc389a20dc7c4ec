//! Call Activity Bridge - telephony webhooks to CRM call activities
//!
//! Receives call-event webhooks from a telephony provider, verifies their
//! signatures, finds the CRM contact behind the customer's phone number and
//! records one call activity per distinct call.
//!
//! # Features
//!
//! - Phone normalization to E.164 for lookups and deduplication
//! - Legacy HMAC and compact-token signature verification
//! - Idempotent processing with an in-flight guard for concurrent redeliveries
//! - Live CRM directory over HTTPS and an in-memory directory for tests
//! - HTTP surface with health and administration endpoints

/// Configuration management
pub mod config;
/// Contact directory capability and in-memory implementation
pub mod directory;
/// Live CRM directory
pub mod crm;
/// Error types
pub mod error;
/// Webhook payload handling
pub mod ingress;
/// Dedup ledger
pub mod ledger;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Phone number normalization
pub mod phone;
/// Call event pipeline
pub mod processor;
/// HTTP server
pub mod server;
/// Webhook signatures
pub mod signature;

// Re-export key components for easier access
pub use directory::{ContactDirectory, InMemoryDirectory};
pub use error::{BridgeError, ProcessingFailure};
pub use ledger::{DedupLedger, InMemoryLedger};
pub use models::{CallEvent, Contact, ProcessOutcome};
pub use processor::EventProcessor;
