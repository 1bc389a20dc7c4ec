//! Error types for the call-activity-bridge library.
//!
//! This module provides custom error types using `thiserror`. Pipeline failures
//! are values ([`ProcessingFailure`]) rather than faults: the event processor
//! converts every one of them into a per-event result.

use thiserror::Error;

/// Error taxonomy for call-event handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Webhook signature mismatch (raised by the ingress layer)
    AuthFailure,
    /// Customer-facing number could not be taken from the event
    ExtractionFailure,
    /// Customer-facing number is not a NANP number
    NormalizationFailure,
    /// Directory lookup failed in transport or auth
    LookupTransportFailure,
    /// No contact matched the number
    ContactNotFound,
    /// Matched contact cannot receive an activity
    ContactDataIncomplete,
    /// Activity write failed in transport or auth
    WriteTransportFailure,
    /// Another delivery of the same call holds the reservation
    DuplicateInFlight,
}

impl ErrorKind {
    /// Stable label used for metrics and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailure => "auth_failure",
            Self::ExtractionFailure => "extraction_failure",
            Self::NormalizationFailure => "normalization_failure",
            Self::LookupTransportFailure => "lookup_transport_failure",
            Self::ContactNotFound => "contact_not_found",
            Self::ContactDataIncomplete => "contact_data_incomplete",
            Self::WriteTransportFailure => "write_transport_failure",
            Self::DuplicateInFlight => "duplicate_in_flight",
        }
    }
}

/// Reasons a single call event did not produce an activity.
///
/// The display text always starts with the reason code so the HTTP response
/// stays machine-matchable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingFailure {
    /// Direction missing or the customer-side number empty
    #[error("CUSTOMER_PHONE_EXTRACTION_FAILED: could not extract customer phone number")]
    ExtractionFailed,

    /// Customer number did not normalize
    #[error("INVALID_PHONE_FORMAT: invalid phone number format: {0}")]
    InvalidPhoneFormat(String),

    /// Directory lookup failed
    #[error("DIRECTORY_LOOKUP_FAILED: {0}")]
    LookupFailed(String),

    /// Directory returned no candidates
    #[error("CONTACT_NOT_FOUND: no client found for phone number: {0}")]
    ContactNotFound(String),

    /// Selected contact has no opportunity id
    #[error("CONTACT_MISSING_OPPORTUNITY_ID: client {0} found but missing opportunity ID")]
    MissingOpportunityId(String),

    /// Activity write failed
    #[error("ACTIVITY_WRITE_FAILED: {0}")]
    WriteFailed(String),

    /// Same dedup key is being processed by a concurrent delivery
    #[error("DUPLICATE_IN_FLIGHT: call {0} is already being processed")]
    DuplicateInFlight(String),
}

impl ProcessingFailure {
    /// Reason code reported to the ingress layer
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ExtractionFailed => "CUSTOMER_PHONE_EXTRACTION_FAILED",
            Self::InvalidPhoneFormat(_) => "INVALID_PHONE_FORMAT",
            Self::LookupFailed(_) => "DIRECTORY_LOOKUP_FAILED",
            Self::ContactNotFound(_) => "CONTACT_NOT_FOUND",
            Self::MissingOpportunityId(_) => "CONTACT_MISSING_OPPORTUNITY_ID",
            Self::WriteFailed(_) => "ACTIVITY_WRITE_FAILED",
            Self::DuplicateInFlight(_) => "DUPLICATE_IN_FLIGHT",
        }
    }

    /// Taxonomy bucket of this failure
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ExtractionFailed => ErrorKind::ExtractionFailure,
            Self::InvalidPhoneFormat(_) => ErrorKind::NormalizationFailure,
            Self::LookupFailed(_) => ErrorKind::LookupTransportFailure,
            Self::ContactNotFound(_) => ErrorKind::ContactNotFound,
            Self::MissingOpportunityId(_) => ErrorKind::ContactDataIncomplete,
            Self::WriteFailed(_) => ErrorKind::WriteTransportFailure,
            Self::DuplicateInFlight(_) => ErrorKind::DuplicateInFlight,
        }
    }
}

/// Failures reported by a contact directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// CRM answered with a non-2xx status
    #[error("{message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// CRM-provided message, or `HTTP <status>` when none was given
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Directory refused the operation (test double failure injection)
    #[error("{0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Application-level errors (bootstrap, CLI, configuration).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook payload could not be interpreted
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `BridgeError`
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_starts_with_code() {
        let failures = [
            ProcessingFailure::ExtractionFailed,
            ProcessingFailure::InvalidPhoneFormat("555".into()),
            ProcessingFailure::LookupFailed("timeout".into()),
            ProcessingFailure::ContactNotFound("+13135551234".into()),
            ProcessingFailure::MissingOpportunityId("77".into()),
            ProcessingFailure::WriteFailed("boom".into()),
            ProcessingFailure::DuplicateInFlight("c1".into()),
        ];
        for failure in failures {
            assert!(failure.to_string().starts_with(failure.code()));
        }
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            ProcessingFailure::MissingOpportunityId("1".into()).kind(),
            ErrorKind::ContactDataIncomplete
        );
        assert_eq!(
            ProcessingFailure::InvalidPhoneFormat("x".into()).kind(),
            ErrorKind::NormalizationFailure
        );
    }

    #[test]
    fn test_http_error_display_is_crm_message() {
        let err = DirectoryError::Http {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "Invalid API key");
    }
}
