//! Data models for call events, contacts and CRM activities
//!
//! This module contains the data structures that flow through the call-event
//! pipeline, from the parsed provider event to the activity written in the CRM.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProcessingFailure;

/// Which side placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Customer called the business
    Inbound,
    /// Business called the customer
    Outbound,
}

impl CallDirection {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Capitalized label used in activity descriptions
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
        }
    }
}

/// Secondary number metadata attached by the provider (line, department, user)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTarget {
    /// Target display name
    #[serde(default)]
    pub name: Option<String>,
    /// Target phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Target type (office, department, user, ...)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// One call as reported by the telephony provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    /// Opaque provider identifier
    pub call_id: String,
    /// Call direction; absence is an extraction failure
    #[serde(default)]
    pub direction: Option<CallDirection>,
    /// Calling number, any common formatting
    #[serde(default)]
    pub from_number: Option<String>,
    /// Called number, any common formatting
    #[serde(default)]
    pub to_number: Option<String>,
    /// When the call started
    pub start_time: DateTime<Utc>,
    /// When the call ended
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Provider-specific terminal state
    pub status: String,
    /// Full recording link, if recorded
    #[serde(default)]
    pub recording_url: Option<String>,
    /// Secondary number metadata
    #[serde(default)]
    pub target: Option<CallTarget>,
}

/// A CRM contact as returned by a directory lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// CRM identifier
    pub id: String,
    /// Opportunity the activity attaches to
    #[serde(default)]
    pub opportunity_id: Option<u64>,
    /// First name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number as stored in the CRM
    #[serde(default)]
    pub phone: Option<String>,
    /// Company name
    #[serde(default)]
    pub company: Option<String>,
    /// Street address
    #[serde(default)]
    pub address: Option<String>,
    /// City
    #[serde(default)]
    pub city: Option<String>,
    /// State or province
    #[serde(default)]
    pub state: Option<String>,
    /// Postal code
    #[serde(default)]
    pub zip: Option<String>,
}

impl Contact {
    /// Full display name, if any part is known
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Kind of CRM activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    /// Phone call; the only type this pipeline writes
    Call,
}

/// CRM call outcome enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallOutcome {
    /// Nobody picked up
    NoAnswer,
    /// Line busy
    Busy,
    /// Call failed to reach the right party
    WrongNumber,
    /// Message left with a person
    LeftLiveMessage,
    /// Voicemail left or reached
    LeftVoicemail,
    /// Conversation happened
    Connected,
}

impl CallOutcome {
    /// Map a provider status string (case-insensitive) to a CRM outcome.
    ///
    /// Unknown statuses map to [`CallOutcome::Connected`].
    #[must_use]
    pub fn from_provider_status(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "answered" | "connected" | "recording" | "ringing" => Self::Connected,
            "no_answer" | "no-answer" | "voicemail" => Self::LeftVoicemail,
            "busy" => Self::Busy,
            "failed" => Self::WrongNumber,
            _ => Self::Connected,
        }
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoAnswer => "NO_ANSWER",
            Self::Busy => "BUSY",
            Self::WrongNumber => "WRONG_NUMBER",
            Self::LeftLiveMessage => "LEFT_LIVE_MESSAGE",
            Self::LeftVoicemail => "LEFT_VOICEMAIL",
            Self::Connected => "CONNECTED",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The activity written against a contact's opportunity
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Opportunity the activity belongs to
    pub opportunity_id: u64,
    /// When the activity was logged (processing time, not call time)
    pub occurred_at: DateTime<Utc>,
    /// Always [`ActivityType::Call`]
    pub activity_type: ActivityType,
    /// Mapped call outcome
    pub outcome: CallOutcome,
    /// Human-readable summary
    pub description: String,
    /// Shared secret required by the CRM write API, passed through unmodified
    pub auth_token: String,
}

impl fmt::Debug for ActivityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRecord")
            .field("opportunity_id", &self.opportunity_id)
            .field("occurred_at", &self.occurred_at)
            .field("activity_type", &self.activity_type)
            .field("outcome", &self.outcome)
            .field("description", &self.description)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Result of pushing one call event through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Activity written
    Recorded {
        /// Opportunity that received the activity
        opportunity_id: u64,
        /// Outcome that was written
        outcome: CallOutcome,
    },
    /// Dedup key already in the ledger; nothing written
    AlreadyProcessed,
    /// Pipeline stopped early
    Failed(ProcessingFailure),
}

impl ProcessOutcome {
    /// Marker message for idempotent re-deliveries
    pub const ALREADY_PROCESSED: &'static str = "Call already processed";

    /// Whether the caller should treat the event as handled
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Failure, if any
    #[must_use]
    pub const fn failure(&self) -> Option<&ProcessingFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Wire-friendly `{success, error?, message?}` view
    #[must_use]
    pub fn to_result(&self) -> CallResult {
        match self {
            Self::Recorded { .. } => CallResult {
                success: true,
                error: None,
                message: None,
            },
            Self::AlreadyProcessed => CallResult {
                success: true,
                error: None,
                message: Some(Self::ALREADY_PROCESSED.to_string()),
            },
            Self::Failed(failure) => CallResult {
                success: false,
                error: Some(failure.to_string()),
                message: None,
            },
        }
    }
}

/// `{success, error?, message?}` shape returned to the ingress layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// Whether the event is handled
    pub success: bool,
    /// Failure description, starting with the reason code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Informational note (e.g. already processed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-event result of a batch, annotated for correlation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResult {
    /// Provider call id of the event
    pub call_id: String,
    /// Direction of the event, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<CallDirection>,
    /// Outcome of processing
    #[serde(flatten)]
    pub result: CallResult,
}
