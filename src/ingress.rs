//! Webhook ingress: authentication, payload shape detection and response shaping.
//!
//! The provider delivers either a single "direct" call object (often wrapped in
//! a compact token body) or an `events` array of call-log events. Both are
//! turned into [`CallEvent`]s and handed to the [`EventProcessor`]; the per-event
//! results are shaped into one JSON response. One bad event never fails the
//! whole delivery.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::WebhookConfig;
use crate::metrics::MetricsCollector;
use crate::models::{CallDirection, CallEvent, CallResult, CallTarget};
use crate::processor::EventProcessor;
use crate::signature;

/// Provider signature header
pub const SIGNATURE_HEADER: &str = "x-dialpad-signature";
/// Generic webhook signature header
pub const GENERIC_SIGNATURE_HEADER: &str = "x-signature";
/// Content type of compact-token bodies
pub const JWT_CONTENT_TYPE: &str = "application/jwt";

/// Event types that carry a finished call log
pub const TERMINAL_EVENT_TYPES: [&str; 5] = [
    "call_log.created",
    "call_log.updated",
    "call.completed",
    "call.ended",
    "call_log.ended",
];

/// Reasons a delivery is rejected as a whole
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngressError {
    /// Signature did not verify
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature required but absent
    #[error("Missing signature")]
    MissingSignature,

    /// Body is neither a direct call nor an events array
    #[error("Invalid payload format")]
    InvalidPayload(String),
}

impl IngressError {
    /// HTTP status for this rejection
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::InvalidSignature | Self::MissingSignature => 401,
            Self::InvalidPayload(_) => 400,
        }
    }
}

/// Transport-neutral HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct IngressResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body
    pub body: Value,
}

impl IngressResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

impl From<IngressError> for IngressResponse {
    fn from(err: IngressError) -> Self {
        Self {
            status: err.status(),
            body: json!({ "error": err.to_string() }),
        }
    }
}

/// Whether the body is a bare `header.payload.signature` token
#[must_use]
pub fn is_compact_token(body: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    let text = text.trim();
    text.split('.').count() == 3
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'='))
}

/// Decode a request body into JSON, unwrapping compact-token bodies.
///
/// The token signature is not checked here; see [`authenticate`].
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> Result<Value, IngressError> {
    let is_jwt = content_type.is_some_and(|ct| ct.starts_with(JWT_CONTENT_TYPE)) || is_compact_token(body);

    if is_jwt {
        let text = std::str::from_utf8(body)
            .map_err(|_| IngressError::InvalidPayload("token body is not UTF-8".into()))?;
        let payload = text
            .trim()
            .split('.')
            .nth(1)
            .ok_or_else(|| IngressError::InvalidPayload("token has no payload segment".into()))?;
        let decoded = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| IngressError::InvalidPayload(format!("token payload is not base64url: {e}")))?;
        debug!(bytes = decoded.len(), "Decoded compact token payload");
        return serde_json::from_slice(&decoded)
            .map_err(|e| IngressError::InvalidPayload(format!("token payload is not JSON: {e}")));
    }

    serde_json::from_slice(body).map_err(|e| IngressError::InvalidPayload(e.to_string()))
}

/// Check the provider signature.
///
/// Without a secret or a signature the check is skipped with a warning, unless
/// `require_signature` is set.
pub fn authenticate(
    body: &[u8],
    signature: Option<&str>,
    config: &WebhookConfig,
    metrics: &MetricsCollector,
) -> Result<(), IngressError> {
    let signature = signature.map(str::trim).filter(|s| !s.is_empty());

    match (config.provider_secret(), signature) {
        (Some(secret), Some(signature)) => {
            let scheme = if signature.contains('.') { "compact" } else { "legacy" };
            let valid = signature::verify_provider_signature(body, signature, secret);
            metrics.record_signature_check(scheme, valid);
            if valid {
                Ok(())
            } else {
                warn!(scheme, "Invalid webhook signature");
                Err(IngressError::InvalidSignature)
            }
        },
        _ if config.require_signature => {
            warn!("Webhook signature required but secret or signature missing");
            Err(IngressError::MissingSignature)
        },
        _ => {
            warn!("Missing webhook secret or signature - skipping verification");
            Ok(())
        },
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Epoch milliseconds (number or numeric string) or an RFC 3339 string
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => s.trim().parse::<i64>().map_or_else(
            |_| DateTime::parse_from_rfc3339(s.trim()).ok().map(|dt| dt.with_timezone(&Utc)),
            |ms| Utc.timestamp_millis_opt(ms).single(),
        ),
        _ => None,
    }
}

fn parse_direction(value: Option<&str>) -> Option<CallDirection> {
    match value?.trim().to_lowercase().as_str() {
        "inbound" => Some(CallDirection::Inbound),
        "outbound" => Some(CallDirection::Outbound),
        _ => None,
    }
}

fn first_url(urls: &Value) -> Option<String> {
    let url = match urls {
        Value::Array(items) => items.iter().find_map(Value::as_str),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    };
    url.filter(|s| !s.trim().is_empty()).map(str::to_string)
}

/// Single call object delivered directly (usually inside a token)
#[derive(Debug, Clone, Deserialize)]
pub struct DirectCallPayload {
    /// Provider call id, string or number
    pub call_id: Value,
    /// Call state, e.g. `hangup` or `recording`
    pub state: String,
    /// `inbound` or `outbound`
    #[serde(default)]
    pub direction: Option<String>,
    /// Customer number
    #[serde(default)]
    pub external_number: Option<String>,
    /// Business line
    #[serde(default)]
    pub internal_number: Option<String>,
    /// Epoch milliseconds
    #[serde(default)]
    pub date_started: Value,
    /// Epoch milliseconds; missing means now
    #[serde(default)]
    pub date_ended: Value,
    /// Recording links, first one wins
    #[serde(default)]
    pub recording_url: Value,
    /// Used when `recording_url` is empty
    #[serde(default)]
    pub admin_recording_urls: Value,
    /// Line or user that took the call
    #[serde(default)]
    pub target: Option<CallTarget>,
}

impl DirectCallPayload {
    /// Convert to a call event; `now` stands in for a missing end time.
    pub fn to_call_event(&self, now: DateTime<Utc>) -> Result<CallEvent, String> {
        let call_id = id_string(&self.call_id).ok_or("No call ID found in event")?;
        let start_time = parse_timestamp(&self.date_started)
            .ok_or_else(|| format!("Missing or invalid date_started for call {call_id}"))?;
        let direction = parse_direction(self.direction.as_deref());

        // The external number is the customer side
        let (from_number, to_number) = match direction {
            Some(CallDirection::Outbound) => (self.internal_number.clone(), self.external_number.clone()),
            _ => (self.external_number.clone(), self.internal_number.clone()),
        };

        let status = if self.state.eq_ignore_ascii_case("recording") {
            "answered".to_string()
        } else {
            self.state.clone()
        };

        Ok(CallEvent {
            call_id,
            direction,
            from_number,
            to_number,
            start_time,
            end_time: Some(parse_timestamp(&self.date_ended).unwrap_or(now)),
            status,
            recording_url: first_url(&self.recording_url).or_else(|| first_url(&self.admin_recording_urls)),
            target: self.target.clone(),
        })
    }
}

/// Call log carried by an `events[]` entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallLogData {
    /// Call id, string or number
    #[serde(default)]
    pub call_id: Value,
    /// Used when `call_id` is absent
    #[serde(default)]
    pub id: Value,
    /// `inbound` or `outbound`
    #[serde(default)]
    pub direction: Option<String>,
    /// Caller
    #[serde(default)]
    pub from_number: Option<String>,
    /// Callee
    #[serde(default)]
    pub to_number: Option<String>,
    /// Epoch milliseconds or RFC 3339
    #[serde(default)]
    pub start_time: Value,
    /// Epoch milliseconds or RFC 3339
    #[serde(default)]
    pub end_time: Value,
    /// Provider call status
    #[serde(default)]
    pub status: Option<String>,
    /// Recording link or list of links
    #[serde(default)]
    pub recording_url: Value,
    /// Line or user that took the call
    #[serde(default)]
    pub target: Option<CallTarget>,
}

impl CallLogData {
    /// `call_id`, falling back to `id`
    #[must_use]
    pub fn call_id(&self) -> Option<String> {
        id_string(&self.call_id).or_else(|| id_string(&self.id))
    }

    /// Convert to a call event, or explain why not
    pub fn to_call_event(&self) -> Result<CallEvent, String> {
        let call_id = self.call_id().ok_or("No call ID found in event")?;
        let start_time = parse_timestamp(&self.start_time)
            .ok_or_else(|| format!("Missing or invalid start_time for call {call_id}"))?;

        Ok(CallEvent {
            call_id,
            direction: parse_direction(self.direction.as_deref()),
            from_number: self.from_number.clone(),
            to_number: self.to_number.clone(),
            start_time,
            end_time: parse_timestamp(&self.end_time),
            status: self.status.clone().unwrap_or_default(),
            recording_url: first_url(&self.recording_url),
            target: self.target.clone(),
        })
    }
}

/// One entry of an `events[]` delivery
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// e.g. `call_log.created`
    #[serde(default)]
    pub event_type: String,
    /// Call log, decoded only for terminal types
    #[serde(default)]
    pub data: Value,
}

impl WebhookEvent {
    /// Whether the type carries a finished call log
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        TERMINAL_EVENT_TYPES.contains(&self.event_type.as_str())
    }
}

/// Recognized delivery shapes
#[derive(Debug, Clone)]
pub enum WebhookPayload {
    Direct(DirectCallPayload),
    Events(Vec<WebhookEvent>),
}

/// Detect the delivery shape of a decoded body
pub fn detect_payload(value: Value) -> Result<WebhookPayload, IngressError> {
    let has = |field: &str| value.get(field).is_some_and(|v| !v.is_null());

    if has("call_id") && has("state") {
        return serde_json::from_value(value)
            .map(WebhookPayload::Direct)
            .map_err(|e| IngressError::InvalidPayload(e.to_string()));
    }

    if value.get("events").is_some_and(Value::is_array) {
        #[derive(Deserialize)]
        struct Envelope {
            events: Vec<WebhookEvent>,
        }
        return serde_json::from_value::<Envelope>(value)
            .map(|envelope| WebhookPayload::Events(envelope.events))
            .map_err(|e| IngressError::InvalidPayload(e.to_string()));
    }

    Err(IngressError::InvalidPayload(
        "neither direct call data nor events array".into(),
    ))
}

/// Call id straight from undecoded event data
fn raw_call_id(data: &Value) -> Option<String> {
    id_string(&data["call_id"]).or_else(|| id_string(&data["id"]))
}

fn invalid_event(message: String) -> CallResult {
    CallResult {
        success: false,
        error: Some(format!("INVALID_EVENT_DATA: {message}")),
        message: None,
    }
}

/// Run a decoded delivery through the processor and shape the response.
pub async fn dispatch(processor: &EventProcessor, payload: WebhookPayload) -> IngressResponse {
    match payload {
        WebhookPayload::Direct(call) => {
            info!(state = %call.state, "Processing direct call data");
            let result = match call.to_call_event(Utc::now()) {
                Ok(event) => processor.process_call_event(&event).await.to_result(),
                Err(message) => invalid_event(message),
            };
            IngressResponse::ok(json!({
                "success": true,
                "processed_call": call.call_id,
                "call_state": call.state,
                "call_direction": call.direction,
                "result": result,
            }))
        },
        WebhookPayload::Events(events) => {
            info!(count = events.len(), "Processing events array");
            let mut results = Vec::with_capacity(events.len());

            for event in &events {
                if !event.is_terminal() {
                    debug!(event_type = %event.event_type, "Ignoring event type");
                    results.push(json!({
                        "event_type": event.event_type,
                        "success": true,
                        "message": "Event type not processed",
                    }));
                    continue;
                }

                let decoded = match &event.data {
                    Value::Null => Ok(CallLogData::default()),
                    data => serde_json::from_value::<CallLogData>(data.clone()),
                };
                let (call_id, result) = match decoded {
                    Ok(data) => {
                        let result = match data.to_call_event() {
                            Ok(call) => processor.process_call_event(&call).await.to_result(),
                            Err(message) => invalid_event(message),
                        };
                        (data.call_id(), result)
                    },
                    Err(e) => {
                        warn!(event_type = %event.event_type, error = %e, "Undecodable call log data");
                        (raw_call_id(&event.data), invalid_event(e.to_string()))
                    },
                };

                let mut entry = json!({
                    "event_type": event.event_type,
                    "call_id": call_id,
                });
                if let (Value::Object(entry), Ok(Value::Object(result))) = (&mut entry, serde_json::to_value(&result)) {
                    entry.extend(result);
                }
                results.push(entry);
            }

            IngressResponse::ok(json!({
                "success": true,
                "processed_events": results.len(),
                "results": results,
            }))
        },
    }
}

/// Full provider webhook handling: authenticate, decode, detect, dispatch.
pub async fn handle_provider_webhook(
    processor: &EventProcessor,
    config: &WebhookConfig,
    body: &[u8],
    content_type: Option<&str>,
    signature_header: Option<&str>,
) -> IngressResponse {
    let metrics = MetricsCollector::default();

    // A token body is its own signature when no header was sent
    let body_token = std::str::from_utf8(body).ok().map(str::trim).filter(|_| {
        content_type.is_some_and(|ct| ct.starts_with(JWT_CONTENT_TYPE)) || is_compact_token(body)
    });
    let signature = signature_header.or(body_token);

    if let Err(err) = authenticate(body, signature, config, &metrics) {
        return err.into();
    }

    let payload = match decode_body(body, content_type).and_then(detect_payload) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = ?err, "Rejecting webhook delivery");
            return err.into();
        },
    };

    dispatch(processor, payload).await
}

/// Generic (non-provider) webhook: verify when a secret is configured, then acknowledge.
#[must_use]
pub fn handle_generic_webhook(config: &WebhookConfig, body: &[u8], signature_header: Option<&str>) -> IngressResponse {
    if let (Some(secret), Some(header)) = (config.generic_secret(), signature_header) {
        let valid = signature::verify_generic_signature(body, header, secret);
        MetricsCollector::default().record_signature_check("generic", valid);
        if !valid {
            warn!("Invalid generic webhook signature");
            return IngressError::InvalidSignature.into();
        }
    }

    info!(bytes = body.len(), "Generic webhook received");
    IngressResponse::ok(json!({
        "success": true,
        "message": "Generic webhook received",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
