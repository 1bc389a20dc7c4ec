//! Webhook ingress: payload shapes, token bodies and signature enforcement

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use call_activity_bridge::config::WebhookConfig;
use call_activity_bridge::directory::InMemoryDirectory;
use call_activity_bridge::ingress::{
    decode_body, detect_payload, handle_generic_webhook, handle_provider_webhook, IngressError, WebhookPayload,
    JWT_CONTENT_TYPE,
};
use call_activity_bridge::ledger::InMemoryLedger;
use call_activity_bridge::models::{CallOutcome, Contact};
use call_activity_bridge::processor::EventProcessor;
use call_activity_bridge::signature::{sign_compact_token, sign_generic, sign_legacy, SignatureAlgorithm};

const SECRET: &str = "dialpad-secret";
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

fn webhook_config(secret: Option<&str>, require_signature: bool) -> WebhookConfig {
    WebhookConfig {
        provider_secret: secret.map(str::to_string),
        generic_secret: secret.map(str::to_string),
        require_signature,
    }
}

fn setup() -> (Arc<InMemoryDirectory>, EventProcessor) {
    let directory = Arc::new(InMemoryDirectory::with_contacts([Contact {
        id: "42".to_string(),
        opportunity_id: Some(42),
        phone: Some("+13135551234".to_string()),
        ..Contact::default()
    }]));
    let processor = EventProcessor::new(directory.clone(), Arc::new(InMemoryLedger::new()), "token");
    (directory, processor)
}

fn started_ms() -> i64 {
    Utc.with_ymd_and_hms(2025, 4, 1, 14, 30, 0).unwrap().timestamp_millis()
}

fn direct_call(direction: &str, state: &str) -> Value {
    json!({
        "call_id": 6_543_210_987_u64,
        "state": state,
        "direction": direction,
        "external_number": "(313) 555-1234",
        "internal_number": "+18005550100",
        "date_started": started_ms(),
        "date_ended": started_ms() + 300_000,
        "recording_url": [],
        "admin_recording_urls": ["https://dialpad.com/admin/r/1"],
        "target": {"name": "Sales", "phone": "+18005550100", "type": "department"}
    })
}

async fn post(processor: &EventProcessor, config: &WebhookConfig, body: &[u8], signature: Option<&str>) -> (u16, Value) {
    let response = handle_provider_webhook(processor, config, body, Some("application/json"), signature).await;
    (response.status, response.body)
}

#[tokio::test]
async fn test_direct_inbound_call_is_processed() {
    let (directory, processor) = setup();
    let body = direct_call("inbound", "hangup").to_string();

    let (status, body) = post(&processor, &webhook_config(None, false), body.as_bytes(), None).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["processed_call"], 6_543_210_987_u64);
    assert_eq!(body["call_state"], "hangup");
    assert_eq!(body["call_direction"], "inbound");
    assert_eq!(body["result"]["success"], true);

    let activities = directory.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(
        activities[0].description,
        "Inbound call from +13135551234 to +18005550100 - [Listen to Recording](https://dialpad.com/admin/r/1)"
    );
}

#[tokio::test]
async fn test_direct_outbound_call_uses_external_as_callee() {
    let (directory, processor) = setup();
    let body = direct_call("outbound", "hangup").to_string();

    let (status, body) = post(&processor, &webhook_config(None, false), body.as_bytes(), None).await;

    assert_eq!(status, 200);
    assert_eq!(body["result"]["success"], true);
    assert!(directory.activities()[0]
        .description
        .starts_with("Outbound call to +13135551234 from +18005550100"));
}

#[tokio::test]
async fn test_recording_state_reports_answered() {
    let (directory, processor) = setup();
    let body = direct_call("inbound", "recording").to_string();

    post(&processor, &webhook_config(None, false), body.as_bytes(), None).await;

    assert_eq!(directory.activities()[0].outcome, CallOutcome::Connected);
}

#[tokio::test]
async fn test_direct_redelivery_reports_already_processed() {
    let (directory, processor) = setup();
    let body = direct_call("inbound", "hangup").to_string();
    let config = webhook_config(None, false);

    post(&processor, &config, body.as_bytes(), None).await;
    let (status, body) = post(&processor, &config, body.as_bytes(), None).await;

    assert_eq!(status, 200);
    assert_eq!(body["result"]["success"], true);
    assert_eq!(body["result"]["message"], "Call already processed");
    assert_eq!(directory.activities().len(), 1);
}

#[tokio::test]
async fn test_direct_call_without_start_time_fails_per_event() {
    let (directory, processor) = setup();
    let mut payload = direct_call("inbound", "hangup");
    payload["date_started"] = Value::Null;

    let (status, body) = post(&processor, &webhook_config(None, false), payload.to_string().as_bytes(), None).await;

    assert_eq!(status, 200);
    assert_eq!(body["result"]["success"], false);
    assert!(body["result"]["error"].as_str().unwrap().starts_with("INVALID_EVENT_DATA"));
    assert!(directory.activities().is_empty());
}

#[tokio::test]
async fn test_events_array_mixes_results() {
    let (directory, processor) = setup();
    let body = json!({
        "events": [
            {
                "event_type": "call_log.created",
                "data": {
                    "id": "cl-1",
                    "direction": "inbound",
                    "from_number": "313.555.1234",
                    "to_number": "+18005550100",
                    "start_time": "2025-04-01T14:30:00Z",
                    "status": "busy"
                }
            },
            {"event_type": "call.ringing", "data": {"call_id": "cl-2"}},
            {"event_type": "call.ended", "data": {"direction": "inbound"}},
            {
                "event_type": "call_log.updated",
                "data": {
                    "call_id": "cl-4",
                    "direction": "outbound",
                    "from_number": "+18005550100",
                    "to_number": "555",
                    "start_time": started_ms()
                }
            }
        ]
    })
    .to_string();

    let (status, body) = post(&processor, &webhook_config(None, false), body.as_bytes(), None).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["processed_events"], 4);
    let results = body["results"].as_array().unwrap();

    assert_eq!(results[0]["event_type"], "call_log.created");
    assert_eq!(results[0]["call_id"], "cl-1");
    assert_eq!(results[0]["success"], true);

    assert_eq!(results[1]["success"], true);
    assert_eq!(results[1]["message"], "Event type not processed");

    assert_eq!(results[2]["success"], false);
    assert!(results[2]["error"].as_str().unwrap().contains("No call ID"));

    assert_eq!(results[3]["success"], false);
    assert!(results[3]["error"].as_str().unwrap().starts_with("INVALID_PHONE_FORMAT"));

    let activities = directory.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].outcome, CallOutcome::Busy);
}

#[tokio::test]
async fn test_malformed_call_log_reports_decode_error() {
    let (directory, processor) = setup();
    let body = json!({
        "events": [
            {"event_type": "call_log.created", "data": {"call_id": "cl-9", "direction": 1}},
            {"event_type": "call.ended", "data": {"id": 77, "from_number": ["+13135551234"]}}
        ]
    })
    .to_string();

    let (status, body) = post(&processor, &webhook_config(None, false), body.as_bytes(), None).await;

    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();

    assert_eq!(results[0]["success"], false);
    assert_eq!(results[0]["call_id"], "cl-9");
    let error = results[0]["error"].as_str().unwrap();
    assert!(error.starts_with("INVALID_EVENT_DATA: "), "{error}");
    assert!(!error.contains("No call ID"), "{error}");

    assert_eq!(results[1]["success"], false);
    assert_eq!(results[1]["call_id"], "77");
    assert!(results[1]["error"].as_str().unwrap().starts_with("INVALID_EVENT_DATA: "));

    assert!(directory.activities().is_empty());
}

#[tokio::test]
async fn test_non_terminal_events_are_acknowledged() {
    let (directory, processor) = setup();
    let body = json!({
        "events": [
            {"event_type": "call.connected", "data": {"call_id": "nt-1"}},
            {"event_type": "call.ringing", "data": {"call_id": "nt-2"}},
            {"event_type": "call.recording", "data": {"call_id": "nt-3", "recording_url": "https://rec"}}
        ]
    })
    .to_string();

    let (status, body) = post(&processor, &webhook_config(None, false), body.as_bytes(), None).await;

    assert_eq!(status, 200);
    assert_eq!(body["processed_events"], 3);
    for result in body["results"].as_array().unwrap() {
        assert_eq!(result["success"], true);
        assert_eq!(result["message"], "Event type not processed");
    }
    assert!(directory.activities().is_empty());
}

#[tokio::test]
async fn test_unrecognized_payload_is_bad_request() {
    let (_, processor) = setup();
    let config = webhook_config(None, false);

    for body in [r#"{"hello":"world"}"#, "not json at all", r#"{"call_id":"1"}"#, r#"{"events":{}}"#] {
        let (status, body) = post(&processor, &config, body.as_bytes(), None).await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({"error": "Invalid payload format"}));
    }
}

#[tokio::test]
async fn test_invalid_legacy_signature_is_unauthorized() {
    let (directory, processor) = setup();
    let config = webhook_config(Some(SECRET), false);
    let body = direct_call("inbound", "hangup").to_string();
    let wrong = sign_legacy(body.as_bytes(), "not-the-secret");

    let (status, response) = post(&processor, &config, body.as_bytes(), Some(&wrong)).await;
    assert_eq!(status, 401);
    assert_eq!(response, json!({"error": "Invalid signature"}));
    assert!(directory.activities().is_empty());

    let right = sign_legacy(body.as_bytes(), SECRET);
    let (status, _) = post(&processor, &config, body.as_bytes(), Some(&right)).await;
    assert_eq!(status, 200);
    assert_eq!(directory.activities().len(), 1);
}

#[tokio::test]
async fn test_missing_signature_is_skipped_unless_required() {
    let (_, processor) = setup();
    let body = direct_call("inbound", "hangup").to_string();

    let (status, _) = post(&processor, &webhook_config(Some(SECRET), false), body.as_bytes(), None).await;
    assert_eq!(status, 200);

    let (status, _) = post(&processor, &webhook_config(Some(SECRET), true), body.as_bytes(), None).await;
    assert_eq!(status, 401);

    let (status, _) = post(&processor, &webhook_config(None, true), body.as_bytes(), Some("abcd")).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_token_body_is_decoded_and_self_signed() {
    let (directory, processor) = setup();
    let config = webhook_config(Some(SECRET), true);
    let token = sign_compact_token(JWT_HEADER, &direct_call("inbound", "hangup").to_string(), SECRET);

    let response = handle_provider_webhook(&processor, &config, token.as_bytes(), Some(JWT_CONTENT_TYPE), None).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["result"]["success"], true);
    assert_eq!(directory.activities().len(), 1);
}

#[tokio::test]
async fn test_token_body_with_wrong_secret_is_rejected() {
    let (directory, processor) = setup();
    let config = webhook_config(Some(SECRET), false);
    let token = sign_compact_token(JWT_HEADER, &direct_call("inbound", "hangup").to_string(), "other");

    let response = handle_provider_webhook(&processor, &config, token.as_bytes(), None, None).await;

    assert_eq!(response.status, 401);
    assert!(directory.activities().is_empty());
}

#[test]
fn test_decode_and_detect_shapes() {
    let token = sign_compact_token(JWT_HEADER, r#"{"events":[]}"#, SECRET);
    let decoded = decode_body(token.as_bytes(), Some(JWT_CONTENT_TYPE)).unwrap();
    assert!(matches!(detect_payload(decoded), Ok(WebhookPayload::Events(events)) if events.is_empty()));

    let direct = decode_body(br#"{"call_id":"a","state":"hangup"}"#, None).unwrap();
    assert!(matches!(detect_payload(direct), Ok(WebhookPayload::Direct(_))));

    assert!(matches!(decode_body(b"a.%%%.c", Some(JWT_CONTENT_TYPE)), Err(IngressError::InvalidPayload(_))));
    assert_eq!(IngressError::InvalidSignature.status(), 401);
    assert_eq!(IngressError::InvalidPayload(String::new()).status(), 400);
}

#[test]
fn test_generic_webhook() {
    let body = br#"{"type":"ping"}"#;

    let open = handle_generic_webhook(&webhook_config(None, false), body, None);
    assert_eq!(open.status, 200);
    assert_eq!(open.body["message"], "Generic webhook received");
    assert!(open.body["timestamp"].is_string());

    let config = webhook_config(Some(SECRET), false);
    let sha1 = sign_generic(body, SECRET, SignatureAlgorithm::Sha1);
    assert_eq!(handle_generic_webhook(&config, body, Some(&sha1)).status, 200);
    let bad = sign_generic(body, "nope", SignatureAlgorithm::Sha256);
    assert_eq!(handle_generic_webhook(&config, body, Some(&bad)).status, 401);
}
