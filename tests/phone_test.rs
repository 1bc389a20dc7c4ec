//! Phone normalization and customer-number extraction

use call_activity_bridge::models::{CallDirection, CallEvent, CallTarget};
use call_activity_bridge::phone::{equivalent, extract_business_number, extract_customer_number, normalize};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn call(direction: Option<CallDirection>, from: Option<&str>, to: Option<&str>) -> CallEvent {
    CallEvent {
        call_id: "call-1".to_string(),
        direction,
        from_number: from.map(str::to_string),
        to_number: to.map(str::to_string),
        start_time: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        end_time: None,
        status: "answered".to_string(),
        recording_url: None,
        target: None,
    }
}

#[test]
fn test_common_formats_normalize_to_same_e164() {
    for raw in [
        "3135551234",
        "(313) 555-1234",
        "313.555.1234",
        "1-313-555-1234",
        "13135551234",
        "+13135551234",
        "+1 (313) 555-1234",
    ] {
        let normalized = normalize(raw).unwrap_or_else(|| panic!("{raw} should normalize"));
        assert_eq!(normalized.e164, "+13135551234", "input {raw}");
        assert_eq!(normalized.last10, "3135551234");
        assert_eq!(normalized.full_digits, "13135551234");
    }
}

#[test]
fn test_rejected_shapes() {
    for raw in [
        "",
        "   ",
        "555-1234",
        "23135551234",
        "313555123456",
        "+443135551234",
        "+4420555512",
        "+131355512345",
        "not a number",
    ] {
        assert_eq!(normalize(raw), None, "input {raw:?}");
    }
}

#[test]
fn test_equivalence() {
    assert!(equivalent("(313) 555-1234", "+13135551234"));
    assert!(!equivalent("3135551234", "3135551235"));
    assert!(!equivalent("555-1234", "555-1234"));
}

#[test]
fn test_inbound_customer_is_caller() {
    let event = call(Some(CallDirection::Inbound), Some("(313) 555-1234"), Some("8005550100"));
    assert_eq!(extract_customer_number(&event), Some("(313) 555-1234"));
    assert_eq!(extract_business_number(&event), Some("8005550100"));
}

#[test]
fn test_outbound_customer_is_callee() {
    let event = call(Some(CallDirection::Outbound), Some("8005550100"), Some("3135551234"));
    assert_eq!(extract_customer_number(&event), Some("3135551234"));
    assert_eq!(extract_business_number(&event), Some("8005550100"));
}

#[test]
fn test_extraction_fails_without_direction_or_number() {
    assert_eq!(extract_customer_number(&call(None, Some("3135551234"), Some("8005550100"))), None);
    assert_eq!(extract_customer_number(&call(Some(CallDirection::Inbound), None, Some("8005550100"))), None);
    assert_eq!(extract_customer_number(&call(Some(CallDirection::Outbound), Some("8005550100"), Some("  "))), None);
}

#[test]
fn test_business_number_falls_back_to_target() {
    let mut event = call(Some(CallDirection::Inbound), Some("3135551234"), None);
    event.target = Some(CallTarget {
        name: Some("Main Line".to_string()),
        phone: Some("+18005550199".to_string()),
        kind: Some("office".to_string()),
    });
    assert_eq!(extract_business_number(&event), Some("+18005550199"));
}

proptest! {
    #[test]
    fn prop_normalization_is_idempotent(digits in "[2-9][0-9]{9}") {
        let first = normalize(&digits).unwrap();
        let second = normalize(&first.e164).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_formatting_does_not_change_result(digits in "[2-9][0-9]{9}") {
        let formatted = format!("+1 ({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..]);
        prop_assert_eq!(normalize(&formatted), normalize(&digits));
    }

    #[test]
    fn prop_e164_shape(raw in "\\PC{0,20}") {
        if let Some(normalized) = normalize(&raw) {
            prop_assert!(normalized.e164.starts_with("+1"));
            prop_assert_eq!(normalized.e164.len(), 12);
            prop_assert!(normalized.e164[1..].bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
