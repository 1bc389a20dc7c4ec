//! Phone number normalization for NANP (US/Canada) numbers.
//!
//! Raw provider and CRM numbers come in any common formatting
//! (`(313) 555-1234`, `1-313-555-1234`, `+13135551234`). Everything is reduced
//! to one of three accepted shapes and then to a canonical E.164 form. Any
//! other shape, including every non-`+1` international number, is rejected.

use serde::{Deserialize, Serialize};

use crate::models::{CallDirection, CallEvent};

/// Canonical forms of one NANP subscriber number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedPhone {
    /// `+1` followed by the 10-digit subscriber number
    pub e164: String,
    /// The 10-digit subscriber number
    pub last10: String,
    /// Digits with the leading country code, no `+`
    pub full_digits: String,
}

/// Keep digits, and a `+` only when it is the first kept character.
fn clean(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_digit() || (c == '+' && cleaned.is_empty()) {
            cleaned.push(c);
        }
    }
    cleaned
}

/// Normalize a raw phone string.
///
/// Accepted shapes after cleaning:
///
/// * `+1XXXXXXXXXX` (already E.164)
/// * `1XXXXXXXXXX` (country-code prefixed, 11 digits)
/// * `XXXXXXXXXX` (bare 10 digits)
///
/// Returns `None` for anything else.
#[must_use]
pub fn normalize(raw: &str) -> Option<NormalizedPhone> {
    let cleaned = clean(raw);

    let last10 = if let Some(rest) = cleaned.strip_prefix("+1") {
        rest
    } else if cleaned.len() == 11 && cleaned.starts_with('1') {
        &cleaned[1..]
    } else if cleaned.len() == 10 {
        cleaned.as_str()
    } else {
        return None;
    };

    // Non-US shapes can slip past the length branches (e.g. `+1` with 11 digits)
    if last10.len() != 10 || !last10.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(NormalizedPhone {
        e164: format!("+1{last10}"),
        last10: last10.to_string(),
        full_digits: format!("1{last10}"),
    })
}

/// Customer-facing number of a call: the caller for inbound calls, the callee
/// for outbound calls.
///
/// Returns `None` when the direction is unknown or the selected side is empty.
#[must_use]
pub fn extract_customer_number(event: &CallEvent) -> Option<&str> {
    let number = match event.direction? {
        CallDirection::Inbound => event.from_number.as_deref(),
        CallDirection::Outbound => event.to_number.as_deref(),
    }?;

    let number = number.trim();
    if number.is_empty() {
        None
    } else {
        Some(number)
    }
}

/// Business-side number of a call (the opposite side of the customer), falling
/// back to the provider's target metadata.
#[must_use]
pub fn extract_business_number(event: &CallEvent) -> Option<&str> {
    let side = match event.direction? {
        CallDirection::Inbound => event.to_number.as_deref(),
        CallDirection::Outbound => event.from_number.as_deref(),
    };

    side.or_else(|| event.target.as_ref().and_then(|t| t.phone.as_deref()))
        .map(str::trim)
        .filter(|n| !n.is_empty())
}

/// Whether two raw strings denote the same subscriber.
///
/// Both must normalize; a failure on either side makes them non-equivalent.
#[must_use]
pub fn equivalent(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a.e164 == b.e164,
        _ => false,
    }
}
