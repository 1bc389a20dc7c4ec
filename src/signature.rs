//! Webhook signature verification.
//!
//! The telephony provider signs webhooks in one of two ways:
//!
//! * a compact token (`header.payload.signature`, HS256), used when the
//!   signature contains a `.`
//! * a hex HMAC-SHA256 over the raw request body (legacy)
//!
//! A generic verifier accepts `sha256=<hex>` / `sha1=<hex>` header values for
//! non-provider webhooks. Every verifier fails closed: malformed input returns
//! `false` and never panics.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Hash algorithm selected by a generic signature header prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// HMAC-SHA256 (`sha256=` or no prefix)
    Sha256,
    /// HMAC-SHA1 (`sha1=`)
    Sha1,
}

fn hmac_sha256(secret: &str, data: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(data);
    Some(mac.finalize().into_bytes().to_vec())
}

fn hmac_sha1(secret: &str, data: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(data);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Constant-time byte comparison.
///
/// Length is checked first; unequal lengths never reach the comparison.
#[must_use]
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

/// Verify a provider webhook signature, auto-detecting the scheme.
#[must_use]
pub fn verify_provider_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature.trim();
    if signature.contains('.') {
        verify_compact_token(signature, secret)
    } else {
        verify_legacy_hmac(raw_body, signature, secret)
    }
}

/// Verify an HS256 compact token against `secret`.
#[must_use]
pub fn verify_compact_token(token: &str, secret: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = parts.as_slice() else {
        debug!(segments = parts.len(), "Compact token does not have three segments");
        return false;
    };
    if signature.is_empty() {
        return false;
    }

    let Ok(provided) = URL_SAFE_NO_PAD.decode(signature.trim_end_matches('=')) else {
        debug!("Compact token signature is not valid base64url");
        return false;
    };

    let signing_input = format!("{header}.{payload}");
    hmac_sha256(secret, signing_input.as_bytes())
        .is_some_and(|expected| constant_time_eq(&expected, &provided))
}

/// Verify a hex HMAC-SHA256 of the raw body.
#[must_use]
pub fn verify_legacy_hmac(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(signature) else {
        debug!("Legacy signature is not valid hex");
        return false;
    };
    hmac_sha256(secret, raw_body).is_some_and(|expected| constant_time_eq(&expected, &provided))
}

/// Split a generic header value into its algorithm and hex signature.
#[must_use]
pub fn parse_signature_header(header: &str) -> (SignatureAlgorithm, &str) {
    let header = header.trim();
    if let Some(sig) = header.strip_prefix("sha256=") {
        (SignatureAlgorithm::Sha256, sig)
    } else if let Some(sig) = header.strip_prefix("sha1=") {
        (SignatureAlgorithm::Sha1, sig)
    } else {
        (SignatureAlgorithm::Sha256, header)
    }
}

/// Verify a generic `sha256=`/`sha1=`-prefixed (or bare hex) signature.
#[must_use]
pub fn verify_generic_signature(raw_body: &[u8], header: &str, secret: &str) -> bool {
    let (algorithm, signature) = parse_signature_header(header);
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let expected = match algorithm {
        SignatureAlgorithm::Sha256 => hmac_sha256(secret, raw_body),
        SignatureAlgorithm::Sha1 => hmac_sha1(secret, raw_body),
    };
    expected.is_some_and(|expected| constant_time_eq(&expected, &provided))
}

/// Hex HMAC-SHA256 of `raw_body`, as sent in the legacy scheme.
#[must_use]
pub fn sign_legacy(raw_body: &[u8], secret: &str) -> String {
    hex::encode(hmac_sha256(secret, raw_body).unwrap_or_default())
}

/// Build an HS256 compact token over the given JSON header and payload.
#[must_use]
pub fn sign_compact_token(header_json: &str, payload_json: &str, secret: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(header_json);
    let payload = URL_SAFE_NO_PAD.encode(payload_json);
    let signing_input = format!("{header}.{payload}");
    let signature = URL_SAFE_NO_PAD.encode(
        hmac_sha256(secret, signing_input.as_bytes()).unwrap_or_default(),
    );
    format!("{signing_input}.{signature}")
}

/// `sha256=<hex>` / `sha1=<hex>` header value for a generic webhook body.
#[must_use]
pub fn sign_generic(raw_body: &[u8], secret: &str, algorithm: SignatureAlgorithm) -> String {
    match algorithm {
        SignatureAlgorithm::Sha256 => format!(
            "sha256={}",
            hex::encode(hmac_sha256(secret, raw_body).unwrap_or_default())
        ),
        SignatureAlgorithm::Sha1 => format!(
            "sha1={}",
            hex::encode(hmac_sha1(secret, raw_body).unwrap_or_default())
        ),
    }
}
