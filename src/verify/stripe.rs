//! Stripe webhook signature verification using HMAC-SHA256.
//!
//! Stripe signs webhook payloads with a per-deployment secret. The signature
//! arrives in the `Stripe-Signature` header as comma-separated elements, e.g.
//! `t=1492774577,v1=5257a869e7...`. The signed payload is the raw request body
//! prefixed with the timestamp: `"{t}.{body}"`.
//!
//! Verification must run against the exact raw bytes received on the wire.
//! Re-serializing a parsed body (whitespace, key order) invalidates the
//! signature, so this module only ever sees `&[u8]`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A parsed `Stripe-Signature` header.
///
/// Stripe may include several `v1` elements during secret rotation; any one
/// matching signature is sufficient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp from the `t=` element.
    pub timestamp: i64,
    /// Decoded `v1=` signatures.
    pub signatures: Vec<Vec<u8>>,
}

/// Parses a `Stripe-Signature` header value.
///
/// Returns `None` for malformed headers (missing `t`, missing `v1`, invalid
/// hex, non-numeric timestamp). Never panics.
pub fn parse_signature_header(header: &str) -> Option<SignatureHeader> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for element in header.split(',') {
        let (key, value) = element.trim().split_once('=')?;
        match key {
            "t" => timestamp = Some(value.parse().ok()?),
            "v1" => signatures.push(hex::decode(value).ok()?),
            // Unknown schemes (v0, future versions) are ignored.
            _ => {}
        }
    }

    if signatures.is_empty() {
        return None;
    }

    Some(SignatureHeader {
        timestamp: timestamp?,
        signatures,
    })
}

/// Computes the HMAC-SHA256 signature for a timestamped payload.
///
/// The signed payload is `"{timestamp}.{payload}"`, matching what Stripe
/// signs. Exposed for tests to generate valid headers.
pub fn compute_signature(timestamp: i64, payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a `Stripe-Signature` header value.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!("t={},v1={}", timestamp, hex::encode(signature))
}

/// Verifies a Stripe webhook signature against the raw payload and secret.
///
/// Returns `true` if any `v1` signature in the header is valid. Uses
/// constant-time comparison via the HMAC library. Fails closed: malformed
/// headers, bad hex, and mismatches all return `false`.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let parsed = match parse_signature_header(signature_header) {
        Some(parsed) => parsed,
        None => return false,
    };

    parsed.signatures.iter().any(|candidate| {
        let mut mac = match HmacSha256::new_from_slice(secret) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(parsed.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(candidate).is_ok()
    })
}
