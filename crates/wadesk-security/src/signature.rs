//! `X-Hub-Signature-256` verification for provider webhook deliveries.
//!
//! Meta signs each POST body with HMAC-SHA256 keyed by the app secret and
//! sends `sha256=<hex digest>`. The digest must be computed over the raw body
//! bytes, before any JSON parsing.

use ring::hmac;
use tracing::warn;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Returns `true` when `signature_header` is a valid signature of `body`.
pub fn verify_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(signature_hex) = signature_header.trim().strip_prefix("sha256=") else {
        warn!("webhook signature header missing sha256= prefix");
        return false;
    };

    let signature = match hex::decode(signature_hex) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("webhook signature is not valid hex: {e}");
            return false;
        }
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, app_secret.as_bytes());
    // ring compares in constant time.
    let valid = hmac::verify(&key, body, &signature).is_ok();
    if !valid {
        warn!("webhook signature mismatch");
    }
    valid
}

/// Compute the header value Meta would send for `body`.
pub fn sign(app_secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, app_secret.as_bytes());
    let tag = hmac::sign(&key, body);
    format!("sha256={}", hex::encode(tag.as_ref()))
}
