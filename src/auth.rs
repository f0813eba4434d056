//! Token signing and signature verification
//!
//! Bearer tokens are `<user_id>.<hex hmac-sha256(user_id, secret)>`. The
//! crate trusts an upstream identity issuer that shares the secret; the
//! HTTP middleware and the socket relay both derive the user id from the
//! verified claim only. Webhook bodies are authenticated the same way:
//! hex HMAC-SHA256 over the raw bytes. All comparisons go through the MAC
//! verifier, which is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_with(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length.
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length")
}

/// Issue a bearer token for a user id
pub fn sign_user_token(secret: &str, user_id: &str) -> String {
    let mut mac = mac_with(secret);
    mac.update(user_id.as_bytes());
    format!("{}.{}", user_id, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a bearer token and return the user id claim
pub fn verify_user_token(secret: &str, token: &str) -> Option<String> {
    let (user_id, signature_hex) = token.rsplit_once('.')?;
    if user_id.is_empty() {
        return None;
    }
    let signature = hex::decode(signature_hex).ok()?;
    let mut mac = mac_with(secret);
    mac.update(user_id.as_bytes());
    mac.verify_slice(&signature).ok()?;
    Some(user_id.to_string())
}

/// Hex HMAC-SHA256 of a webhook body (used by tests and callers that
/// deliver webhooks)
pub fn webhook_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = mac_with(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a webhook signature header against the raw request body
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let signature = match hex::decode(signature_hex.trim()) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    let mut mac = mac_with(secret);
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}
