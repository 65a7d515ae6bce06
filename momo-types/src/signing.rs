//! HMAC-SHA256 payload signing shared by providers, the notification worker
//! and the client SDK.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Raw HMAC-SHA256 of `payload` under `secret`.
pub fn hmac_sha256(payload: &[u8], secret: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Signs a payload, returning the lowercase hex digest sent in `X-Signature`.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    hex::encode(hmac_sha256(payload, secret))
}
