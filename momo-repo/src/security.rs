//! Security utilities: API key hashing, HMAC signing and signature checks.
//!
//! Every comparison against secret-derived material is constant-time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub use momo_types::signing::{hmac_sha256, sign_payload};

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Generates a new raw API key (`sk_` + 32 alphanumerics).
pub fn generate_api_key() -> String {
    format!("sk_{}", random_alphanumeric(32))
}

/// Generates a local transaction reference such as `MOMO-20240101-7K3QZ8WD`.
pub fn generate_transaction_number() -> String {
    format!(
        "MOMO-{}-{}",
        chrono::Utc::now().format("%Y%m%d"),
        random_alphanumeric(8).to_ascii_uppercase()
    )
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Signs a payload, returning the standard base64 digest.
pub fn sign_payload_base64(payload: &[u8], secret: &str) -> String {
    BASE64.encode(hmac_sha256(payload, secret))
}

/// Checks a hex HMAC-SHA256 signature. Case-insensitive in the hex digits.
pub fn verify_hex_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let expected = hmac_sha256(payload, secret);
    expected.ct_eq(&provided).into()
}

/// Checks a base64 HMAC-SHA256 signature.
pub fn verify_base64_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }
    let Ok(provided) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let expected = hmac_sha256(payload, secret);
    expected.ct_eq(&provided).into()
}
